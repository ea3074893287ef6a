/// Crawl run state definitions
///
/// A run moves `Idle → Listing → Crawling → Completed | Stopped`, or to
/// `Aborted` when local storage becomes unusable.
use serde::Serialize;
use std::fmt;

/// Represents the current phase of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CrawlState {
    // ===== Active States =====
    /// Run created but not started
    Idle,

    /// Paginating through the requested categories
    Listing,

    /// Processing record `index` (1-based) of `total`
    Crawling { index: usize, total: usize },

    // ===== Terminal States =====
    /// Every listed record was processed
    Completed,

    /// A stop was requested and honored at a checkpoint
    Stopped,

    /// Local storage failed in a way that would lose all further output
    Aborted,
}

impl CrawlState {
    /// Returns true if no further progress will be made
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Aborted)
    }

    /// Returns true while the run is listing or crawling
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Listing | Self::Crawling { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listing => "listing",
            Self::Crawling { .. } => "crawling",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Aborted => "aborted",
        }
    }
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::Idle
    }
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crawling { index, total } => write!(f, "crawling ({}/{})", index, total),
            other => f.write_str(other.as_str()),
        }
    }
}
