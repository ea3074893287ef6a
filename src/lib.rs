//! Policy-Crawler: a resilient crawler for paginated document-listing APIs
//!
//! This crate enumerates policy records category by category, fetches each
//! record's detail and attachments through a retrying, identity-rotating HTTP
//! transport, and tracks batch progress with cooperative cancellation.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod state;

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Policy-Crawler operations
///
/// Only `Storage` is fatal to a running crawl; everything else is absorbed at
/// the record or attachment boundary.
#[derive(Debug, Error)]
pub enum CrawlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Unrecoverable storage failure at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Unknown category code: {0}")]
    UnknownCategory(u8),
}

/// Failure of a single remote operation (search, detail, download)
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Unexpected HTTP status {0}")]
    HttpStatus(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Response framing problem that can leave a complete body behind
    #[error("Header parsing error: {0}")]
    Protocol(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Rejected by server: {0}")]
    Rejected(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<ApiError> },

    #[error("Downloaded file is empty or missing")]
    EmptyDownload,

    #[error("Local IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// Returns true if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientNetwork(_)
            | Self::HttpStatus(_)
            | Self::Malformed(_)
            | Self::Protocol(_) => true,
            Self::Io(e) => !output::is_storage_fatal(e),
            Self::RateLimited(_)
            | Self::Rejected(_)
            | Self::Exhausted { .. }
            | Self::EmptyDownload => false,
        }
    }

    /// Returns true if the server asked us to back off
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }

    /// Returns the underlying IO error if it means local storage is unusable
    pub fn storage_failure(&self) -> Option<&std::io::Error> {
        match self {
            Self::Io(e) if output::is_storage_fatal(e) => Some(e),
            Self::Exhausted { last, .. } => last.storage_failure(),
            _ => None,
        }
    }

    /// Takes out the storage-fatal IO error, or returns `self` unchanged
    pub fn into_storage_failure(self) -> std::result::Result<std::io::Error, Self> {
        match self {
            Self::Io(e) if output::is_storage_fatal(&e) => Ok(e),
            Self::Exhausted { attempts, last } => (*last)
                .into_storage_failure()
                .map_err(|last| Self::Exhausted {
                    attempts,
                    last: Box::new(last),
                }),
            other => Err(other),
        }
    }
}

/// Per-record failures raised by the coordinator
///
/// Only `DetailFetchFailed` marks a record as failed in the progress ledger.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("fetch failed: {0}")]
    DetailFetchFailed(#[source] ApiError),

    #[error("download failed for {file}: {source}")]
    DownloadFailed {
        file: String,
        #[source]
        source: ApiError,
    },

    #[error("conversion failed for {file}: {source}")]
    ConversionFailed {
        file: String,
        #[source]
        source: output::OutputError,
    },

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] output::OutputError),
}

impl RecordError {
    /// Returns true if the failure means local storage is unusable
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DetailFetchFailed(e) | Self::DownloadFailed { source: e, .. } => {
                e.storage_failure().is_some()
            }
            Self::ConversionFailed { .. } => false,
            Self::PersistenceFailed(e) => e.is_fatal(),
        }
    }

    /// Reason recorded in the progress ledger
    pub fn reason(&self) -> String {
        match self {
            Self::DetailFetchFailed(_) => "fetch failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RecordError> for CrawlerError {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::DetailFetchFailed(e) => Self::Api(e),
            RecordError::DownloadFailed { file, source } => match source.into_storage_failure() {
                Ok(io) => Self::Storage {
                    path: PathBuf::from(file),
                    source: io,
                },
                Err(api) => Self::Api(api),
            },
            RecordError::ConversionFailed { source, .. } => Self::Output(source),
            RecordError::PersistenceFailed(e) => match e.into_storage_failure() {
                Ok((path, source)) => Self::Storage { path, source },
                Err(e) => Self::Output(e),
            },
        }
    }
}

/// Result type alias for Policy-Crawler operations
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for remote operations
pub type ApiResult<T> = std::result::Result<T, ApiError>;

// Re-export commonly used types
pub use config::{Config, FilterMode};
pub use crawler::{ApiClient, Coordinator, PolicyApi};
pub use model::{Attachment, Category, Policy, PolicyDetail};
pub use state::{CrawlState, Progress, StopHandle};
