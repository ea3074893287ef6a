//! Collaborator traits and error types for crawl output
//!
//! The coordinator hands finished records to a `Persistence` implementation
//! and downloaded attachments to a `Converter`. Neither is allowed to abort a
//! run, except when local storage itself has become unusable.

use crate::model::{Attachment, Policy, PolicyDetail};
use crate::state::Progress;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unsupported attachment format: {0}")]
    Unsupported(String),

    #[error("Cannot extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },
}

impl OutputError {
    /// Wraps an IO error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// An attachment that could be read but not parsed
    pub fn extraction(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if local storage can no longer be written
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io { source, .. } if is_storage_fatal(source))
    }

    /// Splits a fatal error into its path and cause, or returns it unchanged
    pub fn into_storage_failure(self) -> Result<(PathBuf, io::Error), Self> {
        match self {
            Self::Io { path, source } if is_storage_fatal(&source) => Ok((path, source)),
            other => Err(other),
        }
    }
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Returns true for IO failures that no retry or later record can fix
pub fn is_storage_fatal(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::StorageFull
            | io::ErrorKind::ReadOnlyFilesystem
    )
}

/// Durable storage for crawl results
///
/// Implementations must be thread-safe. The `save_*` methods return the path
/// written, or `None` when that artifact is switched off.
pub trait Persistence: Send + Sync {
    /// Creates whatever layout the implementation needs before a run
    fn prepare(&self) -> OutputResult<()>;

    /// Local destination for a downloaded attachment
    ///
    /// # Arguments
    ///
    /// * `policy` - The policy owning the attachment
    /// * `attachment` - The attachment to be downloaded
    fn attachment_path(&self, policy: &Policy, attachment: &Attachment) -> PathBuf;

    /// Stores the structured detail of one policy
    fn save_detail(&self, detail: &PolicyDetail) -> OutputResult<Option<PathBuf>>;

    /// Stores the derived document of one policy
    ///
    /// # Arguments
    ///
    /// * `detail` - The policy detail
    /// * `content` - Text extracted from its attachments, if any
    fn save_document(
        &self,
        detail: &PolicyDetail,
        content: Option<&str>,
    ) -> OutputResult<Option<PathBuf>>;

    /// Stores the final progress ledger of a run
    fn save_progress(&self, progress: &Progress) -> OutputResult<PathBuf>;
}

/// Extracts text from a downloaded attachment
pub trait Converter: Send + Sync {
    fn convert(&self, path: &Path) -> OutputResult<String>;
}
