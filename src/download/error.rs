//! Error types for the download module.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors from the download engine.
///
/// Per-document failures never surface here; they become
/// [`DownloadResult`](super::DownloadResult) outcomes. Only conditions that
/// compromise data integrity abort the batch.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The destination file or directory could not be written.
    #[error("storage failure at {path}: {source}")]
    Storage {
        /// The path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Creates a storage error with path context.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}
