//! Persistent store error types.

use thiserror::Error;

/// Result type for persistent store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistent store error variants.
///
/// Inside the image cache any of these marks the persistent tier unavailable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store journal is unreadable: {0}")]
    Journal(String),

    #[error("store directory is gone: {0}")]
    Closed(String),
}

impl StoreError {
    /// Creates journal error.
    #[must_use]
    pub fn journal(message: impl Into<String>) -> Self {
        Self::Journal(message.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Journal(err.to_string())
    }
}
