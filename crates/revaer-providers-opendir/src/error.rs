//! Error type for the open-directory provider.

use thiserror::Error;

/// Primary error type for open-directory provider operations.
#[derive(Debug, Error)]
pub enum OpenDirectoryError {
    /// A seed or discovered page request failed after retries.
    #[error("open-directory request to {url} failed: {reason}")]
    RequestFailed {
        /// The URL that failed.
        url: String,
        /// The last failure's message.
        reason: String,
    },
}

/// Convenience alias for open-directory provider results.
pub type OpenDirectoryResult<T> = Result<T, OpenDirectoryError>;
