//! Errors for the download manager, backends, and premium-link resolver.

use thiserror::Error;
use uuid::Uuid;

/// Primary error type for download-manager operations.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A job id did not resolve to a known download job.
    #[error("download job not found")]
    JobNotFound {
        /// Missing job identifier.
        job_id: Uuid,
    },
    /// A job was asked to retry but is not in a retriable state.
    #[error("job is not in a retriable state")]
    NotRetriable {
        /// Job identifier.
        job_id: Uuid,
    },
    /// Neither a magnet nor a direct URL was supplied when queuing.
    #[error("no download source supplied")]
    MissingSource,
    /// The premium-link resolver has no usable access token.
    #[error("{0} requires authentication with the premium-link provider")]
    NotAuthenticated(&'static str),
    /// The resolver reached a terminal, non-recoverable torrent status.
    #[error("premium-link provider reported status: {status}")]
    TerminalStatus {
        /// The terminal status string reported by the provider.
        status: String,
    },
    /// The resolver gave up waiting for links to become available.
    #[error("timed out waiting for the premium-link provider to prepare links")]
    ResolveTimedOut,
    /// The resolver produced zero usable links.
    #[error("no download links were returned")]
    NoLinksAvailable,
    /// No direct URL was available after resolution (or none was supplied).
    #[error("no download URL available")]
    NoDownloadUrl,
    /// A request to the premium-link provider's REST API failed.
    #[error("premium-link request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The selected backend could not complete the transfer.
    #[error("download failed: {0}")]
    BackendFailed(String),
    /// Local filesystem I/O failed while writing the download.
    #[error("download I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Reading settings needed by the resolver or manager failed.
    #[error("settings error: {0}")]
    Settings(#[from] revaer_config::ConfigError),
}

/// Convenience alias for download-manager operation results.
pub type DownloadResult<T> = Result<T, DownloadError>;
