//! Error types for the torrent-index providers.

use thiserror::Error;

/// Primary error type for torrent-index provider operations.
#[derive(Debug, Error)]
pub enum IndexProviderError {
    /// Every configured mirror/endpoint failed.
    #[error("all {provider} mirrors failed: {last_error}")]
    AllMirrorsFailed {
        /// Provider name.
        provider: String,
        /// The last mirror's failure message.
        last_error: String,
    },
    /// No mirrors/endpoints were configured.
    #[error("no mirrors configured for {provider}")]
    NoMirrors {
        /// Provider name.
        provider: String,
    },
}

/// Convenience alias for torrent-index provider results.
pub type IndexProviderResult<T> = Result<T, IndexProviderError>;
