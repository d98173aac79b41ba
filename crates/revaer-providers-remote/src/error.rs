//! Error type shared by the indexer-aggregator and cloud-library providers.

use thiserror::Error;

/// Primary error type for remote-service provider operations.
#[derive(Debug, Error)]
pub enum RemoteProviderError {
    /// The remote service rejected the request's credentials.
    #[error("{service} authentication failed")]
    AuthFailed {
        /// Which provider's credentials were rejected.
        service: String,
    },
    /// The remote service returned a response this provider couldn't map.
    #[error("{service} returned an unexpected response: {reason}")]
    UnexpectedResponse {
        /// Which remote service.
        service: String,
        /// Why the response was rejected.
        reason: String,
    },
}

/// Convenience alias for remote-service provider results.
pub type RemoteProviderResult<T> = Result<T, RemoteProviderError>;
