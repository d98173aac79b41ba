//! Error types for the search/download data model and provider contract.

use thiserror::Error;
use uuid::Uuid;

/// Primary error type for core model and provider operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A provider capability was invoked that the implementation does not
    /// support.
    #[error("provider operation not supported")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// Provider registration was refused (invalid name, duplicate, etc).
    #[error("provider registration refused: {reason}")]
    InvalidRegistration {
        /// Human-readable reason the registration was refused.
        reason: String,
    },
    /// A download job id did not resolve to a known job.
    #[error("download job not found")]
    JobNotFound {
        /// Missing job identifier.
        job_id: Uuid,
    },
}

/// Convenience alias for core operation results.
pub type CoreResult<T> = Result<T, CoreError>;
