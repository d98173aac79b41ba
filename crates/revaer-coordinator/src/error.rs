//! Errors for the fan-out coordinator and search-job facade.

use thiserror::Error;
use uuid::Uuid;

/// Primary error type for coordinator and job-facade operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// A job id did not resolve to a known search job.
    #[error("search job not found")]
    JobNotFound {
        /// Missing job identifier.
        job_id: Uuid,
    },
}

/// Convenience alias for coordinator operation results.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
