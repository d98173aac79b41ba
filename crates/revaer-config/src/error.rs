//! Error types for configuration loading/persistence.

use std::io;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A settings key was addressed that does not exist on the typed model.
    #[error("unknown configuration field")]
    UnknownField {
        /// Name of the unexpected field.
        field: String,
    },
    /// A settings value failed to convert to/from its typed representation.
    #[error("invalid configuration value for '{field}'")]
    InvalidValue {
        /// Field that failed validation.
        field: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Failed to (de)serialize the settings document.
    #[error("settings serialization failed")]
    Serde {
        /// Source serialization error.
        #[source]
        source: serde_json::Error,
    },
    /// A filesystem operation on the settings store failed.
    #[error("filesystem operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Source IO error.
        #[source]
        source: io::Error,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
