//! Per-command-group handlers, split the way the teacher splits `cli.rs`'s
//! dispatch into one module per subcommand family.

pub mod download;
pub mod metrics;
pub mod search;
pub mod settings;

use thiserror::Error;

/// Unified error type every command handler returns; `cli::run` maps this
/// to a process exit code and a one-line `stderr` message.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A settings read/write failed.
    #[error("{0}")]
    Settings(#[from] revaer_config::ConfigError),
    /// A search-job operation failed.
    #[error("{0}")]
    Coordinator(#[from] revaer_coordinator::CoordinatorError),
    /// A download-manager operation failed.
    #[error("{0}")]
    Download(#[from] revaer_downloads::DownloadError),
    /// Input rejected before reaching the engine (bad argument combination,
    /// malformed JSON value, etc).
    #[error("{0}")]
    Validation(String),
    /// JSON (de)serialization failed while rendering output or parsing a
    /// `--value` argument.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Building or rendering the Prometheus metrics registry failed.
    #[error("{0}")]
    Metrics(String),
}

impl CommandError {
    /// Construct a validation error from a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Process exit code: `2` for a caller mistake, `1` for everything else.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            _ => 1,
        }
    }
}

/// Convenience alias for command-handler results.
pub type CommandResult<T> = Result<T, CommandError>;
