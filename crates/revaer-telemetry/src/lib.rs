#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Telemetry primitives shared across the Revaer workspace.
//!
//! Layout: `init.rs` (tracing-subscriber fmt+env-filter initialization),
//! `metrics.rs` (Prometheus registry for provider/download counters),
//! `error.rs` (shared error type).

pub mod error;
pub mod init;
pub mod metrics;

pub use error::{Result as TelemetryResult, TelemetryError};
pub use init::{
    DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, OpenTelemetryConfig, OpenTelemetryGuard,
    build_sha, init_logging, init_logging_with_otel, log_format_from_config,
};
pub use metrics::{Metrics, MetricsSnapshot};
