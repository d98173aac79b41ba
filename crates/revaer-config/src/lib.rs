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
#![allow(clippy::module_name_repetitions)]
#![allow(unexpected_cfgs)]
#![allow(clippy::multiple_crate_versions)]

//! Tiered settings provider for the discovery & retrieval engine (§4.3).
//!
//! Three tiers — process defaults, per-user, per-profile — are deep-merged
//! on load and persisted atomically as JSON documents on disk; persistence
//! itself (a database, a curated-link store) is explicitly out of scope for
//! this crate, so each tier is one JSON file under a configurable root.

pub mod error;
pub mod model;
pub mod service;

pub use error::{ConfigError, ConfigResult};
pub use model::Tier;
pub use service::SettingsService;
