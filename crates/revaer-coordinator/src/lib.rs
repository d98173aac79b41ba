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
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Fan-out coordinator and async search-job facade for the discovery &
//! retrieval engine.
//!
//! Layout: `health` (routing score + circuit breaker), `cache` (search
//! result LRU/TTL cache), `coordinator` (the blocking-call fan-out
//! pipeline), `job` (the async create/poll/cancel job facade built on top
//! of it), `settings` (settings-service bridge), `error` (shared error
//! type).

/// Search-result cache (§4.5.11).
pub mod cache;
/// Fan-out coordinator: the core `search` pipeline (§4.5).
pub mod coordinator;
/// Coordinator and job-facade error type.
pub mod error;
/// Routing score and circuit breaker (§4.5.3, §4.5.4).
pub mod health;
/// Async search-job facade (§4.9).
pub mod job;
/// Settings-service bridge (§4.3's `source_*`/`enabled_sources` keys).
pub mod settings;

pub use coordinator::{Coordinator, CoordinatorConfig, SearchOutcome};
pub use error::{CoordinatorError, CoordinatorResult};
pub use job::{CreateJobRequest, JobFacade, JobFacadeConfig};
