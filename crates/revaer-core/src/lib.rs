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
#![allow(clippy::multiple_crate_versions)]
#![allow(unexpected_cfgs)]

//! Shared data model and provider contract for the discovery & retrieval
//! engine: search results, download jobs, source health, the `Provider`
//! capability trait, and the pure ranking transforms (dedupe/aggregate/sort)
//! that sit between provider fan-out and the search-job facade.

pub mod error;
pub mod magnet;
pub mod model;
pub mod provider;
pub mod rank;
pub mod session;
pub mod size;

pub use error::{CoreError, CoreResult};
pub use model::{
    DownloadJob, JobProgress, JobStatus, JobTimings, LinkCandidate, ResultPage, SearchCacheEntry,
    SearchFilters, SearchJob, SearchJobPhase, SearchJobStatus, SearchMode, SearchResult,
    SourceHealth, SourceProgress, SourceStatus,
};
pub use provider::{Provider, ProviderHealth, ProviderOutcome};
pub use session::SessionContext;
