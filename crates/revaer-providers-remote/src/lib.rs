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
#![allow(clippy::multiple_crate_versions)]

//! Remote-service providers (§4.8): an indexer-manager aggregator client and
//! a cloud-debrid library lister, both authenticated JSON clients rather
//! than HTML scrapers.

pub mod cloud;
pub mod error;
pub mod indexer;

pub use cloud::{CloudLibraryClient, CloudLibraryItem, CloudLibraryProvider, RestCloudLibraryClient};
pub use error::{RemoteProviderError, RemoteProviderResult};
pub use indexer::{IndexerAggregatorConfig, IndexerAggregatorProvider};
