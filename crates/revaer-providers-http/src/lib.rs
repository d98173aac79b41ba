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

//! Generic HTTP-scraping provider (§4.6): user-configured URL templates,
//! domain-adapter dispatch, bounded two-level crawling, redirect-wrapper
//! decoding, and an optional search-engine discovery pass.

pub mod adapter;
pub mod cache;
pub mod classifier;
pub mod error;
pub mod headless;
pub mod health;
pub mod provider;
pub mod redirect;
pub mod retry;

pub use adapter::{CrawlContext, DomainAdapter, GenericAdapter, NmacStyleAdapter, ParseLimits};
pub use error::{HttpProviderError, HttpProviderResult};
pub use headless::{HeadlessFallback, HeadlessFetchOptions, UnavailableFallback};
pub use provider::{HttpScrapeConfig, HttpScrapeProvider, SourceOverride};
