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

//! Torrent-index providers (§4.4.1): mirror-rotation HTML scraping and
//! JSON-API variants, covering the shape every concrete upstream torrent
//! indexer in the corpus shares.

pub mod error;
pub mod json_api;
pub mod mirror_html;

pub use error::{IndexProviderError, IndexProviderResult};
pub use json_api::{JsonApiConfig, JsonApiIndexProvider};
pub use mirror_html::{MirrorConfig, MirrorRotationProvider};
