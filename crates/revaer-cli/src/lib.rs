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

//! Local CLI for exercising the discovery & retrieval engine directly,
//! in-process, with no server in between.
//!
//! Layout: `engine` (composition root: settings, event bus, coordinator,
//! search-job facade, download manager, provider registration), `cli`
//! (argument parsing and dispatch), `commands` (one module per subcommand
//! group), `output` (table/JSON rendering).

pub mod cli;
pub mod commands;
pub mod engine;
pub mod output;

pub use cli::run;
