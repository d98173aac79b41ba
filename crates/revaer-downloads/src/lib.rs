#![forbid(unsafe_code)]
#![deny(
    warnings, dead_code, unused, unused_imports, unused_must_use, unreachable_pub,
    clippy::all, clippy::pedantic, clippy::nursery,
    rustdoc::broken_intra_doc_links, rustdoc::bare_urls, missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Download manager for the discovery & retrieval engine (§4.10): pluggable
//! backends, a premium-link resolver, and the queue/pause/resume/cancel/
//! delete/retry facade that dispatches between them.
//!
//! Layout: `backend` (pluggable transports), `resolver` (magnet/torrent-URL
//! to direct-URL resolution against a premium-link provider), `manager`
//! (the job table and worker lifecycle), `error` (shared error type).

pub mod backend;
pub mod error;
pub mod manager;
pub mod resolver;

pub use backend::{Aria2Backend, DownloadBackend, DownloadBackendResult, NativeBackend};
pub use error::{DownloadError, DownloadResult};
pub use manager::{DownloadManager, QueueRequest};
pub use resolver::{DeviceAuthChallenge, DeviceAuthStatus, PremiumLinkResolver, RestPremiumLinkResolver, StatusCallback};
