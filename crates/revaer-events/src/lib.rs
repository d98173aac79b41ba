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

//! Event bus for the discovery & retrieval engine.
//!
//! The bus provides a typed event enum, sequential identifiers, and support for
//! replaying recent events when subscribers reconnect (e.g. a wrapper exposing
//! `Last-Event-ID` semantics over SSE). Internally it uses `tokio::broadcast`
//! with a bounded buffer; when the channel overflows, the oldest events are
//! dropped, matching the desired backpressure behaviour.

pub mod error;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;
use uuid::Uuid;

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Stable event names exposed across the engine (see the external-interfaces
/// contract). Variants intentionally mirror the wire vocabulary 1:1 so a
/// wrapper can render `kind()` directly as an SSE `event:` field.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A search batch was submitted to the coordinator.
    SearchStarted {
        /// Job identifier, when the search was issued through the job facade.
        job_id: Option<Uuid>,
        /// Raw query text.
        query: String,
    },
    /// One provider within a search batch finished its attempt.
    SearchProgress {
        /// Job identifier, when applicable.
        job_id: Option<Uuid>,
        /// Provider name that completed.
        source: String,
        /// Whether the attempt succeeded.
        ok: bool,
        /// Results contributed by this provider.
        result_count: usize,
    },
    /// A search batch finished (successfully or with partial results).
    SearchCompleted {
        /// Job identifier, when applicable.
        job_id: Option<Uuid>,
        /// Final result count after dedupe/aggregate/filter/paginate.
        result_count: usize,
        /// Total matched before pagination.
        total: usize,
    },
    /// A search batch failed outright (e.g. malformed filters).
    SearchError {
        /// Job identifier, when applicable.
        job_id: Option<Uuid>,
        /// Human-readable failure description.
        message: String,
    },
    /// A download job was accepted and is waiting for a worker slot.
    DownloadQueued {
        /// Identifier of the queued job.
        job_id: Uuid,
        /// Display title for the job.
        title: String,
    },
    /// A download job acquired a worker slot and began resolving/fetching.
    DownloadStarted {
        /// Identifier of the job.
        job_id: Uuid,
    },
    /// Periodic progress update emitted while a download is in flight.
    DownloadProgress {
        /// Identifier of the job.
        job_id: Uuid,
        /// Bytes written so far.
        downloaded_bytes: u64,
        /// Total expected bytes (0 if unknown).
        total_bytes: u64,
        /// Instantaneous speed in kilobytes per second.
        speed_kbps: f64,
    },
    /// A download job was paused by the caller.
    DownloadPaused {
        /// Identifier of the job.
        job_id: Uuid,
    },
    /// A paused download job resumed.
    DownloadResumed {
        /// Identifier of the job.
        job_id: Uuid,
    },
    /// A download job finished successfully.
    DownloadCompleted {
        /// Identifier of the job.
        job_id: Uuid,
        /// Final output path.
        output_path: String,
    },
    /// A download job was cancelled by the caller.
    DownloadCancelled {
        /// Identifier of the job.
        job_id: Uuid,
    },
    /// A download job record was deleted from the manager's table.
    DownloadDeleted {
        /// Identifier of the job.
        job_id: Uuid,
        /// Whether the on-disk artifact was also removed.
        deleted_file: bool,
    },
    /// A download job failed.
    DownloadError {
        /// Identifier of the job.
        job_id: Uuid,
        /// Human-readable failure description.
        message: String,
    },
    /// A settings changeset was applied.
    SettingsChanged {
        /// Key that changed, or a scope description for bulk updates.
        key: String,
    },
    /// Provider enable/disable state was reloaded from settings.
    SourcesReloaded {
        /// Provider names affected by the reload.
        sources: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator matching the external stable event names.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::SearchStarted { .. } => "SEARCH_STARTED",
            Self::SearchProgress { .. } => "SEARCH_PROGRESS",
            Self::SearchCompleted { .. } => "SEARCH_COMPLETED",
            Self::SearchError { .. } => "SEARCH_ERROR",
            Self::DownloadQueued { .. } => "DOWNLOAD_QUEUED",
            Self::DownloadStarted { .. } => "DOWNLOAD_STARTED",
            Self::DownloadProgress { .. } => "DOWNLOAD_PROGRESS",
            Self::DownloadPaused { .. } => "DOWNLOAD_PAUSED",
            Self::DownloadResumed { .. } => "DOWNLOAD_RESUMED",
            Self::DownloadCompleted { .. } => "DOWNLOAD_COMPLETED",
            Self::DownloadCancelled { .. } => "DOWNLOAD_CANCELLED",
            Self::DownloadDeleted { .. } => "DOWNLOAD_DELETED",
            Self::DownloadError { .. } => "DOWNLOAD_ERROR",
            Self::SettingsChanged { .. } => "SETTINGS_CHANGED",
            Self::SourcesReloaded { .. } => "SOURCES_RELOADED",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, ensuring dropped events impact both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Return a snapshot of buffered events newer than the supplied identifier.
    ///
    /// This is useful for endpoints that need incremental views without
    /// establishing a long-lived subscription.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn backlog_since(&self, since_id: EventId) -> Vec<EventEnvelope> {
        let buffer = self.lock_buffer();
        buffer
            .iter()
            .filter(|item| item.id > since_id)
            .cloned()
            .collect()
    }

    /// Returns the last assigned identifier, if any events have been published.
    ///
    /// # Panics
    ///
    /// Panics if the replay buffer mutex has been poisoned.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;
    use tokio::task;
    use tokio::time::timeout;

    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn event_kinds_cover_all_variants() {
        let job_id = Uuid::new_v4();
        let events = [
            Event::SearchStarted {
                job_id: Some(job_id),
                query: "demo".to_string(),
            },
            Event::SearchProgress {
                job_id: Some(job_id),
                source: "http-scrape".to_string(),
                ok: true,
                result_count: 3,
            },
            Event::SearchCompleted {
                job_id: Some(job_id),
                result_count: 3,
                total: 3,
            },
            Event::SearchError {
                job_id: Some(job_id),
                message: "bad filter".to_string(),
            },
            Event::DownloadQueued {
                job_id,
                title: "demo".to_string(),
            },
            Event::DownloadStarted { job_id },
            Event::DownloadProgress {
                job_id,
                downloaded_bytes: 10,
                total_bytes: 100,
                speed_kbps: 12.5,
            },
            Event::DownloadPaused { job_id },
            Event::DownloadResumed { job_id },
            Event::DownloadCompleted {
                job_id,
                output_path: "/library/demo".to_string(),
            },
            Event::DownloadCancelled { job_id },
            Event::DownloadDeleted {
                job_id,
                deleted_file: true,
            },
            Event::DownloadError {
                job_id,
                message: "disk full".to_string(),
            },
            Event::SettingsChanged {
                key: "download_folder".to_string(),
            },
            Event::SourcesReloaded {
                sources: vec!["http-scrape".to_string()],
            },
        ];

        for event in events {
            let expected = match &event {
                Event::SearchStarted { .. } => "SEARCH_STARTED",
                Event::SearchProgress { .. } => "SEARCH_PROGRESS",
                Event::SearchCompleted { .. } => "SEARCH_COMPLETED",
                Event::SearchError { .. } => "SEARCH_ERROR",
                Event::DownloadQueued { .. } => "DOWNLOAD_QUEUED",
                Event::DownloadStarted { .. } => "DOWNLOAD_STARTED",
                Event::DownloadProgress { .. } => "DOWNLOAD_PROGRESS",
                Event::DownloadPaused { .. } => "DOWNLOAD_PAUSED",
                Event::DownloadResumed { .. } => "DOWNLOAD_RESUMED",
                Event::DownloadCompleted { .. } => "DOWNLOAD_COMPLETED",
                Event::DownloadCancelled { .. } => "DOWNLOAD_CANCELLED",
                Event::DownloadDeleted { .. } => "DOWNLOAD_DELETED",
                Event::DownloadError { .. } => "DOWNLOAD_ERROR",
                Event::SettingsChanged { .. } => "SETTINGS_CHANGED",
                Event::SourcesReloaded { .. } => "SOURCES_RELOADED",
            };
            assert_eq!(event.kind(), expected);
        }
    }

    fn sample_progress_event(id: usize) -> Event {
        Event::DownloadProgress {
            job_id: Uuid::from_u128(id as u128 + 1),
            downloaded_bytes: (id * 1_000) as u64,
            total_bytes: 500_000,
            speed_kbps: 4.2,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_progress_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().unwrap().id, 3);
        assert_eq!(received.last().unwrap().id, 5);
    }

    #[tokio::test]
    async fn load_test_does_not_stall_publishers() {
        let bus = Arc::new(EventBus::with_capacity(512));
        let mut stream = bus.subscribe(None);

        let publisher = {
            let bus = bus.clone();
            task::spawn(async move {
                for i in 0..500 {
                    let publish_bus = bus.clone();
                    timeout(PUBLISH_TIMEOUT, async move {
                        let _ = publish_bus.publish(sample_progress_event(i));
                    })
                    .await
                    .expect("publish timed out");
                }
            })
        };

        let consumer = task::spawn(async move {
            let mut ids = HashSet::new();
            while ids.len() < 500 {
                if let Some(event) = stream.next().await {
                    ids.insert(event.id);
                }
            }
            ids
        });

        publisher.await.expect("publisher task panicked");
        let ids = consumer.await.expect("consumer task panicked");
        assert_eq!(ids.len(), 500);
    }

    #[tokio::test]
    async fn last_event_id_reflects_recent_publish() {
        let bus = EventBus::with_capacity(2);
        assert!(bus.last_event_id().is_none(), "no events published yet");
        let published = bus.publish(sample_progress_event(0));
        assert_eq!(bus.last_event_id(), Some(published));
    }

    #[tokio::test]
    async fn subscribe_without_since_replays_all() {
        let bus = EventBus::with_capacity(4);
        for i in 0..3 {
            let _ = bus.publish(sample_progress_event(i));
        }
        let mut stream = bus.subscribe(Some(0));
        let mut collected = Vec::new();
        for expected_id in 1..=3 {
            collected.push(
                timeout(PUBLISH_TIMEOUT, stream.next())
                    .await
                    .expect("stream stalled")
                    .expect("stream closed"),
            );
            assert_eq!(collected.last().unwrap().id, expected_id);
        }
        assert_eq!(collected.len(), 3);
    }

    #[tokio::test]
    async fn stream_returns_none_after_sender_dropped() {
        let mut stream = {
            let bus = EventBus::with_capacity(1);
            let stream = bus.subscribe(None);
            drop(bus);
            stream
        };
        assert!(
            stream.next().await.is_none(),
            "closing the sender should end the stream"
        );
    }
}
