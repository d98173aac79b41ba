//! Download manager (§4.10): queue/pause/resume/cancel/delete/retry over a
//! bounded-concurrency pool of backend-dispatching workers.
//!
//! Grounded on `original_source/pluggy/core/download_manager.py` in full
//! for the worker lifecycle, semaphore-swap `setMaxConcurrent` semantics,
//! and torrent-reference routing through the premium-link resolver.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use revaer_core::model::{DownloadJob, JobStatus};
use revaer_core::magnet::is_torrent_reference;
use revaer_core::session::SessionContext;
use revaer_config::SettingsService;
use revaer_events::{Event, EventBus};
use tokio::sync::{RwLock, Semaphore};
use tracing::warn;
use uuid::Uuid;

use crate::backend::{Aria2Backend, DownloadBackend, NativeBackend};
use crate::error::{DownloadError, DownloadResult};
use crate::resolver::PremiumLinkResolver;

const DEFAULT_MAX_CONCURRENT: usize = 3;
const DEFAULT_BACKEND: &str = "native";

/// Request body accepted by [`DownloadManager::queue`].
#[derive(Debug, Clone)]
pub struct QueueRequest {
    /// Display title for the job.
    pub title: String,
    /// Destination path on disk.
    pub output_path: String,
    /// Source magnet URI, when queuing from a torrent result.
    pub magnet: Option<String>,
    /// Source direct URL, when queuing from a direct-link result.
    pub direct_url: Option<String>,
}

struct JobEntry {
    handle: Arc<RwLock<DownloadJob>>,
    source: QueueRequest,
}

/// Manages the lifecycle of every queued/active download job, dispatching
/// work to pluggable [`DownloadBackend`]s behind a counting semaphore.
pub struct DownloadManager {
    jobs: RwLock<Vec<(Uuid, JobEntry)>>,
    backends: HashMap<&'static str, Arc<dyn DownloadBackend>>,
    active_backend: RwLock<&'static str>,
    semaphore: RwLock<Arc<Semaphore>>,
    resolver: Option<Arc<dyn PremiumLinkResolver>>,
    events: EventBus,
}

impl DownloadManager {
    /// Build a manager reading `max_concurrent_downloads`/`download_backend`
    /// from `settings` at construction time. A premium-link `resolver` is
    /// optional; when absent, magnet/torrent-reference jobs fail fast with
    /// [`DownloadError::NotAuthenticated`].
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        settings: &SettingsService,
        resolver: Option<Arc<dyn PremiumLinkResolver>>,
        events: EventBus,
        ctx: &SessionContext,
    ) -> Self {
        let mut backends: HashMap<&'static str, Arc<dyn DownloadBackend>> = HashMap::new();
        backends.insert("native", Arc::new(NativeBackend::new(http_client)));
        backends.insert("aria2", Arc::new(Aria2Backend::new()));

        let max_concurrent = settings
            .get(ctx, "max_concurrent_downloads")
            .ok()
            .and_then(|value| value.as_u64())
            .map_or(DEFAULT_MAX_CONCURRENT, |value| value.max(1) as usize);
        let configured_backend = settings
            .get(ctx, "download_backend")
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_BACKEND.to_string());
        let active_backend = backends
            .keys()
            .copied()
            .find(|name| *name == configured_backend.as_str())
            .unwrap_or(DEFAULT_BACKEND);

        Self {
            jobs: RwLock::new(Vec::new()),
            backends,
            active_backend: RwLock::new(active_backend),
            semaphore: RwLock::new(Arc::new(Semaphore::new(max_concurrent))),
            resolver,
            events,
        }
    }

    /// Queue a new download job and return its id immediately; the worker
    /// runs as a detached background task once a semaphore permit is free.
    pub async fn queue(self: &Arc<Self>, request: QueueRequest) -> DownloadResult<Uuid> {
        if request.magnet.is_none() && request.direct_url.is_none() {
            return Err(DownloadError::MissingSource);
        }
        let job = DownloadJob::new(
            request.title.clone(),
            request.output_path.clone(),
            request.magnet.clone(),
            request.direct_url.clone(),
        );
        let id = job.id;
        let handle = Arc::new(RwLock::new(job));

        self.jobs.write().await.push((id, JobEntry { handle: Arc::clone(&handle), source: request }));
        self.events.publish(Event::DownloadQueued { job_id: id, title: handle.read().await.title.clone() });

        let manager = Arc::clone(self);
        let ctx = revaer_core::session::current();
        tokio::spawn(async move {
            revaer_core::session::scope(ctx, manager.run_job(id, handle)).await;
        });

        Ok(id)
    }

    /// Snapshot a job's current state.
    pub async fn get(&self, id: Uuid) -> DownloadResult<DownloadJob> {
        Ok(self.entry(id).await?.handle.read().await.clone())
    }

    /// Snapshot every job currently tracked, newest first.
    pub async fn get_all(&self) -> Vec<DownloadJob> {
        let jobs = self.jobs.read().await;
        let mut snapshots = Vec::with_capacity(jobs.len());
        for (_, entry) in jobs.iter() {
            snapshots.push(entry.handle.read().await.clone());
        }
        snapshots.reverse();
        snapshots
    }

    /// Request a pause; a no-op unless the job is currently downloading.
    pub async fn pause(&self, id: Uuid) -> DownloadResult<()> {
        let entry = self.entry(id).await?;
        let mut job = entry.handle.write().await;
        if job.status == JobStatus::Downloading {
            job.pause_requested = true;
        }
        Ok(())
    }

    /// Clear a pause request and transition back to `downloading`.
    pub async fn resume(&self, id: Uuid) -> DownloadResult<()> {
        let entry = self.entry(id).await?;
        let mut job = entry.handle.write().await;
        if job.status == JobStatus::Paused {
            job.pause_requested = false;
            job.status = JobStatus::Downloading;
            self.events.publish(Event::DownloadResumed { job_id: id });
        }
        Ok(())
    }

    /// Request cancellation. A no-op once the job has already reached a
    /// terminal status.
    pub async fn cancel(&self, id: Uuid) -> DownloadResult<()> {
        let entry = self.entry(id).await?;
        let mut job = entry.handle.write().await;
        if !job.status.is_terminal() {
            job.cancel_requested = true;
            job.pause_requested = false;
        }
        Ok(())
    }

    /// Remove a job from the table, optionally deleting its output file.
    /// Only valid once the job has reached a terminal status.
    pub async fn delete(&self, id: Uuid, delete_file: bool) -> DownloadResult<()> {
        let output_path = {
            let jobs = self.jobs.read().await;
            let (_, entry) = jobs.iter().find(|(job_id, _)| *job_id == id).ok_or(DownloadError::JobNotFound { job_id: id })?;
            let job = entry.handle.read().await;
            if !job.status.is_terminal() {
                return Err(DownloadError::NotRetriable { job_id: id });
            }
            job.output_path.clone()
        };

        self.jobs.write().await.retain(|(job_id, _)| *job_id != id);

        let mut deleted_file = false;
        if delete_file {
            deleted_file = tokio::fs::remove_file(&output_path).await.is_ok();
        }
        self.events.publish(Event::DownloadDeleted { job_id: id, deleted_file });
        Ok(())
    }

    /// Re-queue a job that previously ended in `error` or `cancelled`,
    /// resetting its progress and dispatching a fresh worker.
    pub async fn retry(self: &Arc<Self>, id: Uuid) -> DownloadResult<()> {
        let entry = self.entry(id).await?;
        {
            let mut job = entry.handle.write().await;
            if !matches!(job.status, JobStatus::Error | JobStatus::Cancelled) {
                return Err(DownloadError::NotRetriable { job_id: id });
            }
            job.status = JobStatus::Queued;
            job.progress = 0;
            job.downloaded_bytes = 0;
            job.total_bytes = 0;
            job.speed_kbps = 0.0;
            job.error = None;
            job.status_detail.clear();
            job.start_time = Utc::now();
            job.end_time = None;
            job.pause_requested = false;
            job.cancel_requested = false;
        }

        self.events.publish(Event::DownloadQueued { job_id: id, title: entry.handle.read().await.title.clone() });
        let manager = Arc::clone(self);
        let ctx = revaer_core::session::current();
        let handle = Arc::clone(&entry.handle);
        tokio::spawn(async move {
            revaer_core::session::scope(ctx, manager.run_job(id, handle)).await;
        });
        Ok(())
    }

    /// Swap in a brand-new semaphore of the given capacity. In-flight jobs
    /// holding a permit from the old semaphore keep running, ungoverned by
    /// the new capacity — matches the teacher's own
    /// `set_max_concurrent`, which performs no drain step.
    pub async fn set_max_concurrent(&self, capacity: usize) {
        let capacity = capacity.max(1);
        *self.semaphore.write().await = Arc::new(Semaphore::new(capacity));
    }

    /// Switch the backend newly queued jobs will use. Unknown names are
    /// rejected; in-flight jobs keep whichever backend they started with.
    pub async fn set_backend(&self, name: &str) -> DownloadResult<()> {
        let resolved = self
            .backends
            .keys()
            .copied()
            .find(|candidate| *candidate == name)
            .ok_or_else(|| DownloadError::BackendFailed(format!("unknown backend: {name}")))?;
        *self.active_backend.write().await = resolved;
        Ok(())
    }

    /// The name of the backend newly queued jobs will use.
    pub async fn get_backend(&self) -> &'static str {
        *self.active_backend.read().await
    }

    async fn entry(&self, id: Uuid) -> DownloadResult<Arc<RwLock<DownloadJob>>> {
        let jobs = self.jobs.read().await;
        jobs.iter()
            .find(|(job_id, _)| *job_id == id)
            .map(|(_, entry)| Arc::clone(&entry.handle))
            .ok_or(DownloadError::JobNotFound { job_id: id })
    }

    async fn run_job(self: Arc<Self>, id: Uuid, handle: Arc<RwLock<DownloadJob>>) {
        let semaphore = Arc::clone(&*self.semaphore.read().await);
        let Ok(_permit) = semaphore.acquire().await else {
            return;
        };

        let requested_backend = *self.active_backend.read().await;
        let backend = {
            let candidate = self.backends.get(requested_backend);
            match candidate {
                Some(backend) if backend.is_available() => Arc::clone(backend),
                _ => {
                    warn!(backend = requested_backend, "requested backend unavailable, falling back to native");
                    Arc::clone(self.backends.get(DEFAULT_BACKEND).expect("native backend always registered"))
                }
            }
        };

        let source = {
            let jobs = self.jobs.read().await;
            jobs.iter().find(|(job_id, _)| *job_id == id).map(|(_, entry)| entry.source.clone())
        };
        let Some(source) = source else {
            return;
        };

        self.events.publish(Event::DownloadStarted { job_id: id });

        let ctx = revaer_core::session::current();
        let resolved_url = match self.resolve_source(&ctx, &handle, &source).await {
            Ok(url) => url,
            Err(error) => {
                self.fail_job(&handle, id, error.to_string()).await;
                return;
            }
        };

        {
            let mut job = handle.write().await;
            job.status = JobStatus::Downloading;
        }

        let result = backend.download(&handle, &resolved_url, &self.events).await;

        if result.completed {
            let mut job = handle.write().await;
            job.status = JobStatus::Completed;
            job.progress = 100;
            job.end_time = Some(Utc::now());
            if let Some(warning) = result.warning {
                job.status_detail = warning;
            }
            let output_path = job.output_path.clone();
            drop(job);
            self.events.publish(Event::DownloadCompleted { job_id: id, output_path });
            return;
        }

        if let Some(error) = result.error {
            self.fail_job(&handle, id, error).await;
            return;
        }

        let cancelled = handle.read().await.cancel_requested;
        let mut job = handle.write().await;
        job.end_time = Some(Utc::now());
        if cancelled {
            job.status = JobStatus::Cancelled;
            drop(job);
            self.events.publish(Event::DownloadCancelled { job_id: id });
        } else {
            job.status = JobStatus::Paused;
            drop(job);
            self.events.publish(Event::DownloadPaused { job_id: id });
        }
    }

    async fn resolve_source(
        &self,
        ctx: &SessionContext,
        handle: &Arc<RwLock<DownloadJob>>,
        source: &QueueRequest,
    ) -> DownloadResult<String> {
        let is_reference = source.magnet.is_some()
            || source.direct_url.as_deref().is_some_and(is_torrent_reference);

        if !is_reference {
            return source.direct_url.clone().ok_or(DownloadError::NoDownloadUrl);
        }

        {
            let mut job = handle.write().await;
            job.status = JobStatus::Resolving;
        }

        let resolver = self.resolver.as_ref().ok_or(DownloadError::NotAuthenticated("magnet/torrent-reference downloads"))?;
        let job_id = handle.read().await.id;
        let status_handle = Arc::clone(handle);
        let on_status = move |message: &str| {
            let status_handle = Arc::clone(&status_handle);
            let message = message.to_string();
            tracing::debug!(job = %job_id, status = %message, "resolving download source");
            if let Ok(mut job) = status_handle.try_write() {
                job.status_detail = message;
            }
        };

        let links = if let Some(magnet) = &source.magnet {
            resolver.resolve_magnet(ctx, magnet, &on_status).await?
        } else {
            let url = source.direct_url.as_deref().expect("checked above");
            resolver.resolve_torrent_url(ctx, url, &on_status).await?
        };

        links.into_iter().next().ok_or(DownloadError::NoLinksAvailable)
    }

    async fn fail_job(&self, handle: &Arc<RwLock<DownloadJob>>, id: Uuid, message: String) {
        let mut job = handle.write().await;
        job.status = JobStatus::Error;
        job.error = Some(message.clone());
        job.end_time = Some(Utc::now());
        drop(job);
        self.events.publish(Event::DownloadError { job_id: id, message });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn manager(events: EventBus) -> (tempfile::TempDir, Arc<DownloadManager>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = SettingsService::new(dir.path(), events.clone()).expect("settings");
        let ctx = SessionContext::default();
        let manager = DownloadManager::new(reqwest::Client::new(), &settings, None, events, &ctx);
        (dir, Arc::new(manager))
    }

    async fn poll_until_terminal(manager: &DownloadManager, id: Uuid) -> DownloadJob {
        for _ in 0..200 {
            let job = manager.get(id).await.expect("job exists");
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never reached a terminal status");
    }

    #[tokio::test]
    async fn queue_without_a_source_is_rejected() {
        let (_dir, manager) = manager(EventBus::new());
        let request = QueueRequest {
            title: "no source".into(),
            output_path: "/tmp/whatever".into(),
            magnet: None,
            direct_url: None,
        };
        let error = manager.queue(request).await.expect_err("should reject");
        assert!(matches!(error, DownloadError::MissingSource));
    }

    #[tokio::test]
    async fn unknown_job_id_is_reported() {
        let (_dir, manager) = manager(EventBus::new());
        let error = manager.get(Uuid::new_v4()).await.expect_err("should fail");
        assert!(matches!(error, DownloadError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn set_backend_rejects_unknown_names() {
        let (_dir, manager) = manager(EventBus::new());
        let error = manager.set_backend("does-not-exist").await.expect_err("should reject");
        assert!(matches!(error, DownloadError::BackendFailed(_)));
        assert_eq!(manager.get_backend().await, "native");
    }

    #[tokio::test]
    async fn a_direct_url_download_completes_through_the_native_backend() {
        let server = MockServer::start().await;
        let body = vec![5u8; 1024];
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let (dir, manager) = manager(EventBus::new());
        let output_path = dir.path().join("out.bin");
        let request = QueueRequest {
            title: "direct download".into(),
            output_path: output_path.to_str().expect("utf8 path").to_string(),
            magnet: None,
            direct_url: Some(format!("{}/file.bin", server.uri())),
        };

        let id = manager.queue(request).await.expect("queue");
        let job = poll_until_terminal(&manager, id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.downloaded_bytes, 1024);
        let written = tokio::fs::read(&output_path).await.expect("read output");
        assert_eq!(written, body);
    }

    #[tokio::test]
    async fn a_magnet_download_without_a_resolver_fails_fast() {
        let (_dir, manager) = manager(EventBus::new());
        let request = QueueRequest {
            title: "magnet download".into(),
            output_path: "/tmp/out.bin".into(),
            magnet: Some("magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01".into()),
            direct_url: None,
        };
        let id = manager.queue(request).await.expect("queue");
        let job = poll_until_terminal(&manager, id).await;
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.is_some());
    }

    #[tokio::test]
    async fn cancel_is_a_no_op_once_terminal() {
        let (_dir, manager) = manager(EventBus::new());
        let request = QueueRequest {
            title: "magnet download".into(),
            output_path: "/tmp/out.bin".into(),
            magnet: Some("magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01".into()),
            direct_url: None,
        };
        let id = manager.queue(request).await.expect("queue");
        let _ = poll_until_terminal(&manager, id).await;
        manager.cancel(id).await.expect("cancel");
        let job = manager.get(id).await.expect("job exists");
        assert_eq!(job.status, JobStatus::Error);
    }

    #[tokio::test]
    async fn set_max_concurrent_swaps_the_semaphore() {
        let (_dir, manager) = manager(EventBus::new());
        manager.set_max_concurrent(1).await;
        manager.set_max_concurrent(5).await;
        assert_eq!(manager.semaphore.read().await.available_permits(), 5);
    }
}
