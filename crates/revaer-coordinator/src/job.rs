//! Async search-job facade (§4.9): wraps the fan-out coordinator behind a
//! create/poll/cancel API, driving one background worker per job and
//! incrementally re-ranking the snapshot as provider completions arrive.
//!
//! Grounded on two teacher patterns: the registry/background-worker shape
//! of `orchestrator.rs`'s `TorrentCatalog` (a `RwLock`-guarded table plus a
//! spawned task observing progress), and `source_manager.py`'s per-call
//! timeout/fast-return math, now driven per completion instead of in one
//! blocking call.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use revaer_core::{
    rank, JobProgress, JobTimings, ResultPage, SearchFilters, SearchJob, SearchJobPhase,
    SearchJobStatus, SearchMode, SearchResult, SourceProgress, SourceStatus,
};
use revaer_events::{Event, EventBus};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::debug;
use uuid::Uuid;

use crate::coordinator::{self, Coordinator};
use crate::error::{CoordinatorError, CoordinatorResult};

/// Maximum number of jobs retained in the table; oldest evicted first once
/// over capacity.
pub const JOB_TABLE_CAPACITY: usize = 80;
/// Jobs older than this, measured from creation, are garbage-collected
/// regardless of table size.
pub const JOB_TTL_MINUTES: i64 = 45;

const FAST_TIMEOUT_SECONDS: u64 = 10;
const DEEP_TIMEOUT_SECONDS: u64 = 20;
const MIN_FETCH_LIMIT: u32 = 120;
const MAX_FETCH_LIMIT: u32 = 600;
const POLL_SLICE: Duration = Duration::from_millis(250);

/// Request body accepted by [`JobFacade::create_job`].
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    /// Raw query text; must be non-empty.
    pub query: String,
    /// 1-based page number.
    pub page: u32,
    /// Results requested per page.
    pub per_page: u32,
    /// `fast` or `deep` mode, controlling the default timeout and provider
    /// subset.
    pub mode: SearchMode,
    /// Result-membership filters, forwarded to the coordinator.
    pub filters: SearchFilters,
}

impl CreateJobRequest {
    /// A `fast`-mode request for `query` with page 1 / 20 per page.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            per_page: 20,
            mode: SearchMode::Fast,
            filters: SearchFilters::default(),
        }
    }
}

/// Tunables for a [`JobFacade`] instance.
#[derive(Debug, Clone, Default)]
pub struct JobFacadeConfig {
    /// Provider names considered "scraping-friendly", used to restrict the
    /// candidate set under `SearchMode::Fast`. An empty list (the default)
    /// falls back to every enabled provider, same as `SearchMode::Deep`;
    /// the composition root that registers concrete providers is expected
    /// to supply this list (see DESIGN.md).
    pub fast_providers: Vec<String>,
}

/// Async search-job facade: wraps the fan-out coordinator behind a
/// create/poll/cancel API backed by a bounded, TTL'd job table.
pub struct JobFacade {
    coordinator: Arc<Coordinator>,
    events: EventBus,
    jobs: RwLock<Vec<(Uuid, Arc<RwLock<SearchJob>>)>>,
    config: JobFacadeConfig,
}

impl JobFacade {
    /// Construct a facade over an already-configured coordinator.
    #[must_use]
    pub fn new(coordinator: Arc<Coordinator>, events: EventBus, config: JobFacadeConfig) -> Self {
        Self {
            coordinator,
            events,
            jobs: RwLock::new(Vec::new()),
            config,
        }
    }

    /// Create and dispatch a new search job, returning its id immediately.
    /// The worker runs as a detached background task.
    pub async fn create_job(self: &Arc<Self>, request: CreateJobRequest) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        debug!(
            job_id = %id,
            fetch_limit = fetch_limit(request.page, request.per_page),
            "search job created"
        );

        let job = SearchJob {
            id,
            query: request.query.clone(),
            status: SearchJobStatus::Running,
            phase: SearchJobPhase::Init,
            mode: request.mode,
            created_at: now,
            updated_at: now,
            message: "queued".to_string(),
            partial: true,
            progress: JobProgress::default(),
            timings: JobTimings::default(),
            sources: BTreeMap::new(),
            result: ResultPage {
                page: request.page,
                per_page: request.per_page,
                ..ResultPage::default()
            },
            cancel_requested: false,
        };
        let handle = Arc::new(RwLock::new(job));

        {
            let mut jobs = self.jobs.write().await;
            jobs.push((id, Arc::clone(&handle)));
            while jobs.len() > JOB_TABLE_CAPACITY {
                jobs.remove(0);
            }
        }
        self.gc().await;

        let facade = Arc::clone(self);
        let ctx = revaer_core::session::current();
        tokio::spawn(async move {
            revaer_core::session::scope(ctx, facade.run_job(id, handle, request)).await;
        });

        id
    }

    /// Snapshot the current state of a job.
    pub async fn get_job(&self, id: Uuid) -> CoordinatorResult<SearchJob> {
        let jobs = self.jobs.read().await;
        let (_, handle) = jobs
            .iter()
            .find(|(job_id, _)| *job_id == id)
            .ok_or(CoordinatorError::JobNotFound { job_id: id })?;
        Ok(handle.read().await.clone())
    }

    /// Request cancellation of a running job. A no-op once the job has
    /// already reached a terminal status.
    pub async fn cancel_job(&self, id: Uuid) -> CoordinatorResult<()> {
        let jobs = self.jobs.read().await;
        let (_, handle) = jobs
            .iter()
            .find(|(job_id, _)| *job_id == id)
            .ok_or(CoordinatorError::JobNotFound { job_id: id })?;
        let mut job = handle.write().await;
        if matches!(
            job.status,
            SearchJobStatus::Done | SearchJobStatus::Cancelled | SearchJobStatus::Error
        ) {
            return Ok(());
        }
        job.cancel_requested = true;
        job.status = SearchJobStatus::Cancelling;
        job.updated_at = Utc::now();
        Ok(())
    }

    /// Evict jobs past the 45-minute TTL, then trim to the table capacity.
    async fn gc(&self) {
        let cutoff = Utc::now() - chrono::Duration::minutes(JOB_TTL_MINUTES);
        let mut jobs = self.jobs.write().await;
        let mut fresh = Vec::with_capacity(jobs.len());
        for (id, handle) in jobs.drain(..) {
            if handle.read().await.created_at >= cutoff {
                fresh.push((id, handle));
            }
        }
        *jobs = fresh;
        while jobs.len() > JOB_TABLE_CAPACITY {
            jobs.remove(0);
        }
    }

    async fn run_job(self: Arc<Self>, id: Uuid, handle: Arc<RwLock<SearchJob>>, request: CreateJobRequest) {
        self.events.publish(Event::SearchStarted {
            job_id: Some(id),
            query: request.query.clone(),
        });

        let filters = self.effective_filters(&request);
        let timeout_seconds = filters
            .source_timeout_seconds
            .unwrap_or(match request.mode {
                SearchMode::Fast => FAST_TIMEOUT_SECONDS,
                SearchMode::Deep => DEEP_TIMEOUT_SECONDS,
            })
            .max(1);

        {
            let mut job = handle.write().await;
            job.phase = SearchJobPhase::Querying;
            job.updated_at = Utc::now();
        }

        let (dispatch, skip_warnings) = self.coordinator.candidates_for(&filters).await;

        {
            let mut job = handle.write().await;
            job.progress.total_sources =
                u32::try_from(dispatch.len() + skip_warnings.len()).unwrap_or(u32::MAX);
            for (name, warning) in &skip_warnings {
                job.sources.insert(
                    name.clone(),
                    SourceProgress {
                        status: SourceStatus::Skipped,
                        warning: Some(warning.clone()),
                        elapsed_ms: 0,
                        attempts: 0,
                    },
                );
            }
            for (name, _) in &dispatch {
                job.sources.entry(name.clone()).or_insert(SourceProgress {
                    status: SourceStatus::Pending,
                    warning: None,
                    elapsed_ms: 0,
                    attempts: 0,
                });
            }
            job.updated_at = Utc::now();
        }

        if dispatch.is_empty() {
            self.finish_job(&handle, Vec::new(), &filters, request.page, request.per_page, false)
                .await;
            self.events.publish(Event::SearchCompleted {
                job_id: Some(id),
                result_count: 0,
                total: 0,
            });
            return;
        }

        let config = self.coordinator.config().clone();
        let deadline = Instant::now() + Duration::from_secs(timeout_seconds);
        let mut pending_names: HashSet<String> = dispatch.iter().map(|(name, _)| name.clone()).collect();
        let mut accumulated: Vec<SearchResult> = Vec::new();
        let mut join_set = JoinSet::new();

        for (name, provider) in dispatch {
            let reliability = config.reliability;
            let query = request.query.clone();
            let page = request.page;
            join_set.spawn(async move {
                let started = Instant::now();
                let outcome = coordinator::run_with_retry(provider.as_ref(), &query, page, &reliability).await;
                (name, outcome, started.elapsed())
            });
        }

        let started = Instant::now();
        let mut fast_return_triggered = false;

        while !pending_names.is_empty() {
            if handle.read().await.cancel_requested {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let poll_slice = (deadline - now).min(POLL_SLICE);

            if let Ok(Some(Ok((name, outcome, elapsed)))) =
                tokio::time::timeout(poll_slice, join_set.join_next()).await
            {
                pending_names.remove(&name);
                self.coordinator.record_outcome(&name, &outcome).await;
                self.events.publish(Event::SearchProgress {
                    job_id: Some(id),
                    source: name.clone(),
                    ok: outcome.ok,
                    result_count: outcome.results.len(),
                });

                let has_results = !outcome.results.is_empty();
                {
                    let mut job = handle.write().await;
                    job.sources.insert(
                        name.clone(),
                        SourceProgress {
                            status: if outcome.ok { SourceStatus::Done } else { SourceStatus::Error },
                            warning: (!outcome.warning.is_empty()).then(|| outcome.warning.clone()),
                            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                            attempts: outcome.attempts,
                        },
                    );
                    job.progress.completed_sources += 1;
                    if has_results && job.progress.first_result_at.is_none() {
                        job.progress.first_result_at = Some(Utc::now());
                    }
                }

                accumulated.extend(outcome.results);
                recompute_snapshot(&handle, &accumulated, &filters, request.page, request.per_page, false).await;
            }

            let elapsed_secs = started.elapsed().as_secs_f64();
            let prefers_pending = pending_names
                .iter()
                .any(|name| config.prefer_completion_sources.iter().any(|p| p == name));
            if !pending_names.is_empty()
                && accumulated.len() >= config.early_return_min_results.max(1)
                && elapsed_secs >= config.early_return_seconds
                && !filters.wait_for_all_sources
                && !prefers_pending
            {
                fast_return_triggered = true;
                break;
            }
        }

        let cancelled = handle.read().await.cancel_requested;
        join_set.abort_all();
        for name in &pending_names {
            let (status, warning) = if cancelled {
                (SourceStatus::Cancelled, "cancelled by caller".to_string())
            } else if fast_return_triggered {
                (SourceStatus::Skipped, format!("{name} skipped for fast results"))
            } else {
                (SourceStatus::Error, format!("{name} timed out after {timeout_seconds}s"))
            };
            {
                let mut job = handle.write().await;
                job.sources.insert(
                    name.clone(),
                    SourceProgress {
                        status,
                        warning: Some(warning),
                        elapsed_ms: 0,
                        attempts: 0,
                    },
                );
            }
            self.events.publish(Event::SearchProgress {
                job_id: Some(id),
                source: name.clone(),
                ok: false,
                result_count: 0,
            });
        }
        while join_set.join_next().await.is_some() {}

        self.finish_job(&handle, accumulated, &filters, request.page, request.per_page, cancelled)
            .await;

        let snapshot = handle.read().await;
        if cancelled {
            self.events.publish(Event::SearchError {
                job_id: Some(id),
                message: "cancelled".to_string(),
            });
        } else {
            self.events.publish(Event::SearchCompleted {
                job_id: Some(id),
                result_count: snapshot.result.groups.len(),
                total: snapshot.progress.total_sources as usize,
            });
        }
    }

    fn effective_filters(&self, request: &CreateJobRequest) -> SearchFilters {
        let mut filters = request.filters.clone();
        if matches!(request.mode, SearchMode::Fast) && !self.config.fast_providers.is_empty() {
            filters.enabled_sources = Some(match filters.enabled_sources {
                Some(existing) => existing
                    .into_iter()
                    .filter(|name| self.config.fast_providers.contains(name))
                    .collect(),
                None => self.config.fast_providers.clone(),
            });
        }
        filters
    }

    async fn finish_job(
        &self,
        handle: &Arc<RwLock<SearchJob>>,
        accumulated: Vec<SearchResult>,
        filters: &SearchFilters,
        page: u32,
        per_page: u32,
        cancelled: bool,
    ) {
        {
            let mut job = handle.write().await;
            job.phase = SearchJobPhase::Ranking;
        }
        recompute_snapshot(handle, &accumulated, filters, page, per_page, true).await;
        let mut job = handle.write().await;
        job.status = if cancelled { SearchJobStatus::Cancelled } else { SearchJobStatus::Done };
        job.message = if cancelled { "cancelled".to_string() } else { "done".to_string() };
        job.partial = false;
        job.phase = SearchJobPhase::Done;
        job.updated_at = Utc::now();
    }
}

async fn recompute_snapshot(
    handle: &Arc<RwLock<SearchJob>>,
    accumulated: &[SearchResult],
    filters: &SearchFilters,
    page: u32,
    per_page: u32,
    final_pass: bool,
) {
    let deduped = rank::dedupe(accumulated.to_vec());
    let aggregated = rank::aggregate(deduped);
    let filtered = coordinator::apply_filters(aggregated, filters);
    let mut sorted = filtered;
    rank::sort_results(&mut sorted);
    let total = sorted.len();

    let start = usize::try_from(page.saturating_sub(1)).unwrap_or(0) * usize::try_from(per_page.max(1)).unwrap_or(1);
    let page_slice: Vec<SearchResult> = sorted
        .into_iter()
        .skip(start)
        .take(usize::try_from(per_page.max(1)).unwrap_or(1))
        .collect();
    let has_more = start + page_slice.len() < total;

    let mut job = handle.write().await;
    job.result = ResultPage {
        groups: page_slice,
        page,
        per_page,
        has_more,
    };
    job.partial = !final_pass;
    let wall_ms = (Utc::now() - job.created_at).num_milliseconds().max(0);
    job.timings.wall_ms = u64::try_from(wall_ms).unwrap_or(u64::MAX);
    job.updated_at = Utc::now();
}

/// Per-page fetch-limit hint for provider calls: `max(120, min(600,
/// page·perPage·3))`. The `Provider` contract takes no count parameter, so
/// this is currently informational only (see DESIGN.md).
#[must_use]
fn fetch_limit(page: u32, per_page: u32) -> u32 {
    let raw = u64::from(page) * u64::from(per_page) * 3;
    u32::try_from(raw.clamp(u64::from(MIN_FETCH_LIMIT), u64::from(MAX_FETCH_LIMIT))).unwrap_or(MAX_FETCH_LIMIT)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use revaer_test_support::{ScriptedOutcome, ScriptedProvider};

    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorConfig};

    fn sample_result(title: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            link: format!("https://example.com/{title}.zip"),
            size: 0,
            seeds: 0,
            leeches: 0,
            source: "Stub".to_string(),
            infohash: String::new(),
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec!["Stub".to_string()],
            link_quality: 0,
        }
    }

    fn facade() -> (Arc<JobFacade>, Arc<Coordinator>) {
        let coordinator = Arc::new(Coordinator::new(EventBus::new(), CoordinatorConfig::default()));
        let facade = Arc::new(JobFacade::new(
            Arc::clone(&coordinator),
            EventBus::new(),
            JobFacadeConfig::default(),
        ));
        (facade, coordinator)
    }

    #[tokio::test]
    async fn unknown_job_id_is_reported() {
        let (facade, _coordinator) = facade();
        let err = facade.get_job(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::JobNotFound { .. }));
    }

    #[tokio::test]
    async fn job_completes_and_carries_results() {
        let (facade, coordinator) = facade();
        coordinator
            .register(Arc::new(ScriptedProvider::new(
                "P1",
                vec![ScriptedOutcome::Ok(vec![sample_result("demo")])],
            )))
            .await;

        let id = facade.create_job(CreateJobRequest::new("demo")).await;

        let mut job = facade.get_job(id).await.unwrap();
        for _ in 0..50 {
            if job.status == SearchJobStatus::Done {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            job = facade.get_job(id).await.unwrap();
        }

        assert_eq!(job.status, SearchJobStatus::Done);
        assert!(!job.partial);
        assert_eq!(job.result.groups.len(), 1);
        assert_eq!(job.progress.completed_sources, 1);
    }

    #[tokio::test]
    async fn cancelling_a_job_marks_pending_sources_cancelled() {
        let (facade, coordinator) = facade();
        coordinator
            .register(Arc::new(ScriptedProvider::new(
                "Slow",
                vec![ScriptedOutcome::Delayed(Duration::from_secs(5), vec![])],
            )))
            .await;

        let mut request = CreateJobRequest::new("demo");
        request.filters.wait_for_all_sources = true;
        let id = facade.create_job(request).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        facade.cancel_job(id).await.unwrap();

        let mut job = facade.get_job(id).await.unwrap();
        for _ in 0..50 {
            if job.status == SearchJobStatus::Cancelled {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            job = facade.get_job(id).await.unwrap();
        }

        assert_eq!(job.status, SearchJobStatus::Cancelled);
        assert!(job
            .sources
            .get("Slow")
            .is_some_and(|progress| progress.status == SourceStatus::Cancelled));
    }

    #[test]
    fn fetch_limit_clamps_to_expected_bounds() {
        assert_eq!(fetch_limit(1, 10), 120);
        assert_eq!(fetch_limit(5, 50), 600);
        assert_eq!(fetch_limit(2, 40), 240);
    }

}
