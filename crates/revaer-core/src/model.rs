//! Data model shared by every provider, the coordinator, and the download
//! manager: unified search results, download jobs, per-provider health, the
//! search cache entry shape, and the async search-job snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One URL attached to a [`SearchResult`], scored independently so the
/// coordinator can pick the best link after cross-provider aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkCandidate {
    /// The candidate URL (may be a magnet URI).
    pub url: String,
    /// Provider that contributed this candidate.
    pub source: String,
    /// Quality score, see `rank::link_quality`.
    pub quality: i64,
    /// Seed count, when known (torrent candidates).
    pub seeds: u64,
    /// Leech count, when known (torrent candidates).
    pub leeches: u64,
    /// Size in bytes, when known.
    pub size: u64,
}

/// A unified, deduplicated, possibly cross-provider-merged search result.
///
/// Identity is the 40-hex uppercase infohash for torrents, or the lowercased
/// primary link (falling back to the lowercased title) for everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Display title.
    pub title: String,
    /// Primary link: a magnet URI or a direct/indirect HTTP(S) URL.
    pub link: String,
    /// Size in bytes (0 if unknown).
    pub size: u64,
    /// Seed count (torrents only; 0 otherwise).
    pub seeds: u64,
    /// Leech count (torrents only; 0 otherwise).
    pub leeches: u64,
    /// Name of the provider that produced this result before aggregation, or
    /// `"<primary> +N"` after merging `N` additional providers in.
    pub source: String,
    /// 40-hex uppercase infohash, or empty for non-torrent results.
    pub infohash: String,
    /// Optional category tag supplied by the provider.
    pub category: Option<String>,
    /// Optional upload date, provider-formatted.
    pub upload_date: Option<String>,
    /// Ordered link candidates; the first is the highest-quality and mirrors
    /// `(link, link_quality)`.
    pub link_candidates: Vec<LinkCandidate>,
    /// Ordered list of contributing provider names; first is primary.
    pub aggregated_sources: Vec<String>,
    /// Quality score of the primary link.
    pub link_quality: i64,
}

impl SearchResult {
    /// Identity key used for deduplication: the infohash for torrents,
    /// otherwise the lowercased link, falling back to the lowercased title.
    #[must_use]
    pub fn identity_key(&self) -> String {
        if !self.infohash.is_empty() {
            return self.infohash.clone();
        }
        if !self.link.is_empty() {
            return self.link.to_lowercase();
        }
        self.title.to_lowercase()
    }

    /// Whether this result identifies a torrent (has a non-empty infohash).
    #[must_use]
    pub fn is_torrent(&self) -> bool {
        !self.infohash.is_empty()
    }
}

/// Lifecycle status of a [`DownloadJob`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for a worker slot.
    Queued,
    /// Resolving a magnet/torrent reference into direct URLs.
    Resolving,
    /// Actively transferring bytes.
    Downloading,
    /// Paused by the caller; resumable.
    Paused,
    /// Finished successfully.
    Completed,
    /// Cancelled by the caller.
    Cancelled,
    /// Terminated by an unrecoverable error.
    Error,
}

impl JobStatus {
    /// Whether this status is terminal (no further transitions are valid).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Error)
    }
}

/// A managed download, created by the download manager and mutated only by
/// its owning worker and by the manager's control calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Opaque job identifier.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Destination path on disk.
    pub output_path: String,
    /// Source magnet URI, when the job originated from a torrent result.
    pub magnet: Option<String>,
    /// Source direct URL, when the job originated from a direct-link result.
    pub direct_url: Option<String>,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Integer percent complete, `0..=100`.
    pub progress: u8,
    /// Bytes written so far.
    pub downloaded_bytes: u64,
    /// Total expected bytes (0 if unknown).
    pub total_bytes: u64,
    /// Instantaneous transfer speed in kilobytes per second.
    pub speed_kbps: f64,
    /// Last error message, when `status == Error`.
    pub error: Option<String>,
    /// Free-form detail appended to the status for display purposes.
    pub status_detail: String,
    /// Wall-clock start time.
    pub start_time: DateTime<Utc>,
    /// Wall-clock end time, once terminal.
    pub end_time: Option<DateTime<Utc>>,
    /// Set by `pause`; observed by the worker between I/O chunks.
    #[serde(skip)]
    pub pause_requested: bool,
    /// Set by `cancel`; observed by the worker between I/O chunks.
    #[serde(skip)]
    pub cancel_requested: bool,
}

impl DownloadJob {
    /// Create a freshly queued job for the given title/destination/source.
    #[must_use]
    pub fn new(title: String, output_path: String, magnet: Option<String>, direct_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            output_path,
            magnet,
            direct_url,
            status: JobStatus::Queued,
            progress: 0,
            downloaded_bytes: 0,
            total_bytes: 0,
            speed_kbps: 0.0,
            error: None,
            status_detail: String::new(),
            start_time: Utc::now(),
            end_time: None,
            pause_requested: false,
            cancel_requested: false,
        }
    }

    /// Recompute `progress` from `downloaded_bytes`/`total_bytes`.
    pub fn recompute_progress(&mut self) {
        if self.total_bytes > 0 {
            let ratio = to_f64(self.downloaded_bytes) / to_f64(self.total_bytes);
            #[expect(
                clippy::cast_possible_truncation,
                reason = "ratio is clamped to [0,100] before truncation"
            )]
            let percent = (ratio * 100.0).clamp(0.0, 100.0) as u8;
            self.progress = percent;
        }
    }
}

const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "byte counts never approach 2^53, so this cast is exact in practice"
    )]
    let out = value as f64;
    out
}

/// Per-provider reliability state, used by the routing score and circuit
/// breaker (see `revaer-coordinator`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceHealth {
    /// Total search attempts issued to this provider.
    pub attempts: u64,
    /// Attempts that returned `ok = true`.
    pub successes: u64,
    /// Attempts that returned `ok = false`.
    pub failures: u64,
    /// Consecutive failures since the last success.
    pub consecutive_failures: u32,
    /// Most recent error/warning message, empty on success.
    pub last_error: String,
    /// Latency of the most recent attempt, in milliseconds.
    pub last_latency_ms: u64,
    /// Timestamp of the most recent attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Timestamp of the most recent success.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Instant until which the circuit breaker stays open.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Whether the circuit breaker is currently open.
    pub circuit_open: bool,
    /// Number of attempts skipped while the circuit was open.
    pub skip_count: u64,
}

impl SourceHealth {
    /// Success rate `successes / attempts`, or `1.0` if never attempted.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            to_f64(self.successes) / to_f64(self.attempts)
        }
    }
}

/// Cached search results keyed by `(query, page, filter signature)`.
#[derive(Debug, Clone)]
pub struct SearchCacheEntry {
    /// Wall-clock time the entry was written.
    pub cached_at: DateTime<Utc>,
    /// Cached result page.
    pub results: Vec<SearchResult>,
}

/// Status of a single provider within a running [`SearchJob`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Not yet dispatched.
    Pending,
    /// Dispatched, awaiting completion.
    Running,
    /// Completed successfully.
    Done,
    /// Completed with an error.
    Error,
    /// Skipped (circuit open, or fast-return before dispatch).
    Skipped,
    /// Cancelled before completion.
    Cancelled,
    /// Did not complete before the deadline.
    Timeout,
}

/// Per-source bookkeeping recorded on a [`SearchJob`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProgress {
    /// Current status.
    pub status: SourceStatus,
    /// Warning message, if any.
    pub warning: Option<String>,
    /// Elapsed time for this provider's attempt(s), in milliseconds.
    pub elapsed_ms: u64,
    /// Number of attempts made (including retries).
    pub attempts: u32,
}

/// Overall lifecycle status of a [`SearchJob`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchJobStatus {
    /// Actively fanning out to providers.
    Running,
    /// Cancellation requested; winding down.
    Cancelling,
    /// Cancelled before completion.
    Cancelled,
    /// Finished successfully (possibly with partial results).
    Done,
    /// Finished with an unrecoverable error.
    Error,
}

/// Phase within a running search job's lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchJobPhase {
    /// Job created, not yet dispatched.
    Init,
    /// Providers dispatched, awaiting completions.
    Querying,
    /// All (or fast-returned) completions in; ranking/paginating.
    Ranking,
    /// Finished.
    Done,
}

/// Search mode, controlling the default timeout and provider subset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Restricts to a scraping-friendly provider subset with a 10s timeout.
    Fast,
    /// All enabled providers with a 20s timeout.
    Deep,
}

/// A page of ranked results plus pagination metadata.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResultPage {
    /// Results on this page.
    pub groups: Vec<SearchResult>,
    /// Page number (1-based).
    pub page: u32,
    /// Results requested per page.
    pub per_page: u32,
    /// Whether additional pages exist beyond this one.
    pub has_more: bool,
}

/// Progress counters surfaced on a running [`SearchJob`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobProgress {
    /// Number of providers selected for this job.
    pub total_sources: u32,
    /// Number of providers that have completed (successfully or not).
    pub completed_sources: u32,
    /// Timestamp of the first non-empty provider completion.
    pub first_result_at: Option<DateTime<Utc>>,
}

/// Timing breakdown surfaced on a running [`SearchJob`].
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobTimings {
    /// Total wall-clock milliseconds since job creation.
    pub wall_ms: u64,
    /// Aggregate milliseconds of process CPU time attributed to the job.
    /// Not tracked per-job by the in-process worker; always `0` until a
    /// per-task CPU accounting source is wired in.
    pub cpu_ms: u64,
    /// Aggregate milliseconds spent waiting on network I/O.
    pub net_wait_ms: u64,
    /// Monotonic-clock start instant, in milliseconds, used to recompute
    /// elapsed time across a snapshot without depending on wall-clock
    /// adjustments. `None` until the job's worker records it.
    pub started_mono: Option<u64>,
}

/// Async search-job snapshot exposed by the search-job facade (§4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchJob {
    /// Job identifier.
    pub id: Uuid,
    /// Original query text.
    pub query: String,
    /// Overall lifecycle status.
    pub status: SearchJobStatus,
    /// Current phase.
    pub phase: SearchJobPhase,
    /// Search mode selected at creation.
    pub mode: SearchMode,
    /// Wall-clock creation time.
    pub created_at: DateTime<Utc>,
    /// Wall-clock last-update time.
    pub updated_at: DateTime<Utc>,
    /// Human-readable status message.
    pub message: String,
    /// Whether the current `result` may still grow/change.
    pub partial: bool,
    /// Progress counters.
    pub progress: JobProgress,
    /// Timing breakdown.
    pub timings: JobTimings,
    /// Per-provider status map.
    pub sources: BTreeMap<String, SourceProgress>,
    /// Current ranked result snapshot.
    pub result: ResultPage,
    /// Set by `cancelJob`; observed by the worker between wait cycles.
    #[serde(skip)]
    pub cancel_requested: bool,
}

/// Filters recognized by the fan-out coordinator's `search` operation.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SearchFilters {
    /// Minimum seed count to keep a result.
    pub min_seeds: Option<u64>,
    /// Minimum size in gigabytes.
    pub size_min_gb: Option<f64>,
    /// Maximum size in gigabytes.
    pub size_max_gb: Option<f64>,
    /// Restrict the candidate provider set to this list, when present.
    pub enabled_sources: Option<Vec<String>>,
    /// Disable fast-return; wait for every provider or the deadline.
    #[serde(default)]
    pub wait_for_all_sources: bool,
    /// Override the per-provider timeout, in seconds.
    pub source_timeout_seconds: Option<u64>,
    /// Bypass the search cache for this call.
    #[serde(default)]
    pub cache_bust: bool,
}

impl SearchFilters {
    /// Stable signature used as part of the cache key: the sorted `k:v` join
    /// of the filter fields that affect result membership.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut parts = Vec::new();
        if let Some(v) = self.min_seeds {
            parts.push(format!("min_seeds:{v}"));
        }
        if let Some(v) = self.size_min_gb {
            parts.push(format!("size_min_gb:{v}"));
        }
        if let Some(v) = self.size_max_gb {
            parts.push(format!("size_max_gb:{v}"));
        }
        if let Some(sources) = &self.enabled_sources {
            let mut sorted = sources.clone();
            sorted.sort();
            parts.push(format!("enabled_sources:{}", sorted.join(",")));
        }
        parts.sort();
        parts.join("|")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_prefers_infohash() {
        let result = SearchResult {
            title: "Foo".into(),
            link: "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01".into(),
            size: 0,
            seeds: 0,
            leeches: 0,
            source: "P1".into(),
            infohash: "ABCDEF0123456789ABCDEF0123456789ABCDEF01".into(),
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec!["P1".into()],
            link_quality: 0,
        };
        assert_eq!(result.identity_key(), "ABCDEF0123456789ABCDEF0123456789ABCDEF01");
        assert!(result.is_torrent());
    }

    #[test]
    fn identity_key_falls_back_to_link_then_title() {
        let mut result = SearchResult {
            title: "Foo Bar".into(),
            link: "HTTPS://Example.com/a.zip".into(),
            size: 0,
            seeds: 0,
            leeches: 0,
            source: "P1".into(),
            infohash: String::new(),
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec!["P1".into()],
            link_quality: 0,
        };
        assert_eq!(result.identity_key(), "https://example.com/a.zip");
        result.link.clear();
        assert_eq!(result.identity_key(), "foo bar");
    }

    #[test]
    fn download_job_recomputes_progress() {
        let mut job = DownloadJob::new("demo".into(), "/tmp/demo".into(), None, None);
        job.total_bytes = 4096;
        job.downloaded_bytes = 2048;
        job.recompute_progress();
        assert_eq!(job.progress, 50);
    }

    #[test]
    fn filter_signature_is_order_independent_across_sets() {
        let a = SearchFilters {
            enabled_sources: Some(vec!["b".into(), "a".into()]),
            ..SearchFilters::default()
        };
        let b = SearchFilters {
            enabled_sources: Some(vec!["a".into(), "b".into()]),
            ..SearchFilters::default()
        };
        assert_eq!(a.signature(), b.signature());
    }
}
