//! Fan-out coordinator: the central search algorithm (§4.5). Routes a query
//! across registered providers ordered by routing score, respects each
//! provider's circuit breaker, retries transient failures with backoff,
//! fast-returns once enough results are in, then dedupes, aggregates,
//! filters, sorts, and paginates.
//!
//! Grounded on `original_source/pluggy/core/source_manager.py`'s `search`,
//! `_safe_search`, `_source_block_reason`, and `_record_source_outcome`; the
//! pure dedupe/aggregate/sort transforms live in `revaer_core::rank` and are
//! reused here rather than reimplemented.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use revaer_core::model::SourceHealth;
use revaer_core::{rank, Provider, ProviderOutcome, SearchFilters, SearchResult};
use revaer_events::{Event, EventBus};
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::warn;

use crate::cache::{cache_key, SearchCache};
use crate::health::{self, CircuitDecision, ReliabilityConfig};

/// Providers that must finish (or be skipped by their own circuit breaker)
/// before fast-return is allowed to fire, mirroring `source_manager.py`'s
/// `prefer_http_completion` toggle (generalized from "http" to the actual
/// provider names used in this repo).
pub const DEFAULT_PREFER_COMPLETION_SOURCES: &[&str] = &["HTTP Scrape", "Open Directory"];

/// How often the fan-out loop checks for a new completion while waiting.
const POLL_SLICE: Duration = Duration::from_millis(250);

/// Tunables for one coordinator instance.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Retry/circuit-breaker tuning.
    pub reliability: ReliabilityConfig,
    /// Default per-provider wall-clock budget, overridable per call.
    pub default_source_timeout_seconds: u64,
    /// Minimum accumulated result count before fast-return may trigger.
    pub early_return_min_results: usize,
    /// Minimum elapsed seconds before fast-return may trigger.
    pub early_return_seconds: f64,
    /// Providers that block fast-return while still pending.
    pub prefer_completion_sources: Vec<String>,
    /// Search-cache capacity.
    pub cache_capacity: usize,
    /// Search-cache per-entry TTL, in seconds.
    pub cache_ttl_seconds: i64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            reliability: ReliabilityConfig::default(),
            default_source_timeout_seconds: 12,
            early_return_min_results: 1,
            early_return_seconds: 6.0,
            prefer_completion_sources: DEFAULT_PREFER_COMPLETION_SOURCES
                .iter()
                .map(|name| (*name).to_string())
                .collect(),
            cache_capacity: crate::cache::DEFAULT_CAPACITY,
            cache_ttl_seconds: crate::cache::DEFAULT_TTL_SECONDS,
        }
    }
}

/// Result of one fan-out batch: the paginated result slice plus per-source
/// warnings recorded along the way.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Ranked, paginated results.
    pub results: Vec<SearchResult>,
    /// Total matched results before pagination.
    pub total: usize,
    /// Per-provider warning messages (skip/timeout/error reasons).
    pub source_warnings: HashMap<String, String>,
}

struct RegisteredProvider {
    provider: Arc<dyn Provider>,
    enabled: bool,
}

/// Fan-out coordinator. Owns the provider registry, the per-provider health
/// table, and the search-result cache.
pub struct Coordinator {
    providers: RwLock<Vec<RegisteredProvider>>,
    health: RwLock<HashMap<String, SourceHealth>>,
    cache: SearchCache,
    events: EventBus,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Construct a coordinator with no providers registered yet.
    #[must_use]
    pub fn new(events: EventBus, config: CoordinatorConfig) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            health: RwLock::new(HashMap::new()),
            cache: SearchCache::new(config.cache_capacity, config.cache_ttl_seconds),
            events,
            config,
        }
    }

    /// Register a provider, enabled by default.
    pub async fn register(&self, provider: Arc<dyn Provider>) {
        let mut providers = self.providers.write().await;
        providers.push(RegisteredProvider { provider, enabled: true });
    }

    /// A snapshot of every registered provider's current reliability state.
    pub async fn source_health_snapshot(&self) -> HashMap<String, SourceHealth> {
        self.health.read().await.clone()
    }

    /// Apply an enable-state reload: flip each named provider's enabled
    /// flag, invoke its `reload_from_settings` hook, invalidate the search
    /// cache, and emit `SourcesReloaded`.
    pub async fn reload(&self, enabled: &HashMap<String, bool>) {
        let mut providers = self.providers.write().await;
        for entry in providers.iter_mut() {
            if let Some(&state) = enabled.get(entry.provider.name()) {
                entry.enabled = state;
            }
            if let Err(err) = entry.provider.reload_from_settings().await {
                warn!(provider = entry.provider.name(), error = %err, "provider failed to reload from settings");
            }
        }
        let names: Vec<String> = providers.iter().map(|p| p.provider.name().to_string()).collect();
        drop(providers);
        self.cache.invalidate_all();
        self.events.publish(Event::SourcesReloaded { sources: names });
    }

    /// Run the fan-out search pipeline (§4.5.1).
    pub async fn search(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
        filters: &SearchFilters,
    ) -> SearchOutcome {
        if query.trim().is_empty() {
            return SearchOutcome::default();
        }

        let filter_signature = filters.signature();
        let key = cache_key(query, page, &filter_signature);
        if !filters.cache_bust {
            if let Some((results, total)) = self.cache.get(&key) {
                return SearchOutcome {
                    results,
                    total,
                    source_warnings: HashMap::new(),
                };
            }
        }

        self.events.publish(Event::SearchStarted {
            job_id: None,
            query: query.to_string(),
        });

        let (dispatch, mut source_warnings) = self.candidates_for(filters).await;
        if dispatch.is_empty() {
            self.events.publish(Event::SearchCompleted {
                job_id: None,
                result_count: 0,
                total: 0,
            });
            return SearchOutcome {
                source_warnings,
                ..SearchOutcome::default()
            };
        }

        let timeout_seconds = filters
            .source_timeout_seconds
            .unwrap_or(self.config.default_source_timeout_seconds)
            .max(1);
        let deadline = Instant::now() + Duration::from_secs(timeout_seconds);
        let wait_for_all = filters.wait_for_all_sources;

        let mut pending_names: HashSet<String> = dispatch.iter().map(|(name, _)| name.clone()).collect();
        let mut all_results = Vec::new();
        let mut join_set = JoinSet::new();
        for (name, provider) in dispatch {
            let reliability = self.config.reliability;
            let query = query.to_string();
            join_set.spawn(async move {
                let outcome = run_with_retry(provider.as_ref(), &query, page, &reliability).await;
                (name, outcome)
            });
        }

        let started = Instant::now();
        let mut fast_return_triggered = false;

        while !pending_names.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            let poll_slice = remaining.min(POLL_SLICE);

            if let Ok(Some(Ok((name, outcome)))) = tokio::time::timeout(poll_slice, join_set.join_next()).await {
                pending_names.remove(&name);
                if !outcome.warning.is_empty() {
                    source_warnings.insert(name.clone(), outcome.warning.clone());
                }
                self.events.publish(Event::SearchProgress {
                    job_id: None,
                    source: name.clone(),
                    ok: outcome.ok,
                    result_count: outcome.results.len(),
                });
                self.record_outcome(&name, &outcome).await;
                all_results.extend(outcome.results);
            }

            let elapsed = started.elapsed().as_secs_f64();
            let prefers_pending = pending_names
                .iter()
                .any(|name| self.config.prefer_completion_sources.iter().any(|p| p == name));
            if !pending_names.is_empty()
                && all_results.len() >= self.config.early_return_min_results.max(1)
                && elapsed >= self.config.early_return_seconds
                && !wait_for_all
                && !prefers_pending
            {
                fast_return_triggered = true;
                break;
            }
        }

        join_set.abort_all();
        for name in &pending_names {
            let message = if fast_return_triggered {
                format!("{name} skipped for fast results")
            } else {
                format!("{name} timed out after {timeout_seconds}s")
            };
            source_warnings.insert(name.clone(), message);
            self.events.publish(Event::SearchProgress {
                job_id: None,
                source: name.clone(),
                ok: false,
                result_count: 0,
            });
        }
        while join_set.join_next().await.is_some() {}

        let deduped = rank::dedupe(all_results);
        let aggregated = rank::aggregate(deduped);
        let filtered = apply_filters(aggregated, filters);
        let mut sorted = filtered;
        rank::sort_results(&mut sorted);
        let total = sorted.len();

        let start = usize::try_from(page.saturating_sub(1)).unwrap_or(0) * usize::try_from(per_page.max(1)).unwrap_or(1);
        let page_slice: Vec<SearchResult> = sorted
            .into_iter()
            .skip(start)
            .take(usize::try_from(per_page.max(1)).unwrap_or(1))
            .collect();

        self.cache.set(key, page_slice.clone(), total);
        self.events.publish(Event::SearchCompleted {
            job_id: None,
            result_count: page_slice.len(),
            total,
        });

        SearchOutcome {
            results: page_slice,
            total,
            source_warnings,
        }
    }

    /// This coordinator's tunables, exposed to the job facade in the same
    /// crate so it can reuse the reliability/fast-return defaults.
    pub(crate) fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Ordered, circuit-filtered candidate providers for `filters`, plus
    /// skip warnings for any provider whose circuit is currently open.
    /// Exposed to the job facade so both surfaces share one selection rule.
    pub(crate) async fn candidates_for(
        &self,
        filters: &SearchFilters,
    ) -> (Vec<(String, Arc<dyn Provider>)>, HashMap<String, String>) {
        let providers = self.providers.read().await;
        let mut enabled: Vec<(String, Arc<dyn Provider>)> = providers
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| (entry.provider.name().to_string(), Arc::clone(&entry.provider)))
            .collect();
        drop(providers);

        if let Some(allowed) = &filters.enabled_sources {
            enabled.retain(|(name, _)| allowed.iter().any(|a| a == name));
        }

        let health = self.health.read().await;
        enabled.sort_by(|(a, _), (b, _)| {
            let score_a = health.get(a).map_or(100.0, health::routing_score);
            let score_b = health.get(b).map_or(100.0, health::routing_score);
            score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
        });

        let now = Utc::now();
        let mut warnings = HashMap::new();
        let mut dispatch = Vec::new();
        for (name, provider) in enabled {
            let decision = health.get(&name).map_or(CircuitDecision::Proceed, |h| health::circuit_decision(h, now));
            match decision {
                CircuitDecision::Skip { retry_in_seconds } => {
                    warnings.insert(
                        name.clone(),
                        format!("Circuit open after failures; retrying automatically in {retry_in_seconds}s."),
                    );
                }
                CircuitDecision::Proceed | CircuitDecision::Probe => dispatch.push((name, provider)),
            }
        }
        drop(health);

        if !warnings.is_empty() {
            let mut health = self.health.write().await;
            for name in warnings.keys() {
                health::record_skip(health.entry(name.clone()).or_default());
            }
        }

        (dispatch, warnings)
    }

    /// Record one provider's outcome into the shared health table. Exposed
    /// to the job facade so per-job fan-out updates the same reliability
    /// state the plain `search` pipeline consults.
    pub(crate) async fn record_outcome(&self, name: &str, outcome: &ProviderOutcome) {
        let now = Utc::now();
        let mut health = self.health.write().await;
        let entry = health.entry(name.to_string()).or_default();
        if outcome.ok {
            health::record_success(entry, outcome.latency_ms, now);
        } else {
            health::record_failure(entry, outcome.latency_ms, outcome.warning.clone(), now, &self.config.reliability);
        }
    }
}

pub(crate) fn apply_filters(results: Vec<SearchResult>, filters: &SearchFilters) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|result| {
            if let Some(min_seeds) = filters.min_seeds {
                if result.seeds < min_seeds {
                    return false;
                }
            }
            #[expect(clippy::cast_precision_loss, reason = "byte counts never approach 2^53")]
            let size_bytes = result.size as f64;
            if let Some(min_gb) = filters.size_min_gb {
                if size_bytes < min_gb * 1_000_000_000.0 {
                    return false;
                }
            }
            if let Some(max_gb) = filters.size_max_gb {
                if result.size > 0 && size_bytes > max_gb * 1_000_000_000.0 {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Run one provider call with retry/backoff (§4.5.5). Because the `Provider`
/// contract requires implementations to surface empty/gated conditions as
/// `Ok(vec![])` rather than an error (see `revaer_core::Provider`'s
/// documentation), an empty success is never retried here — only an `Err`
/// result is retriable, which simplifies `source_manager.py`'s separate
/// "nonfatal empty warning" carve-out into the trait boundary itself.
pub(crate) async fn run_with_retry(
    provider: &dyn Provider,
    query: &str,
    page: u32,
    reliability: &ReliabilityConfig,
) -> ProviderOutcome {
    let mut attempts = 0;
    let mut last_warning = String::new();
    let mut last_latency_ms = 0;

    for attempt in 0..=reliability.max_retries {
        attempts += 1;
        let start = Instant::now();
        let outcome = provider.search(query, page).await;
        last_latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(results) => {
                return ProviderOutcome {
                    results,
                    warning: String::new(),
                    attempts,
                    latency_ms: last_latency_ms,
                    ok: true,
                };
            }
            Err(err) => {
                last_warning = err.to_string();
                if attempt < reliability.max_retries {
                    tokio::time::sleep(health::retry_backoff(reliability, attempt)).await;
                }
            }
        }
    }

    ProviderOutcome {
        results: vec![],
        warning: last_warning,
        attempts,
        latency_ms: last_latency_ms,
        ok: false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use revaer_test_support::{ScriptedOutcome, ScriptedProvider};

    use super::*;

    fn sample_result(title: &str, seeds: u64) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            link: format!("https://example.com/{title}.zip"),
            size: 0,
            seeds,
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

    #[tokio::test]
    async fn empty_query_short_circuits() {
        let coordinator = Coordinator::new(EventBus::new(), CoordinatorConfig::default());
        let outcome = coordinator.search("   ", 1, 20, &SearchFilters::default()).await;
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn aggregates_results_from_multiple_providers() {
        let coordinator = Coordinator::new(EventBus::new(), CoordinatorConfig::default());
        coordinator
            .register(Arc::new(ScriptedProvider::new(
                "P1",
                vec![ScriptedOutcome::Ok(vec![sample_result("demo", 10)])],
            )))
            .await;
        coordinator
            .register(Arc::new(ScriptedProvider::new(
                "P2",
                vec![ScriptedOutcome::Ok(vec![sample_result("other", 20)])],
            )))
            .await;

        let outcome = coordinator.search("demo", 1, 20, &SearchFilters::default()).await;
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].title, "other");
    }

    #[tokio::test]
    async fn fast_return_skips_slow_non_preferred_providers() {
        let config = CoordinatorConfig {
            early_return_min_results: 1,
            early_return_seconds: 0.05,
            prefer_completion_sources: vec![],
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::new(EventBus::new(), config);
        coordinator
            .register(Arc::new(ScriptedProvider::new(
                "Fast",
                vec![ScriptedOutcome::Ok(vec![sample_result("demo", 5)])],
            )))
            .await;
        coordinator
            .register(Arc::new(ScriptedProvider::new(
                "Slow",
                vec![ScriptedOutcome::Delayed(Duration::from_secs(5), vec![])],
            )))
            .await;

        let outcome = coordinator.search("demo", 1, 20, &SearchFilters::default()).await;
        assert_eq!(outcome.results.len(), 1);
        assert!(outcome.source_warnings.get("Slow").is_some_and(|w| w.contains("fast results")));
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_failures_and_skips_the_next_call() {
        let coordinator = Coordinator::new(EventBus::new(), CoordinatorConfig::default());
        let failing = Arc::new(ScriptedProvider::new(
            "Flaky",
            vec![
                ScriptedOutcome::Err("boom".into()),
                ScriptedOutcome::Err("boom".into()),
                ScriptedOutcome::Err("boom".into()),
            ],
        ));
        coordinator.register(failing).await;

        for _ in 0..3 {
            coordinator.search("demo", 1, 20, &SearchFilters::default()).await;
        }
        let health = coordinator.source_health_snapshot().await;
        assert!(health.get("Flaky").is_some_and(|h| h.circuit_open));

        let outcome = coordinator.search("demo", 1, 20, &SearchFilters::default()).await;
        assert!(outcome.source_warnings.get("Flaky").is_some_and(|w| w.contains("Circuit open")));
    }

    #[tokio::test]
    async fn cache_short_circuits_identical_repeat_queries() {
        let coordinator = Coordinator::new(EventBus::new(), CoordinatorConfig::default());
        let provider = Arc::new(ScriptedProvider::new(
            "P1",
            vec![ScriptedOutcome::Ok(vec![sample_result("demo", 1)])],
        ));
        let provider_clone = Arc::clone(&provider);
        coordinator.register(provider).await;

        coordinator.search("demo", 1, 20, &SearchFilters::default()).await;
        coordinator.search("demo", 1, 20, &SearchFilters::default()).await;
        assert_eq!(provider_clone.call_count(), 1);
    }

    #[tokio::test]
    async fn min_seeds_filter_drops_low_seed_results() {
        let coordinator = Coordinator::new(EventBus::new(), CoordinatorConfig::default());
        coordinator
            .register(Arc::new(ScriptedProvider::new(
                "P1",
                vec![ScriptedOutcome::Ok(vec![sample_result("demo", 2)])],
            )))
            .await;

        let filters = SearchFilters {
            min_seeds: Some(5),
            ..SearchFilters::default()
        };
        let outcome = coordinator.search("demo", 1, 20, &filters).await;
        assert!(outcome.results.is_empty());
    }
}
