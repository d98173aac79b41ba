//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Tracks provider dispatch outcomes, circuit-breaker state, and download
//!   throughput: the counters the fan-out coordinator and download manager
//!   actually produce, rather than a generic HTTP-service metric set.

use std::convert::TryFrom;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across the engine.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    events_emitted_total: IntCounterVec,
    provider_attempts_total: IntCounterVec,
    provider_circuit_open: IntGaugeVec,
    active_search_jobs: IntGauge,
    active_downloads: IntGauge,
    downloaded_bytes_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Number of search jobs not yet in a terminal status.
    pub active_search_jobs: i64,
    /// Number of download jobs not yet in a terminal status.
    pub active_downloads: i64,
    /// Cumulative bytes written to disk across every download job.
    pub downloaded_bytes_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Domain events emitted by type"),
            &["type"],
        )?;
        let provider_attempts_total = IntCounterVec::new(
            Opts::new(
                "provider_attempts_total",
                "Provider search attempts by outcome",
            ),
            &["provider", "outcome"],
        )?;
        let provider_circuit_open = IntGaugeVec::new(
            Opts::new(
                "provider_circuit_open",
                "Whether a provider's circuit breaker is currently open (1) or closed (0)",
            ),
            &["provider"],
        )?;
        let active_search_jobs = IntGauge::with_opts(Opts::new(
            "active_search_jobs",
            "Search jobs not yet in a terminal status",
        ))?;
        let active_downloads = IntGauge::with_opts(Opts::new(
            "active_downloads",
            "Download jobs not yet in a terminal status",
        ))?;
        let downloaded_bytes_total = IntCounter::with_opts(Opts::new(
            "downloaded_bytes_total",
            "Cumulative bytes written to disk across every download job",
        ))?;

        registry.register(Box::new(events_emitted_total.clone()))?;
        registry.register(Box::new(provider_attempts_total.clone()))?;
        registry.register(Box::new(provider_circuit_open.clone()))?;
        registry.register(Box::new(active_search_jobs.clone()))?;
        registry.register(Box::new(active_downloads.clone()))?;
        registry.register(Box::new(downloaded_bytes_total.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                events_emitted_total,
                provider_attempts_total,
                provider_circuit_open,
                active_search_jobs,
                active_downloads,
                downloaded_bytes_total,
            }),
        })
    }

    /// Increment the emitted event counter for the specific event type.
    pub fn inc_event(&self, event_type: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[event_type])
            .inc();
    }

    /// Record one provider dispatch attempt and its outcome (`ok`, `error`,
    /// or `skipped`, matching the coordinator's own candidate-dispatch
    /// bookkeeping).
    pub fn inc_provider_attempt(&self, provider: &str, outcome: &str) {
        self.inner
            .provider_attempts_total
            .with_label_values(&[provider, outcome])
            .inc();
    }

    /// Set a provider's circuit-breaker state gauge.
    pub fn set_provider_circuit(&self, provider: &str, open: bool) {
        self.inner
            .provider_circuit_open
            .with_label_values(&[provider])
            .set(i64::from(open));
    }

    /// Set the active search job gauge.
    pub fn set_active_search_jobs(&self, count: i64) {
        self.inner.active_search_jobs.set(count);
    }

    /// Set the active download job gauge.
    pub fn set_active_downloads(&self, count: i64) {
        self.inner.active_downloads.set(count);
    }

    /// Add newly-downloaded bytes to the cumulative throughput counter.
    pub fn inc_downloaded_bytes(&self, bytes: u64) {
        self.inner.downloaded_bytes_total.inc_by(bytes);
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_search_jobs: self.inner.active_search_jobs.get(),
            active_downloads: self.inner.active_downloads.get(),
            downloaded_bytes_total: u64::try_from(self.inner.downloaded_bytes_total.get()).unwrap_or(u64::MAX),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn duration_to_ms_saturates_on_large_values() {
        let duration = Duration::from_secs(u64::MAX / 2);
        assert_eq!(Metrics::duration_to_ms(duration), i64::MAX);
    }

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_event("search_started");
        metrics.inc_provider_attempt("open-directory", "ok");
        metrics.set_provider_circuit("open-directory", false);
        metrics.set_active_search_jobs(2);
        metrics.set_active_downloads(1);
        metrics.inc_downloaded_bytes(1_024);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_search_jobs, 2);
        assert_eq!(snapshot.active_downloads, 1);
        assert_eq!(snapshot.downloaded_bytes_total, 1_024);

        let rendered = metrics.render()?;
        assert!(rendered.contains("events_emitted_total"));
        assert!(rendered.contains("provider_attempts_total"));
        assert!(rendered.contains("provider_circuit_open"));
        assert!(rendered.contains("downloaded_bytes_total"));
        Ok(())
    }
}
