//! Per-template health tracking with an exponential moving average latency.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

const EMA_ALPHA: f64 = 0.2;

/// Health counters for a single URL template.
#[derive(Debug, Clone, Default)]
pub struct TemplateHealth {
    /// Total search attempts made through this template.
    pub attempts: u64,
    /// Attempts that returned at least one result.
    pub successes: u64,
    /// Attempts that errored or returned nothing.
    pub failures: u64,
    /// Exponential moving average of observed latency, in milliseconds.
    pub ema_latency_ms: f64,
    /// The most recent failure message, if any.
    pub last_error: String,
    /// Unix timestamp (seconds) of the last successful attempt.
    pub last_success_unix: Option<u64>,
}

/// Thread-safe registry of [`TemplateHealth`] keyed by template string.
#[derive(Debug, Default)]
pub struct HealthRegistry {
    table: RwLock<HashMap<String, TemplateHealth>>,
}

impl HealthRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one attempt's outcome for `template`.
    pub fn record(&self, template: &str, ok: bool, latency_ms: f64, error: &str) {
        let Ok(mut table) = self.table.write() else {
            return;
        };
        let entry = table.entry(template.to_string()).or_default();
        entry.attempts += 1;
        if ok {
            entry.successes += 1;
            entry.last_success_unix = Some(
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default(),
            );
        } else {
            entry.failures += 1;
            entry.last_error = error.to_string();
        }
        entry.ema_latency_ms = if entry.attempts == 1 {
            latency_ms
        } else {
            EMA_ALPHA.mul_add(latency_ms, (1.0 - EMA_ALPHA) * entry.ema_latency_ms)
        };
    }

    /// Snapshot the current health of `template`, if any attempts were recorded.
    #[must_use]
    pub fn snapshot(&self, template: &str) -> Option<TemplateHealth> {
        self.table.read().ok()?.get(template).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_attempts_and_ema_latency() {
        let registry = HealthRegistry::new();
        registry.record("tpl", true, 100.0, "");
        registry.record("tpl", false, 200.0, "boom");
        let health = registry.snapshot("tpl").unwrap();
        assert_eq!(health.attempts, 2);
        assert_eq!(health.successes, 1);
        assert_eq!(health.failures, 1);
        assert_eq!(health.last_error, "boom");
        assert!((health.ema_latency_ms - 120.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_template_has_no_snapshot() {
        let registry = HealthRegistry::new();
        assert!(registry.snapshot("missing").is_none());
    }
}
