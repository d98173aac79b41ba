//! Per-provider reliability tracking: the routing score that orders
//! candidate providers and the circuit-breaker state machine that skips
//! chronically failing ones (§4.5.3, §4.5.4).
//!
//! Grounded on `source_manager.py`'s `_source_routing_score`,
//! `_source_block_reason`, and `_record_source_outcome`; constants below
//! reproduce its `reliability` defaults.

use chrono::{DateTime, Duration, Utc};
use revaer_core::model::SourceHealth;

/// Default reliability tuning, mirroring `source_manager.py`'s `reliability`
/// settings block.
#[derive(Debug, Clone, Copy)]
pub struct ReliabilityConfig {
    /// Extra attempts beyond the first before giving up on a provider call.
    pub max_retries: u32,
    /// Base backoff, doubled on each subsequent retry.
    pub retry_backoff_seconds: f64,
    /// Consecutive failures that trip the circuit open.
    pub circuit_failure_threshold: u32,
    /// How long the circuit stays open before a half-open probe is allowed.
    pub circuit_cooldown_seconds: i64,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff_seconds: 0.5,
            circuit_failure_threshold: 3,
            circuit_cooldown_seconds: 120,
        }
    }
}

/// What the circuit breaker says about dispatching the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitDecision {
    /// No circuit concerns; dispatch normally.
    Proceed,
    /// The cooldown has elapsed; this call is a half-open probe. Dispatch,
    /// but closely observe its outcome.
    Probe,
    /// Still cooling down; skip with the given remaining seconds.
    Skip {
        /// Seconds remaining until a probe is allowed, at least 1.
        retry_in_seconds: i64,
    },
}

/// Routing score used to order candidate providers before fan-out (§4.5.3).
/// Providers never attempted sort first; afterwards the score rewards a high
/// success rate and punishes latency, consecutive failures, and an open
/// circuit.
#[must_use]
pub fn routing_score(health: &SourceHealth) -> f64 {
    if health.attempts == 0 {
        return 100.0;
    }
    #[expect(clippy::cast_precision_loss, reason = "latency_ms values stay small")]
    let latency_penalty = (health.last_latency_ms as f64 / 150.0).min(25.0);
    #[expect(clippy::cast_precision_loss, reason = "failure counts stay small")]
    let failure_penalty = health.consecutive_failures as f64 * 8.0;
    let circuit_penalty = if health.circuit_open { 40.0 } else { 0.0 };
    (40.0 + health.success_rate() * 60.0) - latency_penalty - failure_penalty - circuit_penalty
}

/// Decide whether to dispatch, probe, or skip a provider given its current
/// health and the current time (§4.5.4).
#[must_use]
pub fn circuit_decision(health: &SourceHealth, now: DateTime<Utc>) -> CircuitDecision {
    if !health.circuit_open {
        return CircuitDecision::Proceed;
    }
    match health.cooldown_until {
        Some(until) if now < until => CircuitDecision::Skip {
            retry_in_seconds: (until - now).num_seconds().max(1),
        },
        _ => CircuitDecision::Probe,
    }
}

/// Record a successful (or exempted-empty) attempt: clears the breaker and
/// resets the consecutive-failure counter unconditionally.
pub fn record_success(health: &mut SourceHealth, latency_ms: u64, now: DateTime<Utc>) {
    health.attempts += 1;
    health.successes += 1;
    health.consecutive_failures = 0;
    health.circuit_open = false;
    health.cooldown_until = None;
    health.last_error.clear();
    health.last_latency_ms = latency_ms;
    health.last_attempt_at = Some(now);
    health.last_success_at = Some(now);
}

/// Record a failed attempt, opening the circuit once `consecutive_failures`
/// reaches `config.circuit_failure_threshold`.
pub fn record_failure(
    health: &mut SourceHealth,
    latency_ms: u64,
    error: String,
    now: DateTime<Utc>,
    config: &ReliabilityConfig,
) {
    health.attempts += 1;
    health.failures += 1;
    health.consecutive_failures += 1;
    health.last_error = error;
    health.last_latency_ms = latency_ms;
    health.last_attempt_at = Some(now);
    if health.consecutive_failures >= config.circuit_failure_threshold {
        health.circuit_open = true;
        health.cooldown_until = Some(now + Duration::seconds(config.circuit_cooldown_seconds));
    }
}

/// Record that a provider call was skipped because its circuit is open.
pub fn record_skip(health: &mut SourceHealth) {
    health.skip_count += 1;
}

/// Backoff delay before attempt `attempt_index + 1` (0-based): exponential
/// from `retry_backoff_seconds`.
#[must_use]
pub fn retry_backoff(config: &ReliabilityConfig, attempt_index: u32) -> std::time::Duration {
    let seconds = config.retry_backoff_seconds * 2f64.powi(i32::try_from(attempt_index).unwrap_or(i32::MAX));
    std::time::Duration::from_secs_f64(seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_attempted_scores_maximum() {
        let health = SourceHealth::default();
        assert!((routing_score(&health) - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn open_circuit_blocks_until_cooldown_elapses() {
        let now = Utc::now();
        let mut health = SourceHealth::default();
        let config = ReliabilityConfig::default();
        for _ in 0..config.circuit_failure_threshold {
            record_failure(&mut health, 10, "boom".into(), now, &config);
        }
        assert!(health.circuit_open);
        assert_eq!(circuit_decision(&health, now), CircuitDecision::Skip { retry_in_seconds: 120 });
        let later = now + Duration::seconds(121);
        assert_eq!(circuit_decision(&health, later), CircuitDecision::Probe);
    }

    #[test]
    fn success_clears_breaker_state() {
        let now = Utc::now();
        let mut health = SourceHealth::default();
        let config = ReliabilityConfig::default();
        record_failure(&mut health, 10, "boom".into(), now, &config);
        record_failure(&mut health, 10, "boom".into(), now, &config);
        record_failure(&mut health, 10, "boom".into(), now, &config);
        assert!(health.circuit_open);
        record_success(&mut health, 5, now);
        assert!(!health.circuit_open);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[test]
    fn retry_backoff_doubles_per_attempt() {
        let config = ReliabilityConfig::default();
        assert!((retry_backoff(&config, 0).as_secs_f64() - 0.5).abs() < 1e-9);
        assert!((retry_backoff(&config, 1).as_secs_f64() - 1.0).abs() < 1e-9);
        assert!((retry_backoff(&config, 2).as_secs_f64() - 2.0).abs() < 1e-9);
    }
}
