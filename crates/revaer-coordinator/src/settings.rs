//! Bridges `revaer-config`'s tiered settings document into coordinator
//! configuration (§4.3's `source_*`/`enabled_sources` keys).
//!
//! Grounded on `revaer_config::model::default_document`, which seeds every
//! `source_*` key this module reads; any key that is missing or the wrong
//! JSON type falls back to this crate's own `CoordinatorConfig::default()`.

use std::collections::HashMap;

use revaer_config::SettingsService;
use revaer_core::SessionContext;
use serde_json::Value;

use crate::coordinator::CoordinatorConfig;
use crate::health::ReliabilityConfig;

/// Build a [`CoordinatorConfig`] from the settings document active for
/// `ctx`. A settings read failure (e.g. an unreadable tier file) falls back
/// to the crate's built-in defaults rather than failing the caller.
#[must_use]
pub fn coordinator_config(settings: &SettingsService, ctx: &SessionContext) -> CoordinatorConfig {
    let defaults = CoordinatorConfig::default();
    let doc = settings.get_all(ctx).unwrap_or(Value::Null);

    let reliability = ReliabilityConfig {
        max_retries: doc
            .get("source_max_retries")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.reliability.max_retries),
        retry_backoff_seconds: doc
            .get("source_retry_backoff_seconds")
            .and_then(Value::as_f64)
            .unwrap_or(defaults.reliability.retry_backoff_seconds),
        circuit_failure_threshold: doc
            .get("source_circuit_failure_threshold")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.reliability.circuit_failure_threshold),
        circuit_cooldown_seconds: doc
            .get("source_circuit_cooldown_seconds")
            .map_or(defaults.reliability.circuit_cooldown_seconds, |v| {
                as_i64_from_f64(v, defaults.reliability.circuit_cooldown_seconds)
            }),
    };

    let prefer_completion_sources = doc
        .get("source_prefer_completion")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or(defaults.prefer_completion_sources);

    CoordinatorConfig {
        reliability,
        default_source_timeout_seconds: doc
            .get("source_search_timeout_seconds")
            .map_or(defaults.default_source_timeout_seconds, |v| {
                as_u64_from_f64(v, defaults.default_source_timeout_seconds)
            }),
        early_return_min_results: doc
            .get("source_early_return_min_results")
            .and_then(Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(defaults.early_return_min_results),
        early_return_seconds: doc
            .get("source_early_return_seconds")
            .and_then(Value::as_f64)
            .unwrap_or(defaults.early_return_seconds),
        prefer_completion_sources,
        ..defaults
    }
}

/// The `enabled_sources` map (provider name → enabled), used to seed a
/// freshly-constructed coordinator's registry state or to feed
/// [`crate::Coordinator::reload`].
#[must_use]
pub fn enabled_sources(settings: &SettingsService, ctx: &SessionContext) -> HashMap<String, bool> {
    let doc = settings.get_all(ctx).unwrap_or(Value::Null);
    doc.get("enabled_sources")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(name, value)| value.as_bool().map(|enabled| (name.clone(), enabled)))
                .collect()
        })
        .unwrap_or_default()
}

fn as_u64_from_f64(value: &Value, fallback: u64) -> u64 {
    let Some(raw) = value.as_f64() else { return fallback };
    #[expect(
        clippy::cast_sign_loss,
        clippy::cast_possible_truncation,
        reason = "settings durations are small non-negative numbers"
    )]
    let rounded = raw.max(0.0) as u64;
    rounded
}

fn as_i64_from_f64(value: &Value, fallback: i64) -> i64 {
    let Some(raw) = value.as_f64() else { return fallback };
    #[expect(clippy::cast_possible_truncation, reason = "settings durations are small numbers")]
    let truncated = raw as i64;
    truncated
}

#[cfg(test)]
mod tests {
    use revaer_core::SessionContext;
    use revaer_events::EventBus;
    use revaer_test_support::temp_root;

    use super::*;

    #[test]
    fn falls_back_to_defaults_when_settings_are_process_baseline() {
        let root = temp_root();
        let settings = SettingsService::new(root.path(), EventBus::new()).unwrap();
        let ctx = SessionContext::default();

        let config = coordinator_config(&settings, &ctx);
        assert_eq!(config.reliability.circuit_failure_threshold, 4);
        assert!((config.reliability.retry_backoff_seconds - 0.6).abs() < 1e-9);

        let sources = enabled_sources(&settings, &ctx);
        assert_eq!(sources.get("http-scrape"), Some(&true));
        assert_eq!(sources.get("torrent-index-a"), Some(&false));
    }
}
