//! Provider contract (§4.4): the capability surface every search source
//! implements, plus the outcome envelope the coordinator collects from each
//! provider call.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::model::SearchResult;

/// Health payload returned by a provider's optional `healthcheck`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProviderHealth {
    /// Provider name.
    pub name: String,
    /// Whether the provider is currently considered healthy.
    pub ok: bool,
    /// Most recent error/warning, empty on success.
    pub last_error: String,
    /// Provider SDK version, for compatibility checks.
    pub api_version: u32,
}

/// A single provider's contribution to one coordinator batch.
#[derive(Debug, Clone)]
pub struct ProviderOutcome {
    /// Results returned by this attempt.
    pub results: Vec<SearchResult>,
    /// Warning message, empty on a clean success.
    pub warning: String,
    /// Number of attempts made (including retries).
    pub attempts: u32,
    /// Wall-clock latency of the (last) attempt, in milliseconds.
    pub latency_ms: u64,
    /// Whether the attempt is considered successful for circuit-breaker
    /// purposes (an empty-but-exempted result still counts as `ok`).
    pub ok: bool,
}

/// Named search source. Implementations must not panic or propagate errors
/// for transient/empty conditions: a warning plus an empty result list is
/// always preferred to a hard failure, so that one provider's trouble never
/// aborts the fan-out batch (see §7's propagation policy).
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name used as the routing/health/cache key.
    fn name(&self) -> &str;

    /// Run a search against this provider for `query`, page `page`
    /// (1-based). Must return `Ok([])` rather than an error for empty or
    /// gated results; set `last_error` accordingly via the outcome's
    /// `warning` field at the call site.
    async fn search(&self, query: &str, page: u32) -> CoreResult<Vec<SearchResult>>;

    /// Optional hook invoked when provider-relevant settings are reloaded.
    /// Implementations must be idempotent. Default: no-op.
    async fn reload_from_settings(&self) -> CoreResult<()> {
        Ok(())
    }

    /// Optional lightweight health payload for dashboards. Default: bails,
    /// signalling "not supported" rather than a fabricated healthy status.
    async fn healthcheck(&self) -> CoreResult<ProviderHealth> {
        Err(CoreError::Unsupported {
            operation: "healthcheck",
        })
    }

    /// Optional free-form runtime status map (e.g. headless-browser
    /// availability). Default: bails.
    async fn runtime_status(&self) -> CoreResult<Value> {
        Err(CoreError::Unsupported {
            operation: "runtime_status",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider;

    #[async_trait]
    impl Provider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(&self, _query: &str, _page: u32) -> CoreResult<Vec<SearchResult>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn optional_methods_default_to_unsupported() {
        let provider = StubProvider;
        assert!(provider.reload_from_settings().await.is_ok());
        let health_err = provider.healthcheck().await.unwrap_err();
        assert!(matches!(health_err, CoreError::Unsupported { operation } if operation == "healthcheck"));
        let status_err = provider.runtime_status().await.unwrap_err();
        assert!(matches!(status_err, CoreError::Unsupported { operation } if operation == "runtime_status"));
    }
}
