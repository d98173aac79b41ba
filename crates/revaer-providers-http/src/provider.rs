//! [`HttpScrapeProvider`]: the generic HTTP-scraping provider searching a
//! set of user-configured URL templates, with an optional search-engine
//! "primary discovery" pass ahead of them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use revaer_core::{CoreResult, Provider, SearchResult};
use scraper::{Html, Selector};
use tracing::warn;
use url::Url;

use crate::adapter::{CrawlContext, DomainAdapter, GenericAdapter, NmacStyleAdapter, ParseLimits};
use crate::cache::{CacheLookup, ResultCache};
use crate::classifier::is_download_like;
use crate::headless::{HeadlessFallback, HeadlessFetchOptions, UnavailableFallback};
use crate::health::HealthRegistry;
use crate::redirect;
use crate::retry::get_with_retry;

static DISCOVERY_RESULT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a[href], h2 a[href], a[href]").expect("valid static selector"));
static RAW_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid static regex"));

const NOISE_HOST_SUBSTRINGS: &[&str] = &["duckduckgo.com", "google.", "bing.com", "searx.", "startpage.com"];
const NOISE_PATH_SUBSTRINGS: &[&str] = &["/blog", "/press", "/help", "/privacy", "/terms", "/about"];

fn is_noise_discovery_link(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return true;
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if NOISE_HOST_SUBSTRINGS.iter().any(|h| host.contains(h)) {
        return true;
    }
    let lower = url.to_lowercase();
    NOISE_PATH_SUBSTRINGS.iter().any(|p| lower.contains(p))
}

fn build_dork_query(query: &str) -> String {
    format!(
        "\"{query}\" intitle:\"index of\" (windows|macos|vst|plugin|installer|portable) \
         (zip|rar|7z|dmg|pkg|exe|msi|iso|vst|vst3|dll|torrent) \
         -inurl:(jsp|pl|php|html|aspx|htm)"
    )
}

/// Per-host override applied on top of the provider's default [`ParseLimits`].
#[derive(Debug, Clone, Default)]
pub struct SourceOverride {
    /// Host substring this override applies to.
    pub host_substring: String,
    /// Overridden maximum detail pages, if set.
    pub max_detail_pages: Option<usize>,
    /// Overridden links-per-detail, if set.
    pub max_links_per_detail: Option<usize>,
    /// Overridden request timeout, in seconds, if set.
    pub request_timeout_seconds: Option<f64>,
    /// Overridden time budget, in seconds, if set.
    pub time_budget_seconds: Option<f64>,
    /// Overridden detail concurrency, if set.
    pub detail_concurrency: Option<usize>,
}

/// Construction parameters for [`HttpScrapeProvider`].
#[derive(Debug, Clone)]
pub struct HttpScrapeConfig {
    /// Stable provider name.
    pub name: String,
    /// User-configured `{query}` URL templates.
    pub source_urls: Vec<String>,
    /// Search-engine templates used for the primary discovery pass.
    pub discovery_engine_templates: Vec<String>,
    /// Whether to run the primary discovery pass before template queries.
    pub primary_discovery_enabled: bool,
    /// Default crawl limits applied absent a per-host override.
    pub default_limits: ParseLimits,
    /// Per-host limit overrides.
    pub overrides: Vec<SourceOverride>,
    /// How long a cached result set stays fresh.
    pub cache_ttl: Duration,
    /// Whether a stale cache entry is still served while a refresh runs.
    pub allow_stale_cache: bool,
    /// Whether a stale hit schedules a background refresh task.
    pub background_refresh: bool,
}

/// Generic HTTP-scraping provider: per-template adapter dispatch, bounded
/// two-level crawling, and an optional search-engine discovery pass.
pub struct HttpScrapeProvider {
    config: HttpScrapeConfig,
    client: Client,
    cache: ResultCache,
    health: HealthRegistry,
    adapters: Vec<Box<dyn DomainAdapter>>,
    headless: Box<dyn HeadlessFallback>,
}

impl HttpScrapeProvider {
    /// Construct a provider with the default adapter roster and no headless
    /// fallback available.
    #[must_use]
    pub fn new(config: HttpScrapeConfig) -> Self {
        Self::with_adapters_and_fallback(
            config,
            vec![Box::new(NmacStyleAdapter::new()), Box::new(GenericAdapter)],
            Box::new(UnavailableFallback),
        )
    }

    /// Construct a provider with a custom adapter roster and headless
    /// fallback, for tests or alternate deployments.
    #[must_use]
    pub fn with_adapters_and_fallback(
        config: HttpScrapeConfig,
        adapters: Vec<Box<dyn DomainAdapter>>,
        headless: Box<dyn HeadlessFallback>,
    ) -> Self {
        Self {
            config,
            client: Client::new(),
            cache: ResultCache::new(),
            health: HealthRegistry::new(),
            adapters,
            headless,
        }
    }

    fn limits_for(&self, template: &str) -> ParseLimits {
        let mut limits = self.config.default_limits.clone();
        if let Some(over) = self
            .config
            .overrides
            .iter()
            .find(|o| template.contains(o.host_substring.as_str()))
        {
            if let Some(v) = over.max_detail_pages {
                limits.max_detail_pages = v;
            }
            if let Some(v) = over.max_links_per_detail {
                limits.max_links_per_detail = v;
            }
            if let Some(v) = over.request_timeout_seconds {
                limits.request_timeout = Duration::from_secs_f64(v);
            }
            if let Some(v) = over.time_budget_seconds {
                limits.time_budget = Duration::from_secs_f64(v);
            }
            if let Some(v) = over.detail_concurrency {
                limits.detail_concurrency = v;
            }
        }
        limits
    }

    async fn query_template(&self, template: &str, query: &str) -> Vec<SearchResult> {
        let Some(search_url) = substitute_query(template, query) else {
            return Vec::new();
        };
        let limits = self.limits_for(template);
        let started = Instant::now();

        let fetched = get_with_retry(
            &self.client,
            &search_url,
            limits.request_timeout,
            limits.request_retries,
            limits.retry_backoff,
        )
        .await;

        let body = match fetched {
            Ok(response) => match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    self.health.record(template, false, 0.0, &err.to_string());
                    return Vec::new();
                }
            },
            Err(err) => {
                self.health.record(template, false, 0.0, &err);
                return Vec::new();
            }
        };

        let host = Url::parse(&search_url)
            .ok()
            .and_then(|u| u.host_str().map(ToString::to_string))
            .unwrap_or_default();
        let adapter = crate::adapter::select_adapter(&self.adapters, &host);
        let ctx = CrawlContext::new(&self.client, &limits, &self.config.name);
        let mut results = adapter.parse(&body, &search_url, query, &ctx).await;

        if results.is_empty() && self.headless.is_ready() {
            let options = HeadlessFetchOptions {
                timeout_ms: limits.request_timeout.as_millis() as u64,
                expand_dynamic: true,
                max_expand_cycles: 4,
            };
            if let Ok((html, final_url)) = self.headless.fetch_html(&search_url, options).await {
                results = adapter.parse(&html, &final_url, query, &ctx).await;
            }
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.health.record(template, !results.is_empty(), latency_ms, "");
        results
    }

    async fn primary_discovery(&self, query: &str) -> Vec<SearchResult> {
        let templates = if self.config.discovery_engine_templates.is_empty() {
            default_discovery_templates()
        } else {
            self.config.discovery_engine_templates.clone()
        };
        let dork = build_dork_query(query);
        let limits = self.config.default_limits.clone();
        let mut discovered = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for template in &templates {
            let Some(url) = substitute_query(template, &dork) else {
                continue;
            };
            let Ok(response) =
                get_with_retry(&self.client, &url, limits.request_timeout, limits.request_retries, limits.retry_backoff)
                    .await
            else {
                continue;
            };
            let Ok(body) = response.text().await else {
                continue;
            };
            let document = Html::parse_document(&body);
            let mut candidates: Vec<String> = document
                .select(&DISCOVERY_RESULT_SELECTOR)
                .filter_map(|el| el.value().attr("href"))
                .filter_map(|href| redirect::decode(href, &url))
                .collect();
            for raw in RAW_URL_PATTERN.find_iter(&body) {
                candidates.push(raw.as_str().trim_end_matches([')', '.', ',', ';', '!', '?']).to_string());
            }
            for candidate in candidates {
                if is_noise_discovery_link(&candidate) || seen.contains(&candidate) {
                    continue;
                }
                seen.insert(candidate.clone());
                discovered.push(candidate);
                if discovered.len() >= limits.max_detail_pages.max(4) {
                    break;
                }
            }
            if discovered.len() >= limits.max_detail_pages.max(4) {
                break;
            }
        }

        if discovered.is_empty() {
            return Vec::new();
        }
        let ctx = CrawlContext::new(&self.client, &limits, &self.config.name);
        ctx.crawl_detail_links(discovered).await
    }
}

fn default_discovery_templates() -> Vec<String> {
    vec![
        "https://duckduckgo.com/html/?q={query}".to_string(),
        "https://html.duckduckgo.com/html/?q={query}".to_string(),
    ]
}

fn substitute_query(template: &str, query: &str) -> Option<String> {
    if !template.contains("{query}") {
        return None;
    }
    Some(template.replace("{query}", &urlencoding::encode(query)))
}

#[async_trait]
impl Provider for HttpScrapeProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(&self, query: &str, page: u32) -> CoreResult<Vec<SearchResult>> {
        let mut results = Vec::new();

        if self.config.primary_discovery_enabled {
            results.extend(self.primary_discovery(query).await);
        }

        for template in &self.config.source_urls {
            match self.cache.get(template, query, page, self.config.cache_ttl, self.config.allow_stale_cache) {
                CacheLookup::Fresh(cached) => {
                    results.extend(cached);
                    continue;
                }
                CacheLookup::Stale(cached) => {
                    results.extend(cached);
                    if self.config.background_refresh {
                        warn!(template = %template, "serving stale HTTP source cache, refresh not scheduled in-process");
                    }
                    continue;
                }
                CacheLookup::Miss => {}
            }

            let fetched = self.query_template(template, query).await;
            self.cache.set(template, query, page, fetched.clone());
            results.extend(fetched);
        }

        results.retain(|r| is_download_like(&r.link));
        Ok(results)
    }

    async fn healthcheck(&self) -> CoreResult<revaer_core::ProviderHealth> {
        let snapshots: Vec<_> = self
            .config
            .source_urls
            .iter()
            .filter_map(|t| self.health.snapshot(t).map(|h| (t.clone(), h)))
            .collect();
        let ok = snapshots.is_empty() || snapshots.iter().any(|(_, h)| h.successes > 0);
        let last_error = if ok {
            String::new()
        } else {
            snapshots
                .iter()
                .find(|(_, h)| !h.last_error.is_empty())
                .map(|(_, h)| h.last_error.clone())
                .unwrap_or_default()
        };
        Ok(revaer_core::ProviderHealth {
            name: self.config.name.clone(),
            ok,
            last_error,
            api_version: 1,
        })
    }
}

/// Build the default set of per-host overrides from a raw settings map,
/// used by the application's settings-to-provider binding.
#[must_use]
pub fn overrides_from_map(raw: &HashMap<String, SourceOverride>) -> Vec<SourceOverride> {
    raw.values().cloned().collect()
}

/// Shared, clonable handle suitable for registering with the coordinator.
pub type SharedHttpScrapeProvider = Arc<HttpScrapeProvider>;

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ParseLimits {
        ParseLimits {
            max_detail_pages: 4,
            max_links_per_detail: 4,
            time_budget: Duration::from_secs(5),
            request_timeout: Duration::from_secs(5),
            redirect_timeout: Duration::from_secs(2),
            request_retries: 0,
            retry_backoff: Duration::from_millis(10),
            detail_concurrency: 2,
        }
    }

    #[test]
    fn substitutes_query_placeholder() {
        let url = substitute_query("https://site.example/?q={query}", "hello world").unwrap();
        assert_eq!(url, "https://site.example/?q=hello%20world");
    }

    #[test]
    fn rejects_templates_without_placeholder() {
        assert!(substitute_query("https://site.example/", "hello").is_none());
    }

    #[test]
    fn flags_noise_discovery_hosts() {
        assert!(is_noise_discovery_link("https://duckduckgo.com/html/?q=x"));
        assert!(!is_noise_discovery_link("https://files.example/demo"));
    }

    #[tokio::test]
    async fn healthcheck_is_ok_with_no_recorded_attempts() {
        let provider = HttpScrapeProvider::new(HttpScrapeConfig {
            name: "HTTP".to_string(),
            source_urls: vec!["https://site.example/?q={query}".to_string()],
            discovery_engine_templates: vec![],
            primary_discovery_enabled: false,
            default_limits: limits(),
            overrides: vec![],
            cache_ttl: Duration::from_secs(300),
            allow_stale_cache: true,
            background_refresh: true,
        });
        let health = provider.healthcheck().await.unwrap();
        assert!(health.ok);
    }
}
