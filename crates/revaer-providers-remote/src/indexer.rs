//! Indexer-aggregator provider: a JSON client against a locally hosted
//! indexer-manager service (one base URL, one API key, one `/search`
//! endpoint fronting many upstream indexers).
//!
//! Grounded on `ProwlarrSource` in
//! `original_source/pluggy/sources/prowlarr.py`.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use revaer_core::{magnet, CoreResult, Provider, SearchResult};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// Configuration for one [`IndexerAggregatorProvider`] instance.
#[derive(Debug, Clone)]
pub struct IndexerAggregatorConfig {
    /// Base URL of the indexer-manager service (no trailing slash).
    pub base_url: String,
    /// API key; if empty and `auto_fetch_key` is set, the provider tries the
    /// service's unauthenticated discovery endpoint once.
    pub api_key: String,
    /// Whether to attempt the `/initialize.json`-style auto-discovery.
    pub auto_fetch_key: bool,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Results requested per page.
    pub limit: u32,
    /// Restrict the search to these indexer ids, if non-empty.
    pub indexer_ids: Vec<u64>,
    /// Restrict the search to these category ids, if non-empty.
    pub category_ids: Vec<u64>,
}

#[derive(Debug, Deserialize)]
struct IndexerRow {
    #[serde(default)]
    title: String,
    #[serde(default, rename = "releaseTitle")]
    release_title: String,
    #[serde(default, rename = "magnetUrl")]
    magnet_url: String,
    #[serde(default)]
    guid: String,
    #[serde(default, rename = "downloadUrl")]
    download_url: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    seeders: u64,
    #[serde(default)]
    leechers: u64,
    #[serde(default)]
    indexer: String,
    #[serde(default, rename = "indexerName")]
    indexer_name: String,
    #[serde(default, rename = "categoryDesc")]
    category_desc: Option<String>,
    #[serde(default)]
    category: Option<Value>,
}

fn map_row(row: IndexerRow) -> Option<SearchResult> {
    let title = if row.title.trim().is_empty() {
        row.release_title.trim().to_string()
    } else {
        row.title.trim().to_string()
    };
    if title.is_empty() {
        return None;
    }
    let primary = [&row.magnet_url, &row.guid, &row.download_url]
        .into_iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())?
        .to_string();

    let mut candidates = Vec::new();
    for candidate in [&row.magnet_url, &row.guid, &row.download_url] {
        let candidate = candidate.trim();
        if !candidate.is_empty() && !candidates.contains(&candidate.to_string()) {
            candidates.push(candidate.to_string());
        }
    }

    let indexer = if row.indexer.trim().is_empty() {
        row.indexer_name.trim().to_string()
    } else {
        row.indexer.trim().to_string()
    };
    let aggregated_sources = if indexer.is_empty() { vec![] } else { vec![indexer] };

    let infohash = if primary.to_lowercase().starts_with("magnet:") {
        magnet::extract_infohash(&primary)
    } else {
        String::new()
    };

    let category = row
        .category_desc
        .or_else(|| row.category.as_ref().map(ToString::to_string));

    Some(SearchResult {
        title,
        link: primary,
        size: row.size,
        seeds: row.seeders,
        leeches: row.leechers,
        source: "Indexer".to_string(),
        infohash,
        category,
        upload_date: None,
        link_candidates: candidates,
        aggregated_sources,
        link_quality: 0.0,
    })
}

/// Indexer-aggregator provider.
pub struct IndexerAggregatorProvider {
    config: IndexerAggregatorConfig,
    client: Client,
    resolved_api_key: RwLock<String>,
}

impl IndexerAggregatorProvider {
    /// Construct a provider from `config`.
    #[must_use]
    pub fn new(config: IndexerAggregatorConfig) -> Self {
        let resolved = config.api_key.clone();
        Self {
            config,
            client: Client::new(),
            resolved_api_key: RwLock::new(resolved),
        }
    }

    async fn api_key(&self) -> String {
        if let Ok(key) = self.resolved_api_key.read() {
            if !key.is_empty() {
                return key.clone();
            }
        }
        if !self.config.auto_fetch_key {
            return String::new();
        }
        let url = format!("{}/initialize.json", self.config.base_url);
        let Ok(response) = self.client.get(&url).timeout(self.config.request_timeout).send().await else {
            return String::new();
        };
        let Ok(payload) = response.json::<Value>().await else {
            return String::new();
        };
        let key = payload
            .get("apiKey")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !key.is_empty() {
            if let Ok(mut guard) = self.resolved_api_key.write() {
                *guard = key.clone();
            }
        }
        key
    }
}

#[async_trait]
impl Provider for IndexerAggregatorProvider {
    fn name(&self) -> &str {
        "Indexer"
    }

    async fn search(&self, query: &str, page: u32) -> CoreResult<Vec<SearchResult>> {
        if query.trim().is_empty() || self.config.base_url.is_empty() {
            return Ok(vec![]);
        }
        let api_key = self.api_key().await;
        if api_key.is_empty() {
            warn!("indexer-manager API key is missing; skipping indexer-aggregator search");
            return Ok(vec![]);
        }

        let limit = self.config.limit.clamp(1, 500);
        let offset = (page.saturating_sub(1)) * limit.max(1);
        let mut url = format!(
            "{}/api/v1/search?Type=search&Query={}&Offset={offset}&Limit={limit}",
            self.config.base_url,
            urlencoding_encode(query)
        );
        if !self.config.indexer_ids.is_empty() {
            let ids = self.config.indexer_ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
            url.push_str(&format!("&IndexerIds={ids}"));
        }
        if !self.config.category_ids.is_empty() {
            let ids = self.config.category_ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
            url.push_str(&format!("&Categories={ids}"));
        }

        let response = match self
            .client
            .get(&url)
            .timeout(self.config.request_timeout)
            .header("X-Api-Key", &api_key)
            .header("Accept", "application/json,text/plain,*/*")
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "indexer-manager request failed");
                return Ok(vec![]);
            }
        };

        if response.status().as_u16() == 401 {
            warn!("indexer-manager auth failed (401)");
            return Ok(vec![]);
        }

        let rows = match response.json::<Vec<IndexerRow>>().await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "indexer-manager returned an unexpected response shape");
                return Ok(vec![]);
            }
        };

        Ok(rows.into_iter().filter_map(map_row).collect())
    }
}

fn urlencoding_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rows_preferring_magnet_then_guid_then_download_url() {
        let row = IndexerRow {
            title: "Demo Pack".to_string(),
            release_title: String::new(),
            magnet_url: String::new(),
            guid: "https://indexer.example/guid/1".to_string(),
            download_url: "https://indexer.example/dl/1".to_string(),
            size: 1000,
            seeders: 5,
            leechers: 1,
            indexer: "DemoIndexer".to_string(),
            indexer_name: String::new(),
            category_desc: Some("software".to_string()),
            category: None,
        };
        let result = map_row(row).unwrap();
        assert_eq!(result.link, "https://indexer.example/guid/1");
        assert_eq!(result.aggregated_sources, vec!["DemoIndexer".to_string()]);
        assert_eq!(result.link_candidates.len(), 2);
    }

    #[test]
    fn rows_with_no_title_or_link_are_dropped() {
        let row = IndexerRow {
            title: String::new(),
            release_title: String::new(),
            magnet_url: String::new(),
            guid: String::new(),
            download_url: String::new(),
            size: 0,
            seeders: 0,
            leechers: 0,
            indexer: String::new(),
            indexer_name: String::new(),
            category_desc: None,
            category: None,
        };
        assert!(map_row(row).is_none());
    }
}
