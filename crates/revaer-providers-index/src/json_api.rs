//! `JsonApiIndexProvider`: JSON-API torrent-index variant for indexers with
//! no native magnet field, synthesizing one via the shared magnet formula
//! (§4.4.1, §6; grounded on `apibay.org`'s `q.php` response shape).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use revaer_core::{magnet, rank, CoreResult, Provider, SearchResult};
use serde::Deserialize;
use tracing::warn;
use urlencoding::encode;

const DEAD_INFOHASH: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Deserialize)]
struct ApiRow {
    #[serde(default)]
    name: String,
    #[serde(default, rename = "info_hash")]
    info_hash: String,
    #[serde(default)]
    size: String,
    #[serde(default)]
    seeders: String,
    #[serde(default)]
    leechers: String,
}

fn parse_amount(raw: &str) -> u64 {
    raw.trim().parse::<u64>().unwrap_or(0)
}

/// Configuration for one [`JsonApiIndexProvider`] instance.
#[derive(Debug, Clone)]
pub struct JsonApiConfig {
    /// Stable provider name.
    pub name: String,
    /// API base URLs in priority order.
    pub endpoints: Vec<String>,
    /// Request timeout per endpoint attempt.
    pub request_timeout: Duration,
}

/// JSON-API torrent-index provider.
pub struct JsonApiIndexProvider {
    config: JsonApiConfig,
    client: Client,
}

impl JsonApiIndexProvider {
    /// Construct a provider from `config`, using a default `reqwest` client.
    #[must_use]
    pub fn new(config: JsonApiConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn map_rows(&self, rows: Vec<ApiRow>) -> Vec<SearchResult> {
        let mut results = Vec::new();
        for row in rows {
            let name = row.name.trim();
            let infohash = row.info_hash.trim().to_uppercase();
            if name.is_empty() || infohash.len() != 40 || infohash == DEAD_INFOHASH {
                continue;
            }
            let size = parse_amount(&row.size);
            let seeds = parse_amount(&row.seeders);
            let leeches = parse_amount(&row.leechers);
            let link = magnet::synthesize_magnet(&infohash, name);
            let link_quality = rank::link_quality(&link, seeds, leeches, size);
            results.push(SearchResult {
                title: name.to_string(),
                link,
                size,
                seeds,
                leeches,
                source: self.config.name.clone(),
                infohash,
                category: None,
                upload_date: None,
                link_candidates: vec![],
                aggregated_sources: vec![self.config.name.clone()],
                link_quality,
            });
        }
        results
    }
}

#[async_trait]
impl Provider for JsonApiIndexProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(&self, query: &str, _page: u32) -> CoreResult<Vec<SearchResult>> {
        if self.config.endpoints.is_empty() {
            return Ok(vec![]);
        }
        let encoded = encode(query);
        for endpoint in &self.config.endpoints {
            let url = format!("{endpoint}/q.php?q={encoded}");
            let attempt = self
                .client
                .get(&url)
                .timeout(self.config.request_timeout)
                .header("Accept", "application/json,text/plain,*/*")
                .send()
                .await;
            let response = match attempt {
                Ok(response) => response,
                Err(err) => {
                    warn!(endpoint = %endpoint, error = %err, "index API request failed");
                    continue;
                }
            };
            match response.json::<Vec<ApiRow>>().await {
                Ok(rows) => {
                    let results = self.map_rows(rows);
                    if !results.is_empty() {
                        return Ok(results);
                    }
                }
                Err(err) => {
                    warn!(endpoint = %endpoint, error = %err, "index API response was not the expected shape");
                }
            }
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_rows_and_synthesizes_magnet() {
        let provider = JsonApiIndexProvider::new(JsonApiConfig {
            name: "TestApi".to_string(),
            endpoints: vec!["https://api.test".to_string()],
            request_timeout: Duration::from_secs(5),
        });
        let rows = vec![ApiRow {
            name: "Demo Pack".to_string(),
            info_hash: "abcdef0123456789abcdef0123456789abcdef01".to_string(),
            size: "1000".to_string(),
            seeders: "5".to_string(),
            leechers: "1".to_string(),
        }];
        let results = provider.map_rows(rows);
        assert_eq!(results.len(), 1);
        assert!(results[0].link.starts_with("magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01"));
    }

    #[test]
    fn filters_dead_and_short_infohashes() {
        let provider = JsonApiIndexProvider::new(JsonApiConfig {
            name: "TestApi".to_string(),
            endpoints: vec![],
            request_timeout: Duration::from_secs(5),
        });
        let rows = vec![
            ApiRow {
                name: "Dead".to_string(),
                info_hash: "0".repeat(40),
                size: String::new(),
                seeders: String::new(),
                leechers: String::new(),
            },
            ApiRow {
                name: "Short".to_string(),
                info_hash: "abc".to_string(),
                size: String::new(),
                seeders: String::new(),
                leechers: String::new(),
            },
        ];
        assert!(provider.map_rows(rows).is_empty());
    }
}
