//! Cloud-library provider: lists the user's own remote-debrid torrent
//! library and filters it by the search query, rather than querying an
//! upstream index.
//!
//! Grounded on `RealDebridLibrarySource` in
//! `original_source/pluggy/sources/rd_library.py`; the HTTP client contract
//! (`CloudLibraryClient`) is grounded on the list-call shape in
//! `original_source/pluggy/services/realdebrid_client.py`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use revaer_core::{CoreResult, Provider, SearchResult};
use serde::Deserialize;
use tracing::warn;

/// One entry in the user's cloud-debrid torrent library.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudLibraryItem {
    /// Stable item id.
    #[serde(default)]
    pub id: String,
    /// Display filename.
    #[serde(default)]
    pub filename: String,
    /// Total size, in bytes.
    #[serde(default)]
    pub bytes: u64,
    /// Download-ready direct links, if any have been unrestricted already.
    #[serde(default)]
    pub links: Vec<String>,
    /// Lifecycle status string (`downloaded`, `downloading`, `error`, ...).
    #[serde(default)]
    pub status: String,
}

/// Abstraction over the remote-debrid account API, so the provider doesn't
/// depend on a concrete HTTP client shape.
#[async_trait]
pub trait CloudLibraryClient: Send + Sync {
    /// Is an access token currently configured?
    fn is_authenticated(&self) -> bool;

    /// List the user's torrent library, one page at a time.
    async fn list_torrents(&self, page: u32, limit: u32) -> Result<Vec<CloudLibraryItem>, String>;
}

/// REST client for a remote-debrid-style account API using bearer-token
/// auth.
pub struct RestCloudLibraryClient {
    base_url: String,
    access_token: String,
    request_timeout: Duration,
    client: Client,
}

impl RestCloudLibraryClient {
    /// Construct a client bound to `base_url` with `access_token`.
    #[must_use]
    pub fn new(base_url: String, access_token: String, request_timeout: Duration) -> Self {
        Self {
            base_url,
            access_token,
            request_timeout,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl CloudLibraryClient for RestCloudLibraryClient {
    fn is_authenticated(&self) -> bool {
        !self.access_token.is_empty()
    }

    async fn list_torrents(&self, page: u32, limit: u32) -> Result<Vec<CloudLibraryItem>, String> {
        let url = format!("{}/torrents?page={page}&limit={limit}", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        response.json::<Vec<CloudLibraryItem>>().await.map_err(|err| err.to_string())
    }
}

/// Cloud-library provider.
pub struct CloudLibraryProvider {
    enabled: bool,
    client: Box<dyn CloudLibraryClient>,
}

impl CloudLibraryProvider {
    /// Construct a provider backed by `client`.
    #[must_use]
    pub fn new(enabled: bool, client: Box<dyn CloudLibraryClient>) -> Self {
        Self { enabled, client }
    }
}

#[async_trait]
impl Provider for CloudLibraryProvider {
    fn name(&self) -> &str {
        "Cloud Library"
    }

    async fn search(&self, query: &str, page: u32) -> CoreResult<Vec<SearchResult>> {
        if !self.enabled {
            return Ok(vec![]);
        }
        if !self.client.is_authenticated() {
            warn!("cloud library source is enabled but the account is not authenticated");
            return Ok(vec![]);
        }

        let items = match self.client.list_torrents(page, 100).await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "cloud library list call failed");
                return Ok(vec![]);
            }
        };

        let needle = query.trim().to_lowercase();
        let results = items
            .into_iter()
            .filter_map(|item| {
                let name = item.filename.trim();
                if name.is_empty() || (!needle.is_empty() && !name.to_lowercase().contains(&needle)) {
                    return None;
                }
                let title = if item.status.is_empty() {
                    name.to_string()
                } else {
                    format!("{name} [{}]", item.status)
                };
                Some(SearchResult {
                    title,
                    link: item.links.first().cloned().unwrap_or_default(),
                    size: item.bytes,
                    seeds: 0,
                    leeches: 0,
                    source: "Cloud Library".to_string(),
                    infohash: String::new(),
                    category: None,
                    upload_date: None,
                    link_candidates: item.links,
                    aggregated_sources: vec!["Cloud Library".to_string()],
                    link_quality: 0.0,
                })
            })
            .collect();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClient {
        authenticated: bool,
        items: Vec<CloudLibraryItem>,
    }

    #[async_trait]
    impl CloudLibraryClient for FixedClient {
        fn is_authenticated(&self) -> bool {
            self.authenticated
        }

        async fn list_torrents(&self, _page: u32, _limit: u32) -> Result<Vec<CloudLibraryItem>, String> {
            Ok(self.items.clone())
        }
    }

    #[tokio::test]
    async fn unauthenticated_client_yields_no_results() {
        let provider = CloudLibraryProvider::new(
            true,
            Box::new(FixedClient {
                authenticated: false,
                items: vec![],
            }),
        );
        let results = provider.search("demo", 1).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn filters_by_case_insensitive_substring() {
        let provider = CloudLibraryProvider::new(
            true,
            Box::new(FixedClient {
                authenticated: true,
                items: vec![
                    CloudLibraryItem {
                        id: "1".to_string(),
                        filename: "Demo.Plugin.Pack.zip".to_string(),
                        bytes: 1000,
                        links: vec!["https://rd.example/dl/1".to_string()],
                        status: "downloaded".to_string(),
                    },
                    CloudLibraryItem {
                        id: "2".to_string(),
                        filename: "Unrelated.iso".to_string(),
                        bytes: 2000,
                        links: vec![],
                        status: String::new(),
                    },
                ],
            }),
        );
        let results = provider.search("demo", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "Demo.Plugin.Pack.zip [downloaded]");
    }
}
