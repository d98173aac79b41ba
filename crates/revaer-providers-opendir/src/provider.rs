//! [`OpenDirectoryProvider`]: open-directory discovery via known seeds,
//! targeted host-specific probes, and search-engine discovery.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use revaer_core::{CoreResult, Provider, SearchResult};

use crate::config::OpenDirConfig;
use crate::crawl::{crawl_from_roots, deadline_elapsed, dedupe, discover_candidate_pages, targeted_candidate_pages};

/// Open-directory provider: crawls known seed roots, targeted per-host
/// probes, and (optionally) search-engine-discovered candidate pages.
pub struct OpenDirectoryProvider {
    name: String,
    config: OpenDirConfig,
    client: Client,
}

impl OpenDirectoryProvider {
    /// Construct a provider from `config`.
    #[must_use]
    pub fn new(config: OpenDirConfig) -> Self {
        Self {
            name: "OpenDirectory".to_string(),
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Provider for OpenDirectoryProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, _page: u32) -> CoreResult<Vec<SearchResult>> {
        if !self.config.enabled || query.trim().is_empty() {
            return Ok(vec![]);
        }

        let started = Instant::now();
        let mut visited = HashSet::new();
        let mut results = Vec::new();

        let targeted = targeted_candidate_pages(query, &self.config.seed_urls);
        if !targeted.is_empty() {
            results.extend(
                crawl_from_roots(&self.client, targeted, query, &self.config, &self.name, &mut visited).await,
            );
            if results.len() >= self.config.max_results {
                return Ok(dedupe(results).into_iter().take(self.config.max_results).collect());
            }
        }

        for root in &self.config.seed_urls {
            let from_root = crawl_from_roots(
                &self.client,
                vec![root.clone()],
                query,
                &self.config,
                &self.name,
                &mut visited,
            )
            .await;
            results.extend(from_root);
            if results.len() >= self.config.fast_return_min_results.max(1)
                && deadline_elapsed(started, self.config.fast_return_seconds)
            {
                return Ok(dedupe(results).into_iter().take(self.config.max_results).collect());
            }
            if results.len() >= self.config.max_results {
                return Ok(dedupe(results).into_iter().take(self.config.max_results).collect());
            }
        }

        if self.config.use_search_engines {
            let candidates = discover_candidate_pages(&self.client, query, &self.config).await;
            if !candidates.is_empty() {
                results.extend(
                    crawl_from_roots(&self.client, candidates, query, &self.config, &self.name, &mut visited).await,
                );
            }
        }

        Ok(dedupe(results).into_iter().take(self.config.max_results).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_provider_returns_nothing() {
        let mut config = OpenDirConfig::default();
        config.enabled = false;
        let provider = OpenDirectoryProvider::new(config);
        let results = provider.search("demo", 1).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn blank_query_returns_nothing() {
        let provider = OpenDirectoryProvider::new(OpenDirConfig::default());
        let results = provider.search("   ", 1).await.unwrap();
        assert!(results.is_empty());
    }
}
