//! `MirrorRotationProvider`: HTML-table torrent-index scraping with mirror
//! rotation (§4.4.1, grounded on `piratebay.py`/`rutracker.py`/`x1337.py`).
//!
//! The current mirror is remembered across calls (the first mirror that
//! yields a non-empty parse becomes the new preferred mirror), so a healthy
//! mirror is tried first on the next search.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use revaer_core::{magnet, CoreResult, Provider, SearchResult};
use scraper::{Html, Selector};
use tracing::warn;
use urlencoding::encode;

static SEEDS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)seed(?:s|ers)?\D{0,5}(\d+)").expect("valid static regex")
});
static LEECH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)leech(?:es|ers)?\D{0,5}(\d+)").expect("valid static regex")
});

const BLOCKED_SIGNALS: &[&str] = &[
    "fastpanel",
    "view more possible reasons",
    "cloudflare",
    "captcha",
    "just a moment",
    "ddos protection",
];

fn looks_blocked(html: &str) -> bool {
    let lower = html.to_lowercase();
    BLOCKED_SIGNALS.iter().any(|sig| lower.contains(sig))
}

/// Configuration for one [`MirrorRotationProvider`] instance.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Stable provider name.
    pub name: String,
    /// Mirror hosts in priority order (scheme + host, no trailing slash).
    pub mirrors: Vec<String>,
    /// Request timeout per mirror attempt.
    pub request_timeout: Duration,
}

/// HTML-table torrent-index provider: rotates across configured mirrors,
/// extracting magnet anchors directly from the listing page (these sites
/// embed magnets in search results, no detail-page hop needed).
pub struct MirrorRotationProvider {
    config: MirrorConfig,
    client: Client,
    preferred_mirror: RwLock<Option<String>>,
    last_error: RwLock<String>,
}

impl MirrorRotationProvider {
    /// Construct a provider from `config`, using a default `reqwest` client.
    #[must_use]
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            config,
            client: Client::new(),
            preferred_mirror: RwLock::new(None),
            last_error: RwLock::new(String::new()),
        }
    }

    fn mirror_order(&self) -> Vec<String> {
        let preferred = self.preferred_mirror.read().ok().and_then(|g| g.clone());
        let mut order: Vec<String> = Vec::with_capacity(self.config.mirrors.len());
        if let Some(p) = preferred {
            order.push(p.clone());
            order.extend(self.config.mirrors.iter().filter(|m| **m != p).cloned());
        } else {
            order.extend(self.config.mirrors.iter().cloned());
        }
        order
    }

    fn set_preferred(&self, mirror: &str) {
        if let Ok(mut guard) = self.preferred_mirror.write() {
            *guard = Some(mirror.to_string());
        }
    }

    fn set_last_error(&self, message: String) {
        if let Ok(mut guard) = self.last_error.write() {
            *guard = message;
        }
    }

    fn parse_listing(&self, html: &str, mirror: &str) -> Vec<SearchResult> {
        let document = Html::parse_document(html);
        let Ok(anchor_selector) = Selector::parse("a[href^=\"magnet:\"]") else {
            return Vec::new();
        };

        let mut results = Vec::new();
        for anchor in document.select(&anchor_selector) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let infohash = magnet::extract_infohash(href);
            if infohash.is_empty() {
                continue;
            }
            let title = anchor.text().collect::<String>().trim().to_string();
            let title = if title.is_empty() {
                format!("{} result", self.config.name)
            } else {
                title
            };

            // Look at the surrounding row text for seed/leech counts; these
            // sites typically render them as sibling table cells.
            let context: String = anchor
                .ancestors()
                .find_map(scraper::ElementRef::wrap)
                .map(|row| row.text().collect::<String>())
                .unwrap_or_default();
            let seeds = SEEDS_PATTERN
                .captures(&context)
                .and_then(|c| c[1].parse::<u64>().ok())
                .unwrap_or(0);
            let leeches = LEECH_PATTERN
                .captures(&context)
                .and_then(|c| c[1].parse::<u64>().ok())
                .unwrap_or(0);

            let link_quality = revaer_core::rank::link_quality(href, seeds, leeches, 0);
            results.push(SearchResult {
                title,
                link: href.to_string(),
                size: 0,
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

        if !results.is_empty() {
            self.set_preferred(mirror);
        }
        results
    }
}

#[async_trait]
impl Provider for MirrorRotationProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn search(&self, query: &str, page: u32) -> CoreResult<Vec<SearchResult>> {
        self.set_last_error(String::new());
        if self.config.mirrors.is_empty() {
            self.set_last_error("no mirrors configured".to_string());
            return Ok(vec![]);
        }

        let page_num = page.saturating_sub(1);
        let encoded = encode(query);
        let mut last_error = String::new();

        for mirror in self.mirror_order() {
            let url = format!("{mirror}/search/{encoded}/{page_num}/99/0");
            let attempt = self
                .client
                .get(&url)
                .timeout(self.config.request_timeout)
                .header("User-Agent", "Mozilla/5.0 (compatible; revaer/1.0)")
                .send()
                .await;
            match attempt {
                Ok(response) => match response.text().await {
                    Ok(body) if looks_blocked(&body) => {
                        last_error = format!("{mirror} returned a parked/blocked page");
                    }
                    Ok(body) => {
                        let results = self.parse_listing(&body, &mirror);
                        if !results.is_empty() {
                            return Ok(results);
                        }
                    }
                    Err(err) => {
                        warn!(mirror = %mirror, error = %err, "failed to read mirror response body");
                        last_error = err.to_string();
                    }
                },
                Err(err) => {
                    warn!(mirror = %mirror, error = %err, "mirror request failed");
                    last_error = err.to_string();
                }
            }
        }

        if !last_error.is_empty() {
            self.set_last_error(format!("all {} mirrors failed: {last_error}", self.config.name));
        }
        Ok(vec![])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_magnet_anchors_with_seed_context() {
        let provider = MirrorRotationProvider::new(MirrorConfig {
            name: "TestIndex".to_string(),
            mirrors: vec!["https://mirror.test".to_string()],
            request_timeout: Duration::from_secs(5),
        });
        let html = r#"<table><tr>
            <td><a href="magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01">Demo Pack</a></td>
            <td>120 seeds</td><td>4 leechers</td>
        </tr></table>"#;
        let results = provider.parse_listing(html, "https://mirror.test");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].seeds, 120);
        assert_eq!(results[0].leeches, 4);
        assert_eq!(results[0].infohash, "ABCDEF0123456789ABCDEF0123456789ABCDEF01");
    }

    #[test]
    fn empty_listing_yields_no_results() {
        let provider = MirrorRotationProvider::new(MirrorConfig {
            name: "TestIndex".to_string(),
            mirrors: vec!["https://mirror.test".to_string()],
            request_timeout: Duration::from_secs(5),
        });
        assert!(provider.parse_listing("<html></html>", "https://mirror.test").is_empty());
    }
}
