//! Domain-adapter dispatch: each adapter advertises a host predicate and a
//! bespoke listing-to-detail-link extraction; an adapter with no bespoke
//! rules falls back to CSS-selector heuristics shared by most blog-style
//! indexes.
//!
//! Grounded on the `DomainHTTPAdapter` family (`NmacHTTPAdapter`,
//! `AudiozHTTPAdapter`): this crate implements the dispatch mechanism plus a
//! generic adapter and one bespoke example, not the full upstream adapter
//! roster.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::Client;
use revaer_core::{magnet, rank, SearchResult};
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::classifier::{detect_gated, is_download_like};
use crate::redirect;
use crate::retry::get_with_retry;

static H1_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("valid static selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("title").expect("valid static selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href], a[data-href], a[data-url]").expect("valid static selector"));
static MAGNET_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href^=\"magnet:\"]").expect("valid static selector"));

/// Bounds applied while crawling one source template.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    /// Maximum number of detail pages to crawl per listing.
    pub max_detail_pages: usize,
    /// Maximum number of links collected per detail page.
    pub max_links_per_detail: usize,
    /// Wall-clock deadline for the whole template query, from first fetch.
    pub time_budget: Duration,
    /// Timeout for a single detail-page (or redirect-follow) request.
    pub request_timeout: Duration,
    /// Timeout budget for an optional redirect-follow request.
    pub redirect_timeout: Duration,
    /// Extra attempts beyond the first for each request.
    pub request_retries: u32,
    /// Base backoff between retry attempts.
    pub retry_backoff: Duration,
    /// Maximum number of detail pages fetched concurrently.
    pub detail_concurrency: usize,
}

/// Shared crawling primitives handed to adapters so bespoke `parse`
/// implementations can reuse the same bounded detail-page crawl the generic
/// adapter uses.
pub struct CrawlContext<'a> {
    client: &'a Client,
    limits: &'a ParseLimits,
    source_name: &'a str,
}

fn extract_links_from_detail(html: &str, page_url: &str, source_name: &str, limits: &ParseLimits) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    let title = document
        .select(&H1_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .or_else(|| {
            document
                .select(&TITLE_SELECTOR)
                .next()
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
        })
        .unwrap_or_else(|| source_name.to_string());

    let mut links: Vec<String> = Vec::new();
    for el in document.select(&LINK_SELECTOR) {
        let raw = el
            .value()
            .attr("href")
            .or_else(|| el.value().attr("data-href"))
            .or_else(|| el.value().attr("data-url"));
        let Some(raw) = raw else { continue };
        let Some(decoded) = redirect::decode(raw, page_url) else {
            continue;
        };
        if !is_download_like(&decoded) || links.contains(&decoded) {
            continue;
        }
        links.push(decoded);
        if links.len() >= limits.max_links_per_detail {
            break;
        }
    }

    if links.is_empty() {
        let page_text_lower = document.root_element().text().collect::<String>().to_lowercase();
        let _ = detect_gated(&page_text_lower);
        return Vec::new();
    }

    links
        .into_iter()
        .map(|link| {
            let infohash = magnet::extract_infohash(&link);
            let link_quality = rank::link_quality(&link, 0, 0, 0);
            SearchResult {
                title: title.clone(),
                link,
                size: 0,
                seeds: 0,
                leeches: 0,
                source: source_name.to_string(),
                infohash,
                category: None,
                upload_date: None,
                link_candidates: vec![],
                aggregated_sources: vec![source_name.to_string()],
                link_quality,
            }
        })
        .collect()
}

impl<'a> CrawlContext<'a> {
    /// Build a context bound to one template query's client, limits, and
    /// provider name.
    #[must_use]
    pub fn new(client: &'a Client, limits: &'a ParseLimits, source_name: &'a str) -> Self {
        Self {
            client,
            limits,
            source_name,
        }
    }

    /// Fetch each detail URL (bounded by `detail_concurrency` and
    /// `time_budget`), extract download-like links, and emit one result per
    /// unique link.
    pub async fn crawl_detail_links(&self, links: Vec<String>) -> Vec<SearchResult> {
        let semaphore = Arc::new(Semaphore::new(self.limits.detail_concurrency.max(1)));
        let mut joins = JoinSet::new();
        let client = self.client.clone();
        let limits = self.limits.clone();
        let source_name = self.source_name.to_string();

        for url in links.into_iter().take(self.limits.max_detail_pages) {
            let semaphore = Arc::clone(&semaphore);
            let client = client.clone();
            let limits = limits.clone();
            let source_name = source_name.clone();
            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok()?;
                let response = get_with_retry(
                    &client,
                    &url,
                    limits.request_timeout,
                    limits.request_retries,
                    limits.retry_backoff,
                )
                .await
                .ok()?;
                let body = response.text().await.ok()?;
                Some(extract_links_from_detail(&body, &url, &source_name, &limits))
            });
        }

        let mut results = Vec::new();
        let outcome = tokio::time::timeout(self.limits.time_budget, async {
            while let Some(joined) = joins.join_next().await {
                if let Ok(Some(mut page_results)) = joined {
                    results.append(&mut page_results);
                }
            }
        })
        .await;
        if outcome.is_err() {
            joins.abort_all();
        }
        results
    }
}

/// A domain adapter: matches a host substring and extracts candidate detail
/// links (or final results) from a listing page.
#[async_trait]
pub trait DomainAdapter: Send + Sync {
    /// Stable adapter name, used for diagnostics only.
    fn name(&self) -> &str;

    /// Does this adapter claim `host`?
    fn host_matches(&self, host: &str) -> bool;

    /// Parse a listing page into final results, using `ctx` for any detail
    /// crawl this adapter needs.
    async fn parse(
        &self,
        html: &str,
        page_url: &str,
        query: &str,
        ctx: &CrawlContext<'_>,
    ) -> Vec<SearchResult>;
}

fn extract_magnet_results(html: &str, source_name: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);
    document
        .select(&MAGNET_SELECTOR)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let infohash = magnet::extract_infohash(href);
            if infohash.is_empty() {
                return None;
            }
            let title = el.text().collect::<String>().trim().to_string();
            let title = if title.is_empty() {
                format!("{source_name} result")
            } else {
                title
            };
            let link_quality = rank::link_quality(href, 0, 0, 0);
            Some(SearchResult {
                title,
                link: href.to_string(),
                size: 0,
                seeds: 0,
                leeches: 0,
                source: source_name.to_string(),
                infohash,
                category: None,
                upload_date: None,
                link_candidates: vec![],
                aggregated_sources: vec![source_name.to_string()],
                link_quality,
            })
        })
        .collect()
}

fn candidate_links_by_selectors(
    html: &str,
    page_url: &str,
    selectors: &[&str],
    reject_substrings: &[&str],
    limit: usize,
) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(base) = Url::parse(page_url) else {
        return Vec::new();
    };
    let mut links = Vec::new();
    for raw_selector in selectors {
        let Ok(selector) = Selector::parse(raw_selector) else {
            continue;
        };
        for el in document.select(&selector) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            let Ok(absolute) = base.join(href) else {
                continue;
            };
            let absolute = absolute.to_string();
            if reject_substrings.iter().any(|s| absolute.contains(s)) {
                continue;
            }
            if !links.contains(&absolute) {
                links.push(absolute);
            }
            if links.len() >= limit {
                return links;
            }
        }
    }
    links
}

/// Fallback adapter for any host with no bespoke adapter registered: direct
/// magnet extraction first, then CSS-selector candidate-detail-link scoring
/// over a generic set of post/article heading selectors.
pub struct GenericAdapter;

#[async_trait]
impl DomainAdapter for GenericAdapter {
    fn name(&self) -> &str {
        "generic"
    }

    fn host_matches(&self, _host: &str) -> bool {
        true
    }

    async fn parse(
        &self,
        html: &str,
        page_url: &str,
        _query: &str,
        ctx: &CrawlContext<'_>,
    ) -> Vec<SearchResult> {
        let direct = extract_magnet_results(html, ctx.source_name);
        if !direct.is_empty() {
            return direct;
        }
        let links = candidate_links_by_selectors(
            html,
            page_url,
            &["h2 a[href]", "h3 a[href]", "a[rel='bookmark'][href]", "article a[href]"],
            &[],
            ctx.limits.max_detail_pages,
        );
        ctx.crawl_detail_links(links).await
    }
}

/// Bespoke adapter for `nmac.to`-shaped blog indexes: WordPress-style entry
/// titles and bookmark-rel anchors, no reject list.
///
/// Grounded on `NmacHTTPAdapter` in
/// `original_source/pluggy/sources/http_source.py`.
pub struct NmacStyleAdapter {
    host_suffix: &'static str,
}

impl NmacStyleAdapter {
    /// An adapter claiming hosts ending in `nmac.to`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            host_suffix: "nmac.to",
        }
    }
}

impl Default for NmacStyleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainAdapter for NmacStyleAdapter {
    fn name(&self) -> &str {
        "nmac-style"
    }

    fn host_matches(&self, host: &str) -> bool {
        host.ends_with(self.host_suffix)
    }

    async fn parse(
        &self,
        html: &str,
        page_url: &str,
        _query: &str,
        ctx: &CrawlContext<'_>,
    ) -> Vec<SearchResult> {
        let direct = extract_magnet_results(html, ctx.source_name);
        if !direct.is_empty() {
            return direct;
        }
        let links = candidate_links_by_selectors(
            html,
            page_url,
            &["article h2 a[href]", "h2.entry-title a[href]", "a[rel='bookmark'][href]"],
            &[],
            ctx.limits.max_detail_pages,
        );
        ctx.crawl_detail_links(links).await
    }
}

/// Pick the first adapter claiming `host`, the generic adapter otherwise.
#[must_use]
pub fn select_adapter<'a>(adapters: &'a [Box<dyn DomainAdapter>], host: &str) -> &'a dyn DomainAdapter {
    adapters
        .iter()
        .find(|a| a.host_matches(host))
        .map(std::convert::AsRef::as_ref)
        .expect("generic adapter always matches")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nmac_adapter_claims_its_host() {
        let adapter = NmacStyleAdapter::new();
        assert!(adapter.host_matches("www.nmac.to"));
        assert!(!adapter.host_matches("other.example"));
    }

    #[test]
    fn generic_adapter_claims_everything() {
        assert!(GenericAdapter.host_matches("anything.example"));
    }

    #[test]
    fn candidate_links_respect_reject_substrings() {
        let html = r#"<article><a href="/request/foo">no</a></article>
            <h2><a href="/posts/bar">yes</a></h2>"#;
        let links = candidate_links_by_selectors(
            html,
            "https://site.example",
            &["article a[href]", "h2 a[href]"],
            &["/request/"],
            10,
        );
        assert_eq!(links, vec!["https://site.example/posts/bar".to_string()]);
    }

    #[test]
    fn extracts_direct_magnet_results() {
        let html = r#"<a href="magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01">Demo</a>"#;
        let results = extract_magnet_results(html, "HTTP");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].infohash, "ABCDEF0123456789ABCDEF0123456789ABCDEF01");
    }
}
