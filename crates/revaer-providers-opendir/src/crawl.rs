//! Bounded recursive crawl over directory-listing pages, plus search-engine
//! discovery of additional candidate roots.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use revaer_core::SearchResult;
use scraper::{Html, Selector};
use url::Url;

use crate::adapter::parse_directory_listing;
use crate::config::OpenDirConfig;
use crate::filters::{canonicalize_for_fetch, is_allowed_page, is_search_engine_host};
use crate::retry::get_with_retry;

static DISCOVERY_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.result__a[href], h2 a[href], a[href]").expect("valid static selector"));
static RAW_URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+"#).expect("valid static regex"));

fn query_tokens(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 2)
        .map(ToString::to_string)
        .collect()
}

/// Build `suhr.ir`-specific probe paths for the first query token, a fast
/// win for the one open-directory structure this provider knows by name.
#[must_use]
pub fn targeted_candidate_pages(query: &str, seed_urls: &[String]) -> Vec<String> {
    let tokens = query_tokens(query);
    let Some(primary) = tokens.first() else {
        return Vec::new();
    };
    let mut candidates = Vec::new();
    for seed in seed_urls {
        let Ok(parsed) = Url::parse(seed) else { continue };
        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        let path = parsed.path().trim_matches('/');
        if host.contains("suhr.ir") && path.starts_with("plugin") {
            let base = format!("http://{host}/plugin");
            for suffix in ["mac", "windows", "win.mac"] {
                candidates.push(format!("{base}/{suffix}/{primary}/"));
            }
            candidates.push(format!("{base}/{primary}/"));
        }
    }
    candidates
}

/// Discover candidate directory pages via configured search-engine templates,
/// synthesizing an `intitle:"index of"` dork from `query`.
pub async fn discover_candidate_pages(client: &Client, query: &str, config: &OpenDirConfig) -> Vec<String> {
    let dork = build_dork_query(query, &config.file_extensions);
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    for template in &config.engine_templates {
        if !template.contains("{query}") {
            continue;
        }
        let url = template.replace("{query}", &urlencoding::encode(&dork));
        let Ok(response) = get_with_retry(
            client,
            &url,
            config.request_timeout,
            config.request_retries,
            config.retry_backoff,
            &config.insecure_hosts,
        )
        .await
        else {
            continue;
        };
        let Ok(body) = response.text().await else {
            continue;
        };
        let document = Html::parse_document(&body);

        let mut candidates: Vec<String> = document
            .select(&DISCOVERY_SELECTOR)
            .filter_map(|el| el.value().attr("href"))
            .filter_map(|href| normalize_search_result_link(href, &url))
            .collect();
        for raw in RAW_URL_PATTERN.find_iter(&body) {
            candidates.push(raw.as_str().trim_end_matches([')', '.', ',', ';', '!', '?']).to_string());
        }

        for candidate in candidates {
            if is_search_engine_host(&candidate) || !is_allowed_page(&candidate, config) || seen.contains(&candidate) {
                continue;
            }
            seen.insert(candidate.clone());
            found.push(candidate);
            if found.len() >= config.max_candidate_pages {
                return found;
            }
        }
    }
    found
}

fn normalize_search_result_link(href: &str, base: &str) -> Option<String> {
    let base_url = Url::parse(base).ok()?;
    let absolute = base_url.join(href).ok()?;
    if absolute.host_str().unwrap_or_default().ends_with("duckduckgo.com") && absolute.path().starts_with("/l/") {
        if let Some((_, uddg)) = absolute.query_pairs().find(|(k, _)| k == "uddg") {
            return Some(uddg.into_owned());
        }
    }
    if absolute.scheme() != "http" && absolute.scheme() != "https" {
        return None;
    }
    Some(absolute.to_string())
}

fn build_dork_query(query: &str, extensions: &[String]) -> String {
    let ext_part = extensions
        .iter()
        .take(10)
        .map(|e| format!("ext:{e}"))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "intitle:\"index of\" \"{query}\" (windows OR macos OR vst OR plugin OR installer OR portable) ({ext_part}) \
         -inurl:(jsp|pl|php|html|aspx|htm)"
    )
}

/// Crawl one directory-listing page and any subdirectories discovered on it,
/// bounded by `max_depth` and `max_subdirs_per_page`, using an explicit work
/// queue rather than recursion.
pub async fn crawl_from_roots(
    client: &Client,
    roots: Vec<String>,
    query: &str,
    config: &OpenDirConfig,
    source_name: &str,
    visited: &mut HashSet<String>,
) -> Vec<SearchResult> {
    let tokens = query_tokens(query);
    let mut queue: Vec<(String, u32)> = roots.into_iter().map(|r| (r, 0)).collect();
    let mut results = Vec::new();

    while let Some((page_url, depth)) = queue.pop() {
        let canonical = canonicalize_for_fetch(&page_url, &config.insecure_hosts);
        if depth > config.max_depth || visited.contains(&canonical) || !is_allowed_page(&canonical, config) {
            continue;
        }
        visited.insert(canonical.clone());

        let Ok(response) = get_with_retry(
            client,
            &canonical,
            config.request_timeout,
            config.request_retries,
            config.retry_backoff,
            &config.insecure_hosts,
        )
        .await
        else {
            continue;
        };
        let Ok(body) = response.text().await else {
            continue;
        };

        let parsed = parse_directory_listing(&body, &canonical, &tokens, config, source_name);
        results.extend(parsed.results);
        for subdir in parsed.subdirs.into_iter().take(config.max_subdirs_per_page) {
            queue.push((subdir, depth + 1));
        }
    }

    results
}

/// Has `deadline` already passed?
#[must_use]
pub fn deadline_elapsed(started: Instant, budget: Duration) -> bool {
    started.elapsed() >= budget
}

/// De-duplicate results by lowercased link, keeping first occurrence order.
#[must_use]
pub fn dedupe(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| {
            let key = r.link.trim().to_lowercase();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_suhr_probe_paths_from_first_token() {
        let pages = targeted_candidate_pages("demo plugin", &["http://suhr.ir/plugin/".to_string()]);
        assert!(pages.iter().any(|p| p == "http://suhr.ir/plugin/mac/demo/"));
    }

    #[test]
    fn no_probes_for_non_suhr_seeds() {
        let pages = targeted_candidate_pages("demo", &["http://files.example/".to_string()]);
        assert!(pages.is_empty());
    }

    #[test]
    fn dedupes_by_lowercased_link() {
        let make = |link: &str| SearchResult {
            title: "x".to_string(),
            link: link.to_string(),
            size: 0,
            seeds: 0,
            leeches: 0,
            source: "OpenDirectory".to_string(),
            infohash: String::new(),
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec!["OpenDirectory".to_string()],
            link_quality: 0.0,
        };
        let results = vec![make("http://x/a.zip"), make("HTTP://X/A.ZIP")];
        assert_eq!(dedupe(results).len(), 1);
    }
}
