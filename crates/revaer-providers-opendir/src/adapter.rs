//! Listing-page parsing: one generic directory-index parser, reused by both
//! the fallback adapter and the `suhr.ir`-tagged adapter (the two sites
//! share the same autoindex markup; only host-matching and request
//! canonicalization differ between them).
//!
//! Grounded on `GenericODAdapter`/`SuhrODAdapter` in
//! `original_source/pluggy/sources/open_directory.py`.

use once_cell::sync::Lazy;
use revaer_core::SearchResult;
use scraper::{Html, Selector};
use url::Url;

use crate::config::OpenDirConfig;
use crate::filters::{extract_size_from_text, is_allowed_page, within_size_limit};

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("valid static selector"));
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid static selector"));

/// One parsed listing page: download-worthy results plus subdirectory URLs
/// worth a recursive visit.
pub struct ParsedListing {
    /// Results extracted from this page alone.
    pub results: Vec<SearchResult>,
    /// Same-host subdirectory URLs discovered on this page.
    pub subdirs: Vec<String>,
}

fn page_title(document: &Html, fallback: &str) -> String {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn looks_like_directory(path: &str) -> bool {
    let leaf = path.rsplit('/').next().unwrap_or_default();
    !leaf.contains('.')
}

/// Parse a directory-listing page, following the two-tier rule: directory
/// anchors are queued for recursion (and kept as a results fallback if
/// nothing file-like matches), file anchors matching the query tokens and
/// extension allowlist become results.
#[must_use]
pub fn parse_directory_listing(
    html: &str,
    page_url: &str,
    query_tokens: &[String],
    config: &OpenDirConfig,
    source_name: &str,
) -> ParsedListing {
    let document = Html::parse_document(html);
    let title = page_title(&document, page_url);
    let page_context = format!("{title} {page_url}").to_lowercase();
    let Ok(base) = Url::parse(page_url) else {
        return ParsedListing {
            results: vec![],
            subdirs: vec![],
        };
    };
    let page_host = base.host_str().unwrap_or_default().to_lowercase();

    let mut results = Vec::new();
    let mut subdirs = Vec::new();
    let mut directory_fallback = Vec::new();

    for anchor in document.select(&ANCHOR_SELECTOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(absolute) = base.join(href) else {
            continue;
        };
        if absolute.scheme() != "http" && absolute.scheme() != "https" {
            continue;
        }
        let absolute_str = absolute.to_string();
        if !is_allowed_page(&absolute_str, config) {
            continue;
        }

        let text = anchor.text().collect::<String>().trim().to_string();
        let path_leaf = absolute.path().rsplit('/').find(|s| !s.is_empty()).unwrap_or_default();
        let lower_name = if text.is_empty() {
            path_leaf.to_lowercase()
        } else {
            text.to_lowercase()
        };
        let match_blob = format!("{lower_name} {page_context}");
        let matches_query = query_tokens.is_empty() || query_tokens.iter().any(|tok| match_blob.contains(tok.as_str()));
        let same_host = absolute.host_str().unwrap_or_default().to_lowercase() == page_host;

        let is_directory_href = href.ends_with('/') && href != "../" && href != "./" && same_host;
        let is_probable_directory = !is_directory_href && same_host && looks_like_directory(absolute.path());

        if is_directory_href || is_probable_directory {
            subdirs.push(absolute_str.clone());
            if matches_query {
                directory_fallback.push(SearchResult {
                    title: format!("{title} - {}", if text.is_empty() { path_leaf } else { &text }),
                    link: absolute_str,
                    size: 0,
                    seeds: 0,
                    leeches: 0,
                    source: source_name.to_string(),
                    infohash: String::new(),
                    category: None,
                    upload_date: None,
                    link_candidates: vec![],
                    aggregated_sources: vec![source_name.to_string()],
                    link_quality: 0.2,
                });
            }
            continue;
        }

        if !config.file_extensions.is_empty()
            && !config
                .file_extensions
                .iter()
                .any(|ext| absolute.path().to_lowercase().ends_with(&format!(".{}", ext.to_lowercase())))
        {
            continue;
        }
        if !query_tokens.is_empty() && !matches_query {
            continue;
        }

        let row_text = anchor
            .ancestors()
            .find_map(scraper::ElementRef::wrap)
            .map(|el| el.text().collect::<String>())
            .unwrap_or_else(|| text.clone());
        let size_bytes = extract_size_from_text(&row_text);
        if !within_size_limit(size_bytes, config.max_file_size_gb) {
            continue;
        }

        results.push(SearchResult {
            title: format!("{title} - {}", if text.is_empty() { path_leaf } else { &text }),
            link: absolute_str,
            size: size_bytes,
            seeds: 0,
            leeches: 0,
            source: source_name.to_string(),
            infohash: String::new(),
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec![source_name.to_string()],
            link_quality: 0.3,
        });
    }

    if results.is_empty() && !directory_fallback.is_empty() {
        results.extend(directory_fallback.into_iter().take(12));
    } else if results.is_empty() && !subdirs.is_empty() {
        for directory_url in subdirs.iter().take(8) {
            let Ok(parsed) = Url::parse(directory_url) else {
                continue;
            };
            let leaf = parsed
                .path()
                .trim_end_matches('/')
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("Directory");
            results.push(SearchResult {
                title: format!("{title} - {leaf}"),
                link: directory_url.clone(),
                size: 0,
                seeds: 0,
                leeches: 0,
                source: source_name.to_string(),
                infohash: String::new(),
                category: None,
                upload_date: None,
                link_candidates: vec![],
                aggregated_sources: vec![source_name.to_string()],
                link_quality: 0.1,
            });
        }
    }

    ParsedListing { results, subdirs }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_matching_files_and_queues_subdirs() {
        let config = OpenDirConfig::default();
        let html = r#"
            <title>Index of /plugin/mac</title>
            <a href="../">../</a>
            <a href="subdir/">subdir/</a>
            <a href="demo-plugin.zip">demo-plugin.zip 120 MB</a>
        "#;
        let parsed = parse_directory_listing(
            html,
            "http://suhr.ir/plugin/mac/",
            &["demo".to_string()],
            &config,
            "OpenDirectory",
        );
        assert_eq!(parsed.subdirs, vec!["http://suhr.ir/plugin/mac/subdir/".to_string()]);
        assert_eq!(parsed.results.len(), 1);
        assert!(parsed.results[0].link.ends_with("demo-plugin.zip"));
    }

    #[test]
    fn falls_back_to_directory_listing_when_no_files_match() {
        let config = OpenDirConfig::default();
        let html = r#"
            <title>Index of /plugin</title>
            <a href="mac/">mac/</a>
            <a href="windows/">windows/</a>
        "#;
        let parsed = parse_directory_listing(html, "http://suhr.ir/plugin/", &[], &config, "OpenDirectory");
        assert_eq!(parsed.subdirs.len(), 2);
        assert_eq!(parsed.results.len(), 2);
    }
}
