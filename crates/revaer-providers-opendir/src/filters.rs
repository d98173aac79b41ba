//! URL canonicalization, allow/exclude filtering, and size-limit checks
//! shared across seed crawling and search-engine discovery.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::config::OpenDirConfig;

static UNIT_SIZE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([KMGTP]i?B)").expect("valid static regex"));
static RAW_BYTES_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{7,12})\b").expect("valid static regex"));

/// Rewrite `url` to `http://` when its host is in `insecure_hosts`, matching
/// the known-bad-certificate hosts some open directories run on.
#[must_use]
pub fn canonicalize_for_fetch(url: &str, insecure_hosts: &[String]) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return url.to_string();
    }
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    let is_insecure_host = insecure_hosts
        .iter()
        .any(|h| host == h.as_str() || host.ends_with(&format!(".{h}")));
    if is_insecure_host && parsed.scheme() == "https" {
        let _ = parsed.set_scheme("http");
    }
    parsed.to_string()
}

/// Is `url` permitted under the allow/exclude lists?
#[must_use]
pub fn is_allowed_page(url: &str, config: &OpenDirConfig) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if !config.allowed_domains.is_empty()
        && !config
            .allowed_domains
            .iter()
            .any(|d| host == d.to_lowercase() || host.ends_with(&format!(".{}", d.to_lowercase())))
    {
        return false;
    }
    let lower = url.to_lowercase();
    !config.exclude_patterns.iter().any(|p| lower.contains(&p.to_lowercase()))
}

/// Is `size_bytes` within the configured cap (`0.0` meaning unlimited)?
#[must_use]
pub fn within_size_limit(size_bytes: u64, max_file_size_gb: f64) -> bool {
    if max_file_size_gb <= 0.0 || size_bytes == 0 {
        return true;
    }
    #[expect(clippy::cast_sign_loss, clippy::cast_possible_truncation, reason = "size caps are small positive values")]
    let cap_bytes = (max_file_size_gb * 1024.0_f64.powi(3)) as u64;
    size_bytes <= cap_bytes
}

/// Best-effort size extraction from a listing row's text, accepting either a
/// `"<value> <unit>"` pair or a bare run of 7-12 digits (raw byte counts
/// some index pages render without a unit).
#[must_use]
pub fn extract_size_from_text(text: &str) -> u64 {
    if let Some(caps) = UNIT_SIZE_PATTERN.captures(text) {
        return revaer_core::size::normalize_size(&format!("{} {}", &caps[1], &caps[2]));
    }
    RAW_BYTES_PATTERN
        .captures(text)
        .and_then(|c| c[1].parse::<u64>().ok())
        .unwrap_or(0)
}

/// Is `host` a known search-engine host, to be excluded from discovered
/// candidate pages?
#[must_use]
pub fn is_search_engine_host(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    const BLOCKED: &[&str] = &[
        "duckduckgo.com",
        "startpage.com",
        "google.",
        "bing.com",
        "searx.",
        "search.brave.com",
    ];
    BLOCKED.iter().any(|token| host.contains(token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_insecure_hosts_to_http() {
        let rewritten = canonicalize_for_fetch("https://suhr.ir/plugin/", &["suhr.ir".to_string()]);
        assert_eq!(rewritten, "http://suhr.ir/plugin/");
    }

    #[test]
    fn leaves_other_hosts_untouched() {
        let rewritten = canonicalize_for_fetch("https://files.example/plugin/", &["suhr.ir".to_string()]);
        assert_eq!(rewritten, "https://files.example/plugin/");
    }

    #[test]
    fn extracts_unit_sizes_and_raw_byte_counts() {
        assert_eq!(extract_size_from_text("demo.zip 352.8 MB"), 352_800_000);
        assert_eq!(extract_size_from_text("demo.zip 352825198"), 352_825_198);
        assert_eq!(extract_size_from_text("demo.zip"), 0);
    }

    #[test]
    fn size_limit_allows_zero_cap_as_unlimited() {
        assert!(within_size_limit(10_000_000_000, 0.0));
        assert!(!within_size_limit(10_000_000_000, 1.0));
        assert!(within_size_limit(500_000_000, 1.0));
    }
}
