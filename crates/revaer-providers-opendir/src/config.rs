//! Configuration surface for [`crate::OpenDirectoryProvider`].

use std::time::Duration;

/// Tunables the coordinator binds from settings before constructing the
/// provider (§4.7.1).
#[derive(Debug, Clone)]
pub struct OpenDirConfig {
    /// Whether this provider runs at all.
    pub enabled: bool,
    /// Seed root directory URLs, crawled before any search-engine discovery.
    pub seed_urls: Vec<String>,
    /// Whether to fall back to search-engine discovery when seeds are thin.
    pub use_search_engines: bool,
    /// Search-engine templates containing the literal `{query}`.
    pub engine_templates: Vec<String>,
    /// File extensions (without a leading dot) treated as download-worthy.
    pub file_extensions: Vec<String>,
    /// Hard cap on the number of results returned.
    pub max_results: usize,
    /// Maximum discovered candidate pages to crawl from search engines.
    pub max_candidate_pages: usize,
    /// Maximum recursion depth below a seed/candidate root.
    pub max_depth: u32,
    /// Maximum subdirectories followed per listing page.
    pub max_subdirs_per_page: usize,
    /// Minimum result count that allows an early return once the deadline passes.
    pub fast_return_min_results: usize,
    /// Wall-clock budget, from search start, before fast-return applies.
    pub fast_return_seconds: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Extra attempts beyond the first for each request.
    pub request_retries: u32,
    /// Base backoff between retry attempts.
    pub retry_backoff: Duration,
    /// If non-empty, only these hosts (or their subdomains) are crawled.
    pub allowed_domains: Vec<String>,
    /// URL substrings that are always rejected.
    pub exclude_patterns: Vec<String>,
    /// Maximum file size, in GiB; `0.0` means unlimited.
    pub max_file_size_gb: f64,
    /// Hosts that should be retried over plain HTTP when TLS fails, and
    /// rewritten to `http://` up front for known-bad certificates.
    pub insecure_hosts: Vec<String>,
}

impl Default for OpenDirConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            seed_urls: vec!["http://suhr.ir/plugin/".to_string()],
            use_search_engines: true,
            engine_templates: vec!["https://duckduckgo.com/html/?q={query}".to_string()],
            file_extensions: vec![
                "zip".to_string(),
                "rar".to_string(),
                "7z".to_string(),
                "dmg".to_string(),
                "pkg".to_string(),
                "exe".to_string(),
                "msi".to_string(),
                "iso".to_string(),
            ],
            max_results: 40,
            max_candidate_pages: 12,
            max_depth: 1,
            max_subdirs_per_page: 8,
            fast_return_min_results: 6,
            fast_return_seconds: Duration::from_secs_f64(9.0),
            request_timeout: Duration::from_secs(10),
            request_retries: 1,
            retry_backoff: Duration::from_millis(400),
            allowed_domains: vec![],
            exclude_patterns: vec![],
            max_file_size_gb: 0.0,
            insecure_hosts: vec!["suhr.ir".to_string()],
        }
    }
}
