//! Typed default document and the three storage tiers the settings service
//! layers together (§4.3).

use std::path::PathBuf;

use serde_json::{Map, Value};

/// Required torrent-index mirror/API URL lists merged into every document on
/// load so user customizations augment, rather than replace, the baseline.
pub const REQUIRED_PIRATEBAY_MIRRORS: &[&str] = &[
    "https://www.piratebay.org",
    "https://tpb.party",
    "https://thepiratebay.zone",
    "https://pirateproxylive.org",
    "https://thepiratebay.org",
];

/// Required API-only mirrors for the `JsonApiIndexProvider` variant.
pub const REQUIRED_PIRATEBAY_APIS: &[&str] = &["https://apibay.org"];

/// Required mirrors for the second torrent-index provider instance.
pub const REQUIRED_X1337_MIRRORS: &[&str] = &[
    "https://1337x.to",
    "https://www.1337x.to",
    "https://1337x.st",
];

/// Required HTTP-scrape URL templates (each must contain the literal
/// `{query}` placeholder).
pub const REQUIRED_HTTP_SOURCE_TEMPLATES: &[&str] = &[
    "http://palined.com/search/?q={query}",
    "https://nmac.to/?s={query}",
    "https://vstorrent.org/?s={query}",
];

/// Required search-engine "dork" templates shared by the HTTP and
/// open-directory providers' discovery steps.
pub const REQUIRED_DISCOVERY_ENGINES: &[&str] = &[
    "https://duckduckgo.com/html/?q={query}",
    "https://www.startpage.com/sp/search?query={query}",
    "https://searx.be/search?q={query}",
];

/// Required open-directory seed URLs.
pub const REQUIRED_OD_SEED_URLS: &[&str] = &[
    "http://suhr.ir/plugin/",
    "https://the-eye.eu/public/",
    "https://www.eyeofjustice.com/od/",
];

/// Required target file extensions for the open-directory crawler.
pub const REQUIRED_OD_FILE_EXTENSIONS: &[&str] = &[
    "zip", "rar", "7z", "dmg", "pkg", "exe", "msi", "iso", "torrent",
];

/// Keys holding required string lists that must always contain the baseline
/// entries above, keyed by the list to merge in.
pub const REQUIRED_URL_LISTS: &[(&str, &[&str])] = &[
    ("piratebay_mirror_order", REQUIRED_PIRATEBAY_MIRRORS),
    ("piratebay_api_endpoints", REQUIRED_PIRATEBAY_APIS),
    ("x1337_mirror_order", REQUIRED_X1337_MIRRORS),
    ("http_sources", REQUIRED_HTTP_SOURCE_TEMPLATES),
    ("http_discovery_engine_templates", REQUIRED_DISCOVERY_ENGINES),
    ("od_seed_urls", REQUIRED_OD_SEED_URLS),
    ("od_engine_templates", REQUIRED_DISCOVERY_ENGINES),
    ("od_file_extensions", REQUIRED_OD_FILE_EXTENSIONS),
];

/// A host whose HTTPS certificate is known-bad; fetches are canonicalized to
/// HTTP for this host (§4.7.2, §9 "generalize the hard-coded host policy").
pub const INSECURE_HOST_REWRITES: &[&str] = &["suhr.ir"];

fn default_download_folder() -> String {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    home.join("Downloads").to_string_lossy().into_owned()
}

/// Build the process-default document (tier 1). Every key a provider or the
/// coordinator reads has a baseline value here.
#[must_use]
pub fn default_document() -> Value {
    let mut enabled_sources = Map::new();
    enabled_sources.insert("torrent-index-a".into(), Value::Bool(false));
    enabled_sources.insert("torrent-index-b".into(), Value::Bool(false));
    enabled_sources.insert("http-scrape".into(), Value::Bool(true));
    enabled_sources.insert("open-directory".into(), Value::Bool(true));
    enabled_sources.insert("indexer-aggregator".into(), Value::Bool(false));
    enabled_sources.insert("cloud-library".into(), Value::Bool(true));

    let mut doc = Map::new();
    doc.insert("pagination_size".into(), Value::from(20));
    doc.insert("min_seeds".into(), Value::from(0));
    doc.insert("size_min_gb".into(), Value::from(0.0));
    doc.insert("size_max_gb".into(), Value::from(100.0));
    doc.insert("enabled_sources".into(), Value::Object(enabled_sources));

    doc.insert(
        "piratebay_mirror_order".into(),
        string_array(REQUIRED_PIRATEBAY_MIRRORS),
    );
    doc.insert(
        "piratebay_api_endpoints".into(),
        string_array(REQUIRED_PIRATEBAY_APIS),
    );
    doc.insert("x1337_mirror_order".into(), string_array(REQUIRED_X1337_MIRRORS));

    doc.insert("http_sources_enabled".into(), Value::Bool(true));
    doc.insert("http_sources".into(), string_array(REQUIRED_HTTP_SOURCE_TEMPLATES));
    doc.insert(
        "http_discovery_engine_templates".into(),
        string_array(REQUIRED_DISCOVERY_ENGINES),
    );
    doc.insert("http_primary_discovery_enabled".into(), Value::Bool(true));
    doc.insert("http_detail_max_pages".into(), Value::from(10));
    doc.insert("http_links_per_detail".into(), Value::from(12));
    doc.insert("http_detail_concurrency".into(), Value::from(3));
    doc.insert("http_time_budget_seconds".into(), Value::from(50.0));
    doc.insert("http_redirect_timeout_seconds".into(), Value::from(8.0));
    doc.insert("http_request_timeout_seconds".into(), Value::from(15.0));
    doc.insert("http_request_retries".into(), Value::from(2));
    doc.insert("http_retry_backoff_seconds".into(), Value::from(0.8));
    doc.insert("http_cache_ttl_seconds".into(), Value::from(300.0));
    doc.insert("http_allow_stale_cache".into(), Value::Bool(true));
    doc.insert("http_background_refresh".into(), Value::Bool(true));
    doc.insert("http_playwright_enabled".into(), Value::Bool(false));
    doc.insert("http_playwright_timeout_seconds".into(), Value::from(20.0));
    doc.insert("http_playwright_expand_dynamic".into(), Value::Bool(true));
    doc.insert("http_playwright_max_expand_cycles".into(), Value::from(4));
    doc.insert("http_source_overrides".into(), Value::Object(Map::new()));

    doc.insert("source_max_retries".into(), Value::from(1));
    doc.insert("source_retry_backoff_seconds".into(), Value::from(0.6));
    doc.insert("source_circuit_failure_threshold".into(), Value::from(4));
    doc.insert("source_circuit_cooldown_seconds".into(), Value::from(90.0));
    doc.insert("source_search_timeout_seconds".into(), Value::from(14.0));
    doc.insert("source_early_return_seconds".into(), Value::from(5.0));
    doc.insert("source_early_return_min_results".into(), Value::from(3));
    doc.insert(
        "source_prefer_completion".into(),
        string_array(&["http-scrape", "open-directory"]),
    );

    doc.insert("open_directory_enabled".into(), Value::Bool(true));
    doc.insert("od_seed_urls".into(), string_array(REQUIRED_OD_SEED_URLS));
    doc.insert("od_use_search_engines".into(), Value::Bool(true));
    doc.insert(
        "od_engine_templates".into(),
        string_array(REQUIRED_DISCOVERY_ENGINES),
    );
    doc.insert(
        "od_file_extensions".into(),
        string_array(REQUIRED_OD_FILE_EXTENSIONS),
    );
    doc.insert("od_max_results".into(), Value::from(40));
    doc.insert("od_max_candidate_pages".into(), Value::from(12));
    doc.insert("od_max_depth".into(), Value::from(2));
    doc.insert("od_max_subdirs_per_page".into(), Value::from(32));
    doc.insert("od_fast_return_min_results".into(), Value::from(6));
    doc.insert("od_fast_return_seconds".into(), Value::from(9.0));
    doc.insert("od_request_timeout_seconds".into(), Value::from(10.0));
    doc.insert("od_request_retries".into(), Value::from(1));
    doc.insert("od_retry_backoff_seconds".into(), Value::from(0.4));
    doc.insert("od_allowed_domains".into(), Value::Array(vec![]));
    doc.insert(
        "od_exclude_patterns".into(),
        string_array(&["/wp-admin/", "/cdn-cgi/"]),
    );
    doc.insert("od_max_file_size_gb".into(), Value::from(0.0));
    doc.insert(
        "od_insecure_hosts".into(),
        string_array(INSECURE_HOST_REWRITES),
    );

    doc.insert("download_folder".into(), Value::from(default_download_folder()));
    doc.insert("max_concurrent_downloads".into(), Value::from(3));
    doc.insert("download_backend".into(), Value::from("native"));

    doc.insert("rd_access_token".into(), Value::from(""));
    doc.insert("rd_refresh_token".into(), Value::from(""));
    doc.insert("rd_client_id".into(), Value::from(""));
    doc.insert("rd_client_secret".into(), Value::from(""));
    doc.insert("rd_sharing_mode".into(), Value::from("profile"));
    doc.insert("rd_request_timeout_seconds".into(), Value::from(12.0));

    doc.insert("indexer_manager_url".into(), Value::from("http://127.0.0.1:9696"));
    doc.insert("indexer_manager_api_key".into(), Value::from(""));
    doc.insert("indexer_manager_timeout_seconds".into(), Value::from(12.0));

    doc.insert("cloud_library_api_base".into(), Value::from(""));
    doc.insert("cloud_library_api_token".into(), Value::from(""));

    Value::Object(doc)
}

fn string_array(values: &[&str]) -> Value {
    Value::Array(values.iter().map(|v| Value::from(*v)).collect())
}

/// Which tier a settings document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Process-wide baseline; never persisted, rebuilt from [`default_document`].
    Process,
    /// Per-user document, keyed by user id.
    User,
    /// Per-profile document, keyed by profile id.
    Profile,
}

impl Tier {
    /// File stem used when persisting this tier (profile/user tiers also
    /// include their scope id in the final file name).
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::User => "user",
            Self::Profile => "profile",
        }
    }
}
