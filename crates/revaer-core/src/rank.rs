//! Pure result-set transforms: deduplication, cross-provider aggregation,
//! link quality scoring, and final sort (§4.5.7–§4.5.10). These are pure
//! functions over `Vec<SearchResult>` with no network/concurrency concerns;
//! the coordinator composes them with retry/circuit-breaker/fast-return.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{LinkCandidate, SearchResult};

/// Per-host link-quality bonus for known premium file hosts (§4.5.9).
const HOST_WEIGHTS: &[(&str, i64)] = &[
    ("rapidgator", 22),
    ("nitroflare", 20),
    ("katfile", 17),
    ("ddownload", 17),
    ("turbobit", 14),
    ("uploadgig", 14),
    ("mega.nz", 24),
    ("mediafire", 18),
    ("pixeldrain", 16),
    ("workupload", 12),
];

/// File-archive/installer extensions treated as direct-download quality
/// signals (shared with the HTTP provider's download-link classifier).
pub const ARCHIVE_EXTENSIONS: &[&str] = &[
    ".torrent", ".zip", ".rar", ".7z", ".dmg", ".pkg", ".exe", ".msi", ".deb", ".rpm", ".iso",
    ".apk", ".mpkg",
];

/// Jaccard-similarity threshold above which two content-key stems are
/// considered the same program for aggregation purposes (§4.5.8, §9).
pub const FUZZY_MERGE_THRESHOLD: f64 = 0.50;

const STOP_WORDS: &[&str] = &[
    "x64",
    "x86",
    "win",
    "windows",
    "mac",
    "linux",
    "multilingual",
    "incl",
    "keygen",
    "crack",
    "repack",
    "proper",
    "portable",
    "final",
    "build",
    "adobe",
    "microsoft",
    "corel",
    "apple",
];

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("valid"));
static NON_TOKEN_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9.+]+").expect("valid"));
static YEAR_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"20\d{2}(\.\d+)*").expect("valid"));
static V_PREFIXED_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"v\d+(\.\d+){0,3}").expect("valid"));
static BARE_VERSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+(\.\d+)*").expect("valid"));
static QUALITY_BONUS_TOKENS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)repack|proper|\breal\b").expect("valid"));
static CRACK_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)crack|keygen").expect("valid"));
static RESOLUTION_TOKENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)1080p|4k").expect("valid"));

/// Normalize a title into lowercase whitespace-collapsed tokens, stripping
/// bracketed/parenthesized asides.
fn normalize_title(title: &str) -> String {
    let lower = title.to_lowercase();
    let stripped = BRACKETED.replace_all(&lower, " ");
    let collapsed = NON_TOKEN_CHARS.replace_all(&stripped, " ");
    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Extract a version marker from a normalized title: a year-style version,
/// then a `v`-prefixed version, then a bare `major.minor` version; `"nover"`
/// if none match.
#[must_use]
pub fn extract_version_key(normalized_title: &str) -> String {
    if let Some(m) = YEAR_VERSION.find(normalized_title) {
        return m.as_str().to_string();
    }
    if let Some(m) = V_PREFIXED_VERSION.find(normalized_title) {
        return m.as_str().to_string();
    }
    if let Some(m) = BARE_VERSION.find(normalized_title) {
        return m.as_str().to_string();
    }
    "nover".to_string()
}

/// Compute the `"<stem>|<version>"` content key used to group same-program,
/// same-version results across providers (§4.5.8).
#[must_use]
pub fn content_key(title: &str) -> String {
    let normalized = normalize_title(title);
    let version = extract_version_key(&normalized);
    let without_version = if version == "nover" {
        normalized.clone()
    } else {
        normalized.replacen(&version, "", 1)
    };

    let tokens: Vec<&str> = without_version.split_whitespace().collect();
    let filtered: Vec<&str> = tokens
        .iter()
        .filter(|t| t.parse::<u64>().is_err())
        .filter(|t| !STOP_WORDS.contains(t))
        .copied()
        .collect();

    let stem_tokens: Vec<&str> = if filtered.is_empty() {
        tokens.clone()
    } else {
        filtered.into_iter().take(6).collect()
    };

    format!("{}|{}", stem_tokens.join(" "), version)
}

fn token_set(stem: &str) -> HashSet<&str> {
    stem.split_whitespace().collect()
}

/// Jaccard similarity between two token sets.
fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        #[expect(clippy::cast_precision_loss, reason = "token counts are small")]
        let ratio = intersection as f64 / union as f64;
        ratio
    }
}

/// Title "specificity" used to decide which title survives a merge: longer
/// titles, and titles carrying a year or version marker, are more specific.
#[must_use]
pub fn title_specificity_score(title: &str) -> i64 {
    #[expect(clippy::cast_possible_wrap, reason = "title lengths never approach i64::MAX")]
    let mut score = title.chars().count() as i64;
    if YEAR_VERSION.is_match(title) {
        score += 50;
    }
    if V_PREFIXED_VERSION.is_match(title) {
        score += 30;
    }
    score
}

/// Score a single link candidate (§4.5.9).
#[must_use]
pub fn link_quality(url: &str, seeds: u64, leeches: u64, size: u64) -> i64 {
    if url.starts_with("magnet:") {
        #[expect(clippy::cast_possible_wrap, reason = "seed/leech counts are small")]
        return seeds.min(5000) as i64 + (leeches.min(500) as i64) / 2;
    }

    let lower = url.to_lowercase();
    let mut score: i64 = 0;
    if lower.starts_with("https://") {
        score += 25;
    }
    if ARCHIVE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
        score += 30;
    }
    if ["/file/", "/download/", "/dl/"].iter().any(|p| lower.contains(p)) {
        score += 20;
    }
    for (host, weight) in HOST_WEIGHTS {
        if lower.contains(host) {
            score += weight;
            break;
        }
    }
    #[expect(clippy::cast_possible_wrap, reason = "bounded by the min() below")]
    let size_bonus = (size / 500_000_000).min(15) as i64;
    score += size_bonus;
    score
}

/// Deduplicate a result set by identity (§4.5.7): torrents keyed by
/// infohash (keep the higher-seed entry on collision), everything else keyed
/// by lowercased link falling back to lowercased title (keep the first
/// seen). Output preserves torrent entries before non-torrent entries.
#[must_use]
pub fn dedupe(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut torrents: Vec<SearchResult> = Vec::new();
    let mut torrent_index: HashMap<String, usize> = HashMap::new();
    let mut others: Vec<SearchResult> = Vec::new();
    let mut other_index: HashSet<String> = HashSet::new();

    for result in results {
        if result.is_torrent() {
            let key = result.identity_key();
            if let Some(&idx) = torrent_index.get(&key) {
                if result.seeds > torrents[idx].seeds {
                    torrents[idx] = result;
                }
            } else {
                torrent_index.insert(key, torrents.len());
                torrents.push(result);
            }
        } else {
            let key = result.identity_key();
            if other_index.insert(key) {
                others.push(result);
            }
        }
    }

    torrents.into_iter().chain(others).collect()
}

fn ensure_own_candidate(result: &mut SearchResult) {
    if result.link_candidates.is_empty() && !result.link.is_empty() {
        result.link_candidates.push(LinkCandidate {
            url: result.link.clone(),
            source: result.source.clone(),
            quality: result.link_quality,
            seeds: result.seeds,
            leeches: result.leeches,
            size: result.size,
        });
    }
}

fn merge_link_candidates(base: &mut Vec<LinkCandidate>, incoming: Vec<LinkCandidate>) {
    for candidate in incoming {
        if let Some(existing) = base.iter_mut().find(|c| c.url == candidate.url) {
            if candidate.quality > existing.quality {
                *existing = candidate;
            }
        } else {
            base.push(candidate);
        }
    }
    base.sort_by(|a, b| b.quality.cmp(&a.quality));
}

fn merge_into(base: &mut SearchResult, incoming: SearchResult) {
    for source in &incoming.aggregated_sources {
        if !base.aggregated_sources.contains(source) {
            base.aggregated_sources.push(source.clone());
        }
    }

    merge_link_candidates(&mut base.link_candidates, incoming.link_candidates);

    if let Some(top) = base.link_candidates.first() {
        base.link = top.url.clone();
        base.link_quality = top.quality;
    }

    if incoming.seeds > base.seeds {
        base.seeds = incoming.seeds;
        base.leeches = incoming.leeches;
    }
    if incoming.size > base.size {
        base.size = incoming.size;
    }
    if title_specificity_score(&incoming.title) > title_specificity_score(&base.title) {
        base.title = incoming.title;
    }

    if base.aggregated_sources.len() >= 2 {
        let primary = &base.aggregated_sources[0];
        base.source = format!("{primary} +{}", base.aggregated_sources.len() - 1);
    }
}

/// Merge deduplicated results from distinct providers that represent the
/// same program/version (§4.5.8).
#[must_use]
pub fn aggregate(results: Vec<SearchResult>) -> Vec<SearchResult> {
    // group by exact version first, then fuzzy-merge stems within a version.
    let mut by_version: HashMap<String, Vec<SearchResult>> = HashMap::new();
    for mut result in results {
        ensure_own_candidate(&mut result);
        let key = content_key(&result.title);
        let version = key.rsplit_once('|').map_or("nover", |(_, v)| v).to_string();
        by_version.entry(version).or_default().push(result);
    }

    let mut output = Vec::new();
    for (_version, bucket) in by_version {
        let mut groups: Vec<SearchResult> = Vec::new();
        let mut group_stems: Vec<String> = Vec::new();
        for result in bucket {
            let key = content_key(&result.title);
            let (stem, _v) = key.rsplit_once('|').unwrap_or((key.as_str(), "nover"));
            let stem = stem.to_string();
            let stem_set = token_set(&stem);

            let mut merged = false;
            for (idx, existing_stem) in group_stems.iter().enumerate() {
                let existing_set = token_set(existing_stem);
                if jaccard(&stem_set, &existing_set) >= FUZZY_MERGE_THRESHOLD {
                    merge_into(&mut groups[idx], result.clone());
                    merged = true;
                    break;
                }
            }
            if !merged {
                group_stems.push(stem);
                groups.push(result);
            }
        }
        output.extend(groups);
    }
    output
}

fn extract_version_triplet(title: &str) -> (u64, u64, u64) {
    let Some(m) = BARE_VERSION.find(&title.to_lowercase()) else {
        return (0, 0, 0);
    };
    let parts: Vec<u64> = m
        .as_str()
        .split('.')
        .filter_map(|p| p.parse::<u64>().ok())
        .collect();
    (
        parts.first().copied().unwrap_or(0),
        parts.get(1).copied().unwrap_or(0),
        parts.get(2).copied().unwrap_or(0),
    )
}

fn version_score(title: &str) -> u64 {
    let (major, minor, patch) = extract_version_triplet(title);
    major * 1_000_000 + minor * 1_000 + patch
}

fn quality_bonus(title: &str) -> i64 {
    let mut bonus = 0;
    if QUALITY_BONUS_TOKENS.is_match(title) {
        bonus += 10;
    }
    if CRACK_TOKENS.is_match(title) {
        bonus += 5;
    }
    if RESOLUTION_TOKENS.is_match(title) {
        bonus += 8;
    }
    bonus
}

/// Final sort order (§4.5.10): descending seeds, then link quality, then a
/// version score parsed from the title, then size, then a token-derived
/// quality bonus. Stable on equal keys.
pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.seeds
            .cmp(&a.seeds)
            .then_with(|| b.link_quality.cmp(&a.link_quality))
            .then_with(|| version_score(&b.title).cmp(&version_score(&a.title)))
            .then_with(|| b.size.cmp(&a.size))
            .then_with(|| quality_bonus(&b.title).cmp(&quality_bonus(&a.title)))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, provider: &str, link: &str, seeds: u64) -> SearchResult {
        let infohash = if link.starts_with("magnet:") {
            crate::magnet::extract_infohash(link)
        } else {
            String::new()
        };
        SearchResult {
            title: title.to_string(),
            link: link.to_string(),
            size: 0,
            seeds,
            leeches: 0,
            source: provider.to_string(),
            infohash,
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec![provider.to_string()],
            link_quality: link_quality(link, seeds, 0, 0),
        }
    }

    #[test]
    fn dedupe_keeps_max_seeds_on_collision() {
        let hash = "ABCDEF0123456789ABCDEF0123456789ABCDEF01";
        let magnet = format!("magnet:?xt=urn:btih:{hash}");
        let a = result("Demo", "P1", &magnet, 10);
        let b = result("Demo", "P2", &magnet, 25);
        let deduped = dedupe(vec![a, b]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].seeds, 25);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let hash = "ABCDEF0123456789ABCDEF0123456789ABCDEF01";
        let magnet = format!("magnet:?xt=urn:btih:{hash}");
        let results = vec![result("Demo", "P1", &magnet, 10)];
        let once = dedupe(results.clone());
        let twice = dedupe(once.clone());
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].seeds, twice[0].seeds);
    }

    #[test]
    fn aggregation_merges_same_program_same_version() {
        let r1 = result(
            "Acme Synth 2024 v3.1",
            "P1",
            "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01",
            5,
        );
        let r2 = result("Acme Synth 2024 v3.1 macOS", "P2", "https://mega.nz/file/abc", 0);

        let merged = aggregate(dedupe(vec![r1, r2]));
        assert_eq!(merged.len(), 1);
        let item = &merged[0];
        assert_eq!(item.aggregated_sources, vec!["P1".to_string(), "P2".to_string()]);
        assert_eq!(item.link_candidates.len(), 2);
        assert!(item.link.starts_with("magnet:"));
        assert_eq!(item.source, "P1 +1");
    }

    #[test]
    fn aggregation_keeps_different_versions_separate() {
        let torrent = result(
            "Foo Bar 2023",
            "P1",
            "magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01",
            3,
        );
        let http = result("Foo Bar 2024", "P2", "https://example.com/a.zip", 0);
        let merged = aggregate(dedupe(vec![torrent, http]));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn sort_orders_by_seeds_then_quality() {
        let mut results = vec![
            result("A", "P1", "https://example.com/a.zip", 5),
            result("B", "P1", "https://example.com/b.zip", 50),
        ];
        sort_results(&mut results);
        assert_eq!(results[0].title, "B");
    }

    #[test]
    fn size_parsing_round_trips_for_size_normalization() {
        assert_eq!(crate::size::normalize_size("1.5 GiB"), 1_610_612_736);
    }
}
