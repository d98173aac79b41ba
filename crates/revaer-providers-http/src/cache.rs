//! TTL cache for per-template search results, with stale-read support so a
//! background refresh can run without blocking the caller.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use revaer_core::SearchResult;

#[derive(Clone)]
struct Entry {
    results: Vec<SearchResult>,
    inserted_at: Instant,
}

/// A key-value store of cached search results, keyed by `(template, query, page)`.
#[derive(Default)]
pub struct ResultCache {
    table: RwLock<HashMap<(String, String, u32), Entry>>,
}

/// Outcome of a cache lookup.
pub enum CacheLookup {
    /// No entry, or the entry is stale and `allow_stale` was false.
    Miss,
    /// A fresh entry within TTL.
    Fresh(Vec<SearchResult>),
    /// An entry past TTL, returned because `allow_stale` was true; the
    /// caller should schedule a background refresh.
    Stale(Vec<SearchResult>),
}

impl ResultCache {
    /// Construct an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `(template, query, page)`, applying `ttl` and `allow_stale`.
    pub fn get(
        &self,
        template: &str,
        query: &str,
        page: u32,
        ttl: Duration,
        allow_stale: bool,
    ) -> CacheLookup {
        let Ok(table) = self.table.read() else {
            return CacheLookup::Miss;
        };
        let Some(entry) = table.get(&(template.to_string(), query.to_string(), page)) else {
            return CacheLookup::Miss;
        };
        if entry.inserted_at.elapsed() <= ttl {
            CacheLookup::Fresh(entry.results.clone())
        } else if allow_stale {
            CacheLookup::Stale(entry.results.clone())
        } else {
            CacheLookup::Miss
        }
    }

    /// Insert or replace the cached results for `(template, query, page)`.
    pub fn set(&self, template: &str, query: &str, page: u32, results: Vec<SearchResult>) {
        let Ok(mut table) = self.table.write() else {
            return;
        };
        table.insert(
            (template.to_string(), query.to_string(), page),
            Entry {
                results,
                inserted_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SearchResult> {
        vec![SearchResult {
            title: "demo".to_string(),
            link: "https://x/demo.zip".to_string(),
            size: 0,
            seeds: 0,
            leeches: 0,
            source: "HTTP".to_string(),
            infohash: String::new(),
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec!["HTTP".to_string()],
            link_quality: 0.0,
        }]
    }

    #[test]
    fn fresh_entries_return_hit() {
        let cache = ResultCache::new();
        cache.set("tpl", "q", 1, sample());
        match cache.get("tpl", "q", 1, Duration::from_secs(60), false) {
            CacheLookup::Fresh(results) => assert_eq!(results.len(), 1),
            _ => panic!("expected a fresh hit"),
        }
    }

    #[test]
    fn expired_entries_miss_unless_stale_allowed() {
        let cache = ResultCache::new();
        cache.set("tpl", "q", 1, sample());
        match cache.get("tpl", "q", 1, Duration::from_secs(0), false) {
            CacheLookup::Miss => {}
            _ => panic!("expected a miss without stale reads"),
        }
        match cache.get("tpl", "q", 1, Duration::from_secs(0), true) {
            CacheLookup::Stale(results) => assert_eq!(results.len(), 1),
            _ => panic!("expected a stale hit"),
        }
    }
}
