//! Search-result cache: an LRU map keyed by `(query, page, filter
//! signature)` with a per-entry TTL (§4.5.11).
//!
//! Grounded on `source_manager.py::SearchCache` (an `OrderedDict` LRU with a
//! wall-clock TTL); this repo keeps the same capacity/TTL defaults.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use revaer_core::SearchResult;

/// Default maximum number of cached pages.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default time-to-live for a cached page, in seconds.
pub const DEFAULT_TTL_SECONDS: i64 = 300;

struct Entry {
    results: Vec<SearchResult>,
    total: usize,
    inserted_at: DateTime<Utc>,
}

/// Build the cache key for a `(query, page, filter signature)` triple.
#[must_use]
pub fn cache_key(query: &str, page: u32, filter_signature: &str) -> String {
    format!("{query}|{page}|{filter_signature}")
}

/// LRU search-result cache. Entries are ordered oldest-first; a hit moves
/// its entry to the end.
pub struct SearchCache {
    capacity: usize,
    ttl_seconds: i64,
    entries: Mutex<Vec<(String, Entry)>>,
}

impl SearchCache {
    /// Construct a cache with the given capacity and TTL.
    #[must_use]
    pub fn new(capacity: usize, ttl_seconds: i64) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl_seconds,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Look up `key`, returning `(results, total)` if present and fresh.
    /// An expired entry is evicted on lookup.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<(Vec<SearchResult>, usize)> {
        let mut entries = self.lock();
        let idx = entries.iter().position(|(k, _)| k == key)?;
        let age = Utc::now() - entries[idx].1.inserted_at;
        if age.num_seconds() >= self.ttl_seconds {
            entries.remove(idx);
            return None;
        }
        let (key_owned, entry) = entries.remove(idx);
        let snapshot = (entry.results.clone(), entry.total);
        entries.push((key_owned, entry));
        Some(snapshot)
    }

    /// Insert or refresh `key`, evicting the oldest entry once over
    /// capacity.
    pub fn set(&self, key: String, results: Vec<SearchResult>, total: usize) {
        let mut entries = self.lock();
        if let Some(idx) = entries.iter().position(|(k, _)| *k == key) {
            entries.remove(idx);
        }
        entries.push((
            key,
            Entry {
                results,
                total,
                inserted_at: Utc::now(),
            },
        ));
        while entries.len() > self.capacity {
            entries.remove(0);
        }
    }

    /// Drop every cached entry (called after a provider enable-state
    /// reload).
    pub fn invalidate_all(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, Entry)>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<SearchResult> {
        vec![SearchResult {
            title: "Demo".into(),
            link: "https://example.com/demo.zip".into(),
            size: 0,
            seeds: 0,
            leeches: 0,
            source: "P1".into(),
            infohash: String::new(),
            category: None,
            upload_date: None,
            link_candidates: vec![],
            aggregated_sources: vec!["P1".into()],
            link_quality: 0,
        }]
    }

    #[test]
    fn hit_moves_entry_to_most_recently_used() {
        let cache = SearchCache::new(2, 300);
        cache.set("a".into(), sample(), 1);
        cache.set("b".into(), sample(), 1);
        assert!(cache.get("a").is_some());
        cache.set("c".into(), sample(), 1);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
    }

    #[test]
    fn expired_entry_is_evicted_on_lookup() {
        let cache = SearchCache::new(10, -1);
        cache.set("a".into(), sample(), 1);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn invalidate_all_clears_the_table() {
        let cache = SearchCache::new(10, 300);
        cache.set("a".into(), sample(), 1);
        cache.invalidate_all();
        assert!(cache.get("a").is_none());
    }
}
