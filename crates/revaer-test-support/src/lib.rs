#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Shared async test fixtures used by more than one crate's test suite: a
//! scripted fake [`Provider`], and a temp-directory helper for settings/
//! download tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use revaer_core::{CoreResult, Provider, SearchResult};

/// A [`Provider`] whose outcomes are scripted up front: each call to
/// `search` pops the next scripted outcome (or returns empty once
/// exhausted).
pub struct ScriptedProvider {
    name: String,
    outcomes: Mutex<Vec<ScriptedOutcome>>,
    call_count: AtomicUsize,
}

/// One scripted response for [`ScriptedProvider::search`].
pub enum ScriptedOutcome {
    /// Return these results successfully.
    Ok(Vec<SearchResult>),
    /// Sleep for the given duration before returning (simulates a slow
    /// provider for fast-return tests), then succeed with these results.
    Delayed(std::time::Duration, Vec<SearchResult>),
    /// Fail the call outright.
    Err(String),
}

impl ScriptedProvider {
    /// Construct a provider named `name` that replays `outcomes` in order.
    #[must_use]
    pub fn new(name: impl Into<String>, outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            name: name.into(),
            outcomes: Mutex::new(outcomes),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Number of times `search` has been invoked so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, _page: u32) -> CoreResult<Vec<SearchResult>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let next = {
            let mut guard = self.outcomes.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if guard.is_empty() {
                None
            } else {
                Some(guard.remove(0))
            }
        };
        match next {
            None => Ok(vec![]),
            Some(ScriptedOutcome::Ok(results)) => Ok(results),
            Some(ScriptedOutcome::Delayed(duration, results)) => {
                tokio::time::sleep(duration).await;
                Ok(results)
            }
            Some(ScriptedOutcome::Err(message)) => {
                Err(revaer_core::CoreError::InvalidRegistration { reason: message })
            }
        }
    }
}

/// A [`tempfile::TempDir`] pre-populated for settings/download tests, kept
/// alive for the duration of the returned guard.
#[must_use]
pub fn temp_root() -> tempfile::TempDir {
    tempfile::tempdir().expect("failed to create temp dir for test fixture")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_provider_replays_in_order() {
        let provider = ScriptedProvider::new(
            "demo",
            vec![ScriptedOutcome::Err("boom".into()), ScriptedOutcome::Ok(vec![])],
        );
        assert!(provider.search("q", 1).await.is_err());
        assert!(provider.search("q", 1).await.unwrap().is_empty());
        assert_eq!(provider.call_count(), 2);
    }
}
