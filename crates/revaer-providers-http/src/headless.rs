//! Headless-browser fallback contract (§4.6.7): re-fetch a page through a
//! JS-rendering runtime when the plain HTTP fetch yields nothing. No real
//! browser-automation crate is vendored here; the trait lets a caller plug
//! one in, while [`UnavailableFallback`] models the common case where the
//! runtime binary was never installed and the fallback auto-disables.

use async_trait::async_trait;

/// Bounds for one headless-browser fetch attempt.
#[derive(Debug, Clone, Copy)]
pub struct HeadlessFetchOptions {
    /// Total navigation timeout, in milliseconds.
    pub timeout_ms: u64,
    /// Whether to run the bounded dynamic-expansion loop after navigation.
    pub expand_dynamic: bool,
    /// Maximum load-more/scroll cycles in the expansion loop.
    pub max_expand_cycles: u32,
}

/// A source of JS-rendered HTML for pages a plain GET can't parse.
#[async_trait]
pub trait HeadlessFallback: Send + Sync {
    /// Is the runtime installed and ready to serve fetches right now?
    fn is_ready(&self) -> bool;

    /// Render `url` and return its final HTML plus the URL it settled on
    /// after any client-side redirects.
    async fn fetch_html(&self, url: &str, options: HeadlessFetchOptions) -> Result<(String, String), String>;
}

/// Fallback implementation for when no browser runtime is configured: always
/// reports itself unready, so callers skip straight past it.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableFallback;

#[async_trait]
impl HeadlessFallback for UnavailableFallback {
    fn is_ready(&self) -> bool {
        false
    }

    async fn fetch_html(&self, _url: &str, _options: HeadlessFetchOptions) -> Result<(String, String), String> {
        Err("headless browser runtime is not configured for this process".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_fallback_refuses_to_fetch() {
        let fallback = UnavailableFallback;
        assert!(!fallback.is_ready());
        let result = fallback
            .fetch_html(
                "https://example.test",
                HeadlessFetchOptions {
                    timeout_ms: 1000,
                    expand_dynamic: true,
                    max_expand_cycles: 2,
                },
            )
            .await;
        assert!(result.is_err());
    }
}
