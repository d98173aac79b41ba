//! GET-with-retry: bounded attempts with linear backoff, retrying on
//! transport errors and server (5xx) responses.

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::warn;

/// Fetch `url` with up to `retries + 1` attempts, sleeping
/// `backoff * (attempt + 1)` between attempts. Retries on network errors and
/// HTTP 5xx; the final attempt's failure is returned to the caller.
pub async fn get_with_retry(
    client: &Client,
    url: &str,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
) -> Result<Response, String> {
    let mut last_error = String::new();
    for attempt in 0..=retries {
        let attempt_result = client
            .get(url)
            .timeout(timeout)
            .header("User-Agent", "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .send()
            .await;
        match attempt_result {
            Ok(response) if response.status().is_server_error() => {
                last_error = format!("server error: {}", response.status());
                warn!(url, attempt, status = %response.status(), "retryable server error");
            }
            Ok(response) => return Ok(response),
            Err(err) => {
                last_error = err.to_string();
                warn!(url, attempt, error = %err, "request failed");
            }
        }
        if attempt < retries {
            tokio::time::sleep(backoff * (attempt + 1)).await;
        }
    }
    Err(last_error)
}
