//! GET-with-retry, canonicalizing insecure hosts to plain HTTP up front and
//! falling back to HTTP again if an HTTPS attempt hits a TLS error.

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::warn;

use crate::filters::canonicalize_for_fetch;

/// Fetch `url` with up to `retries + 1` attempts and linear backoff,
/// retrying HTTPS-over-a-known-bad-cert hosts over plain HTTP.
pub async fn get_with_retry(
    client: &Client,
    url: &str,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
    insecure_hosts: &[String],
) -> Result<Response, String> {
    let canonical = canonicalize_for_fetch(url, insecure_hosts);
    let mut last_error = String::new();

    for attempt in 0..=retries {
        let attempt_result = client
            .get(&canonical)
            .timeout(timeout)
            .header(
                "User-Agent",
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) revaer/1.0",
            )
            .send()
            .await;
        match attempt_result {
            Ok(response) if response.status().is_success() => return Ok(response),
            Ok(response) => {
                last_error = format!("status {}", response.status());
            }
            Err(err) if err.is_connect() && canonical.starts_with("https://") => {
                let http_url = canonical.replacen("https://", "http://", 1);
                if let Ok(response) = client.get(&http_url).timeout(timeout).send().await {
                    if response.status().is_success() {
                        return Ok(response);
                    }
                }
                last_error = err.to_string();
            }
            Err(err) => {
                last_error = err.to_string();
                warn!(url = %canonical, attempt, error = %err, "open-directory request failed");
            }
        }
        if attempt < retries {
            tokio::time::sleep(backoff * (attempt + 1)).await;
        }
    }
    Err(last_error)
}
