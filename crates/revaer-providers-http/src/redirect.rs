//! Redirect-wrapper decoding: turns an anchor's raw `href` into the final
//! absolute URL it actually points at, unwrapping ad-redirect and
//! link-shortener indirection along the way.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use url::Url;

const WRAPPER_QUERY_KEYS: &[&str] = &["url", "u", "target", "to", "r"];
const WRAPPER_SIGNALS: &[&str] = &[
    "/ads/",
    "/go/",
    "/goto/",
    "/redirect",
    "redirect=",
    "url=",
    "target=",
    "out=",
    "href.li/",
];

fn decode_base64_url(token: &str) -> Option<String> {
    let mut padded = token.trim().to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    let bytes = URL_SAFE.decode(padded.as_bytes()).ok()?;
    let decoded = String::from_utf8_lossy(&bytes).trim().to_string();
    if decoded.starts_with("http") || decoded.starts_with("magnet:") {
        Some(decoded)
    } else {
        None
    }
}

fn accept_if_target(value: &str) -> Option<String> {
    let candidate = urlencoding::decode(value).ok()?.into_owned();
    if candidate.starts_with("http") || candidate.starts_with("magnet:") {
        return Some(candidate);
    }
    decode_base64_url(&candidate)
}

/// Does `absolute` still look like it points through a wrapper, after the
/// decode attempts already ran? Used to decide whether a bounded
/// redirect-follow is worth the extra request.
#[must_use]
pub fn looks_like_wrapper(absolute: &str) -> bool {
    let lower = absolute.to_lowercase();
    WRAPPER_SIGNALS.iter().any(|sig| lower.contains(sig))
}

/// Resolve a raw anchor `href` against the page it was found on, then run it
/// through the wrapper-decoding pipeline. Returns the best-effort final URL;
/// callers decide whether a redirect-follow request is warranted via
/// [`looks_like_wrapper`].
#[must_use]
pub fn decode(href: &str, page_url: &str) -> Option<String> {
    let base = Url::parse(page_url).ok()?;
    let resolved = base.join(href).ok()?;
    let mut absolute = resolved.to_string();

    if resolved.path().contains("/ads/") {
        if let Some(segment) = resolved.path_segments().and_then(Iterator::last) {
            if let Some(decoded) = decode_base64_url(segment) {
                return Some(decoded);
            }
        }
    }

    for (key, value) in resolved.query_pairs() {
        if WRAPPER_QUERY_KEYS.contains(&key.as_ref()) {
            if let Some(decoded) = accept_if_target(&value) {
                return Some(decoded);
            }
        }
    }

    if let Some(fragment) = resolved.fragment() {
        if let Ok(frag_url) = Url::parse(&format!("{}?{fragment}", base.as_str())) {
            for (key, value) in frag_url.query_pairs() {
                if WRAPPER_QUERY_KEYS.contains(&key.as_ref()) {
                    if let Some(decoded) = accept_if_target(&value) {
                        return Some(decoded);
                    }
                }
            }
        }
    }

    if let Some(idx) = absolute.find("href.li/?") {
        let tail = &absolute[idx + "href.li/?".len()..];
        if tail.starts_with("http") {
            absolute = tail.to_string();
        }
    }

    Some(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ads_path_segment() {
        let token = URL_SAFE.encode("https://files.example/demo.zip");
        let href = format!("/ads/{token}");
        let decoded = decode(&href, "https://site.example/page").unwrap();
        assert_eq!(decoded, "https://files.example/demo.zip");
    }

    #[test]
    fn decodes_url_query_param() {
        let href = "/go?url=https%3A%2F%2Ffiles.example%2Fdemo.zip";
        let decoded = decode(href, "https://site.example/page").unwrap();
        assert_eq!(decoded, "https://files.example/demo.zip");
    }

    #[test]
    fn unwraps_href_li() {
        let href = "https://href.li/?https://files.example/demo.zip";
        let decoded = decode(href, "https://site.example/page").unwrap();
        assert_eq!(decoded, "https://files.example/demo.zip");
    }

    #[test]
    fn leaves_plain_links_untouched() {
        let href = "/downloads/demo.zip";
        let decoded = decode(href, "https://site.example/page").unwrap();
        assert_eq!(decoded, "https://site.example/downloads/demo.zip");
    }

    #[test]
    fn flags_remaining_wrappers() {
        assert!(looks_like_wrapper("https://site.example/goto/abc"));
        assert!(!looks_like_wrapper("https://files.example/demo.zip"));
    }
}
