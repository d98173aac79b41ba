//! Magnet URI parsing/synthesis and torrent-reference recognition (§6).

use once_cell::sync::Lazy;
use regex::Regex;
use urlencoding::encode;

static INFOHASH_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)btih:([a-f0-9]{40})").expect("infohash pattern is valid"));

/// Well-known public trackers appended to a synthesized magnet (§6).
pub const PUBLIC_TRACKERS: [&str; 4] = [
    "udp://tracker.opentrackr.org:1337/announce",
    "udp://open.tracker.cl:1337/announce",
    "udp://tracker.torrent.eu.org:451/announce",
    "udp://exodus.desync.com:6969/announce",
];

/// Extract the 40-hex infohash from a magnet URI, uppercased. Returns an
/// empty string if the URI has no `btih:` parameter.
#[must_use]
pub fn extract_infohash(magnet: &str) -> String {
    INFOHASH_PATTERN
        .captures(magnet)
        .map_or_else(String::new, |captures| captures[1].to_uppercase())
}

/// Synthesize a magnet URI from an infohash, display name, and the
/// well-known public tracker list, for API-only torrent indexers that do not
/// expose a native magnet field.
#[must_use]
pub fn synthesize_magnet(infohash: &str, title: &str) -> String {
    let mut magnet = format!("magnet:?xt=urn:btih:{infohash}&dn={}", encode(title));
    for tracker in PUBLIC_TRACKERS {
        magnet.push_str("&tr=");
        magnet.push_str(&encode(tracker));
    }
    magnet
}

/// Whether a direct URL matches a known "torrent reference" pattern that
/// should be routed through the premium-link resolver instead of fetched
/// directly (§4.10, §6).
#[must_use]
pub fn is_torrent_reference(url: &str) -> bool {
    url.ends_with(".torrent")
        || url.contains("/dl.php?t=")
        || url.contains("download.php?id=")
        || url.contains("viewtopic.php?t=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_uppercases_infohash() {
        let magnet = "magnet:?xt=urn:btih:abcdef0123456789abcdef0123456789abcdef01&dn=demo";
        assert_eq!(
            extract_infohash(magnet),
            "ABCDEF0123456789ABCDEF0123456789ABCDEF01"
        );
        assert_eq!(extract_infohash("not a magnet"), "");
    }

    #[test]
    fn synthesizes_magnet_with_public_trackers() {
        let magnet = synthesize_magnet("ABCDEF0123456789ABCDEF0123456789ABCDEF01", "Demo Pack");
        assert!(magnet.starts_with("magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&dn=Demo%20Pack"));
        assert_eq!(magnet.matches("&tr=").count(), PUBLIC_TRACKERS.len());
    }

    #[test]
    fn recognizes_torrent_reference_patterns() {
        assert!(is_torrent_reference("https://x.test/file.torrent"));
        assert!(is_torrent_reference("https://x.test/dl.php?t=123"));
        assert!(is_torrent_reference("https://x.test/download.php?id=5"));
        assert!(is_torrent_reference("https://x.test/viewtopic.php?t=9"));
        assert!(!is_torrent_reference("https://x.test/file.zip"));
    }
}
