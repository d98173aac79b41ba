//! Download-link classification and gated-content detection.

const DOWNLOAD_EXTENSIONS: &[&str] = &[
    ".torrent", ".zip", ".rar", ".7z", ".dmg", ".pkg", ".exe", ".msi", ".deb", ".rpm", ".iso",
    ".apk", ".mpkg",
];

const FILE_HOST_SUBSTRINGS: &[&str] = &[
    "mega.nz",
    "mediafire.com",
    "drive.google.com",
    "1fichier.com",
    "rapidgator.net",
    "uploaded.net",
    "zippyshare.com",
    "dropbox.com",
];

const PATH_INDICATORS: &[&str] = &["/download", "/dl/", "/get/", "/file/", "/attachment/"];
const QUERY_INDICATORS: &[&str] = &["download=1", "attachment=", "filename=", "file=", "torrent="];

const REJECT_SUBSTRINGS: &[&str] = &[
    "/affiliate",
    "/login",
    "/register",
    "/privacy",
    "/terms",
    "/about",
    "/contact",
];

/// Is `url` likely to deliver a file directly, per the shared heuristics?
#[must_use]
pub fn is_download_like(url: &str) -> bool {
    if url.starts_with("magnet:") {
        return true;
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return false;
    }
    let lower = url.to_lowercase();
    if REJECT_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return false;
    }
    DOWNLOAD_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        || FILE_HOST_SUBSTRINGS.iter().any(|host| lower.contains(host))
        || PATH_INDICATORS.iter().any(|path| lower.contains(path))
        || QUERY_INDICATORS.iter().any(|q| lower.contains(q))
}

const GATED_PHRASES: &[&str] = &[
    "click to show download links",
    "show download links",
    "links are hidden",
    "you must be registered",
    "login to view links",
    "guest cannot",
    "captcha",
    "recaptcha",
];

/// Scan lowercased page text for phrases indicating the download links are
/// gated behind a login/captcha wall. Returns a human-readable message when
/// one is found.
#[must_use]
pub fn detect_gated(page_text_lower: &str) -> Option<String> {
    GATED_PHRASES
        .iter()
        .find(|phrase| page_text_lower.contains(**phrase))
        .map(|_| {
            "HTTP source appears gated (captcha/login), so download links may be hidden."
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_magnets_and_archive_extensions() {
        assert!(is_download_like("magnet:?xt=urn:btih:ABC"));
        assert!(is_download_like("https://files.example/demo.zip"));
        assert!(is_download_like("https://mega.nz/file/abc"));
        assert!(is_download_like("https://site.example/download/abc"));
        assert!(is_download_like("https://site.example/get?download=1"));
    }

    #[test]
    fn rejects_unrelated_and_excluded_paths() {
        assert!(!is_download_like("https://site.example/about"));
        assert!(!is_download_like("https://site.example/login"));
        assert!(!is_download_like("ftp://site.example/demo.zip"));
    }

    #[test]
    fn detects_gated_phrases() {
        assert!(detect_gated("you must be registered to view this content").is_some());
        assert!(detect_gated("a normal page with no gate").is_none());
    }
}
