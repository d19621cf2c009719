//! `Content-Type` values for served files.

use std::path::Path;

pub mod types {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const CSS: &str = "text/css; charset=utf-8";
    pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
    pub const JSON: &str = "application/json";
}

const FALLBACK: &str = "application/octet-stream";

/// Extensions a site or extension build commonly ships. Scripts and
/// stylesheets are served compiled, so source dialects map to their output.
const TABLE: &[(&[&str], &str)] = &[
    (&["html", "htm"], types::HTML),
    (&["css", "scss"], types::CSS),
    (&["js", "mjs", "cjs", "ts", "mts", "tsx", "jsx"], types::JAVASCRIPT),
    (&["json", "map", "webmanifest"], types::JSON),
    (&["txt"], types::PLAIN),
    (&["xml"], "application/xml"),
    (&["svg"], "image/svg+xml"),
    (&["png"], "image/png"),
    (&["jpg", "jpeg"], "image/jpeg"),
    (&["gif"], "image/gif"),
    (&["webp"], "image/webp"),
    (&["avif"], "image/avif"),
    (&["ico"], "image/x-icon"),
    (&["woff"], "font/woff"),
    (&["woff2"], "font/woff2"),
    (&["ttf"], "font/ttf"),
    (&["otf"], "font/otf"),
    (&["mp3"], "audio/mpeg"),
    (&["mp4"], "video/mp4"),
    (&["webm"], "video/webm"),
    (&["wasm"], "application/wasm"),
    (&["zip", "xpi"], "application/zip"),
];

pub fn from_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FALLBACK;
    };
    let ext = ext.to_ascii_lowercase();
    TABLE
        .iter()
        .find(|(exts, _)| exts.contains(&ext.as_str()))
        .map_or(FALLBACK, |(_, mime)| *mime)
}

/// Like [`from_path`], for a request path that may carry `?query` or `#hash`.
pub fn from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    from_path(Path::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path() {
        assert_eq!(from_path(Path::new("index.html")), types::HTML);
        assert_eq!(from_path(Path::new("popup/main.ts")), types::JAVASCRIPT);
        assert_eq!(from_path(Path::new("LOGO.PNG")), "image/png");
        assert_eq!(from_path(Path::new("manifest.json")), types::JSON);
        assert_eq!(from_path(Path::new("Makefile")), FALLBACK);
        assert_eq!(from_path(Path::new("data.xyz")), FALLBACK);
    }

    #[test]
    fn test_from_url_ignores_query() {
        assert_eq!(from_url("/@lumen/client.js?t=1"), types::JAVASCRIPT);
        assert_eq!(from_url("/@lumen/extensions.json#x"), types::JSON);
        assert_eq!(from_url("/"), FALLBACK);
    }
}
