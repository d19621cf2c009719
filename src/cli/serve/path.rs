//! URL to filesystem path resolution over the served directories.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Resolve a request path against each allow-listed root in order.
///
/// Directories resolve to their `index.html`. Anything that escapes its root,
/// through `..` or a symlink, is rejected.
pub fn resolve_path(url_path: &str, served: &[PathBuf]) -> Option<PathBuf> {
    let clean = normalize_url(url_path)?;
    served.iter().find_map(|root| resolve_in(&clean, root))
}

fn resolve_in(clean: &str, serve_root: &Path) -> Option<PathBuf> {
    let local = serve_root.join(clean);

    let canonical = local.canonicalize().ok()?;
    let root_canonical = serve_root.canonicalize().ok()?;
    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    if canonical.is_file() {
        return Some(canonical);
    }

    if canonical.is_dir() {
        let index = canonical.join("index.html");
        if index.is_file() {
            return Some(index);
        }
    }

    None
}

/// Decode, strip the query string and trim slashes. `None` for traversal.
fn normalize_url(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let clean = decoded.trim_matches('/');

    if clean.split(['/', '\\']).any(|segment| segment == "..") {
        return None;
    }
    Some(clean.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn served() -> (TempDir, Vec<PathBuf>) {
        let dir = TempDir::new().unwrap();
        let build = dir.path().join("build");
        let assets = dir.path().join("assets");
        fs::create_dir_all(build.join("docs")).unwrap();
        fs::create_dir_all(&assets).unwrap();
        fs::write(build.join("index.html"), "home").unwrap();
        fs::write(build.join("docs/index.html"), "docs").unwrap();
        fs::write(build.join("app.js"), "js").unwrap();
        fs::write(assets.join("logo.svg"), "<svg/>").unwrap();
        fs::write(dir.path().join("secret.txt"), "no").unwrap();
        (dir, vec![build, assets])
    }

    #[test]
    fn test_resolves_files_and_indexes() {
        let (_dir, roots) = served();
        let file = resolve_path("/app.js?v=2", &roots).unwrap();
        assert!(file.ends_with("build/app.js"));

        let index = resolve_path("/", &roots).unwrap();
        assert!(index.ends_with("build/index.html"));

        let nested = resolve_path("/docs/", &roots).unwrap();
        assert!(nested.ends_with("docs/index.html"));
    }

    #[test]
    fn test_falls_through_to_later_roots() {
        let (_dir, roots) = served();
        let logo = resolve_path("/logo.svg", &roots).unwrap();
        assert!(logo.ends_with("assets/logo.svg"));
        assert_eq!(resolve_path("/missing.css", &roots), None);
    }

    #[test]
    fn test_rejects_traversal() {
        let (_dir, roots) = served();
        assert_eq!(resolve_path("/../secret.txt", &roots), None);
        assert_eq!(resolve_path("/%2e%2e/secret.txt", &roots), None);
        assert_eq!(resolve_path("/docs/../../secret.txt", &roots), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let (dir, roots) = served();
        std::os::unix::fs::symlink(dir.path().join("secret.txt"), roots[0].join("link.txt")).unwrap();
        assert_eq!(resolve_path("/link.txt", &roots), None);
    }
}
