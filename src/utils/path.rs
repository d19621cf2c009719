//! Path normalization and classification helpers.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
///
/// `..` never climbs above the first component.
pub fn lexical_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.parent().is_some() {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Convert a path relative to `root` into a `/`-separated URL path.
///
/// Returns `None` when `path` is not under `root`.
pub fn to_url_path(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    Some(format!("/{}", parts.join("/")))
}

/// Whether a file name belongs to an editor backup, swap file, or dotfile.
///
/// Watch events for these never reach the coordinator.
pub fn is_ignored_name(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with('~')
        || name.starts_with('#')
        || name.ends_with(".swp")
        || name.ends_with(".swx")
        || name.rsplit_once(".tmp").is_some_and(|(_, n)| n.bytes().all(|b| b.is_ascii_digit()))
        || name.contains("___jb_")
        || name.ends_with(".bak")
        || name == "4913"
}

/// Whether any component of `path` is an ignored name.
pub fn is_ignored_path(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(s) => s.to_str().is_some_and(is_ignored_name),
        _ => false,
    })
}
