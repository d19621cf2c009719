use std::io;
use std::path::Path;

use crate::debug;

/// Delete `artifact` (and its source map), then every ancestor directory
/// left empty, stopping below `build_root`.
///
/// Returns whether the artifact existed.
pub fn remove_artifact(artifact: &Path, build_root: &Path) -> io::Result<bool> {
    if !artifact.starts_with(build_root) || artifact == build_root {
        return Ok(false);
    }

    let existed = match std::fs::remove_file(artifact) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };
    let mut map = artifact.as_os_str().to_owned();
    map.push(".map");
    let _ = std::fs::remove_file(&map);

    if let Some(parent) = artifact.parent() {
        prune_empty_dirs(parent, build_root);
    }
    Ok(existed)
}

/// Remove empty directories from `dir` upward. `root` itself always stays.
fn prune_empty_dirs(dir: &Path, root: &Path) {
    let mut current = dir;
    while current.starts_with(root) && current != root {
        let is_empty = std::fs::read_dir(current).is_ok_and(|mut entries| entries.next().is_none());
        if !is_empty || std::fs::remove_dir(current).is_err() {
            break;
        }
        debug!("watch"; "pruned {}", current.display());
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
}
