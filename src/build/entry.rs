//! Entry documents and the asset references they carry.
//!
//! An entry document is one HTML file under the source root. Its relative
//! `<script src>` and `<link rel="stylesheet" href>` references are resolved
//! against the document (or the source root for `/`-prefixed paths) and
//! mirrored into the output root.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jwalk::WalkDir;

use crate::utils::path::{is_ignored_name, lexical_clean, to_url_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Script,
    Style,
}

/// One script or stylesheet referenced by an entry document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRef {
    pub kind: AssetKind,
    /// Attribute value as written in the document.
    pub raw: String,
    pub source: PathBuf,
    pub output: PathBuf,
    /// `type="module"` on the script tag.
    pub is_module: bool,
}

impl AssetRef {
    /// Attribute value pointing at the compiled output.
    ///
    /// Only differs from `raw` when the extension changes (`.ts` → `.js`).
    pub fn rewritten(&self) -> String {
        match (self.source.extension(), self.output.extension()) {
            (Some(src), Some(out)) if src != out => {
                let (path, suffix) = split_suffix(&self.raw);
                let stem = path
                    .strip_suffix(&*src.to_string_lossy())
                    .unwrap_or(path);
                format!("{}{}{}", stem, out.to_string_lossy(), suffix)
            }
            _ => self.raw.clone(),
        }
    }

    /// URL path under which the dev server exposes the output.
    pub fn output_url(&self, output_root: &Path) -> Option<String> {
        to_url_path(&self.output, output_root)
    }
}

/// A crawled HTML entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDocument {
    pub source: PathBuf,
    pub output: PathBuf,
    pub scripts: Vec<AssetRef>,
    pub styles: Vec<AssetRef>,
}

impl EntryDocument {
    pub fn assets(&self) -> impl Iterator<Item = &AssetRef> {
        self.scripts.iter().chain(self.styles.iter())
    }
}

/// Whether `path` is an entry document by extension.
pub fn is_entry(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("html" | "htm")
    )
}

/// Collect every entry document under `source_root`, sorted.
pub fn crawl(source_root: &Path) -> Result<Vec<PathBuf>> {
    if !source_root.is_dir() {
        anyhow::bail!("source directory `{}` does not exist", source_root.display());
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(source_root).skip_hidden(true) {
        let entry = entry.with_context(|| format!("failed to crawl `{}`", source_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        let path = entry.path();
        if !is_ignored_name(name) && is_entry(&path) {
            entries.push(path);
        }
    }
    entries.sort();
    Ok(entries)
}

/// Mirror `source` from the source root into the output root.
///
/// TypeScript sources map to JavaScript outputs. Returns `None` for paths
/// outside the source root.
pub fn output_path(source: &Path, source_root: &Path, output_root: &Path) -> Option<PathBuf> {
    let rel = source.strip_prefix(source_root).ok()?;
    let mut output = output_root.join(rel);
    match output.extension().and_then(|e| e.to_str()) {
        Some("ts") => {
            output.set_extension("js");
        }
        Some("mts") => {
            output.set_extension("mjs");
        }
        _ => {}
    }
    Some(output)
}

/// Resolve a reference written in `document` to a source file.
///
/// Returns `None` for external URLs, protocol-relative and data URLs, and
/// anything that would land outside the source root.
pub fn resolve_reference(raw: &str, document: &Path, source_root: &Path) -> Option<PathBuf> {
    let (path, _) = split_suffix(raw.trim());
    if path.is_empty() || path.starts_with("//") || path.contains(':') {
        return None;
    }

    let resolved = match path.strip_prefix('/') {
        Some(rooted) => source_root.join(rooted),
        None => document.parent()?.join(path),
    };
    let resolved = lexical_clean(&resolved);
    resolved.starts_with(source_root).then_some(resolved)
}

/// Build the reference for `raw` as written in `document`.
pub fn asset_ref(
    kind: AssetKind,
    raw: &str,
    is_module: bool,
    document: &Path,
    source_root: &Path,
    output_root: &Path,
) -> Option<AssetRef> {
    let source = resolve_reference(raw, document, source_root)?;
    let output = output_path(&source, source_root, output_root)?;
    Some(AssetRef {
        kind,
        raw: raw.to_string(),
        source,
        output,
        is_module,
    })
}

/// Split `a.js?v=1#x` into `("a.js", "?v=1#x")`.
fn split_suffix(raw: &str) -> (&str, &str) {
    match raw.find(['?', '#']) {
        Some(i) => raw.split_at(i),
        None => (raw, ""),
    }
}
