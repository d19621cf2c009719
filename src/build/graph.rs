//! Which source files feed which artifacts.
//!
//! Refreshed every time a document is built. HMR instances consult it to
//! decide whether a changed file is something they can patch in place.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::entry::{AssetKind, AssetRef, EntryDocument};

#[derive(Default)]
pub struct AssetGraph {
    /// Document source → references found in its last build.
    documents: RwLock<FxHashMap<PathBuf, Vec<AssetRef>>>,
}

impl AssetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the references recorded for one document.
    pub fn record(&self, document: &EntryDocument) {
        self.documents
            .write()
            .insert(document.source.clone(), document.assets().cloned().collect());
    }

    pub fn forget(&self, document: &Path) {
        self.documents.write().remove(document);
    }

    /// The reference for `source` of the given kind, from any document.
    pub fn find(&self, source: &Path, kind: AssetKind) -> Option<AssetRef> {
        self.documents
            .read()
            .values()
            .flatten()
            .find(|r| r.kind == kind && r.source == source)
            .cloned()
    }

    /// Documents whose last build referenced `source`.
    #[cfg(test)]
    pub fn documents_using(&self, source: &Path) -> Vec<PathBuf> {
        let mut docs: Vec<_> = self
            .documents
            .read()
            .iter()
            .filter(|(_, refs)| refs.iter().any(|r| r.source == source))
            .map(|(doc, _)| doc.clone())
            .collect();
        docs.sort();
        docs
    }

    /// Output artifact for a source file, whether a document or an asset.
    pub fn output_for(&self, source: &Path) -> Option<PathBuf> {
        self.documents
            .read()
            .values()
            .flatten()
            .find(|r| r.source == source)
            .map(|r| r.output.clone())
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }
}
