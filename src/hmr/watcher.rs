//! Filesystem watcher.
//!
//! Translates raw notify events into `add` / `change` / `unlink` for the
//! coordinator. Editor artifacts, dotfiles, and anything under the output
//! directory are dropped here. Metadata-only modifications are dropped too;
//! they would otherwise feed endless rebuild loops.

use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::utils::path::is_ignored_path;

/// A filesystem change relevant to the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Add(PathBuf),
    Change(PathBuf),
    Unlink(PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Add(p) | Self::Change(p) | Self::Unlink(p) => p,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Change(_) => "change",
            Self::Unlink(_) => "unlink",
        }
    }
}

/// Paths the watcher reports on.
#[derive(Debug, Clone)]
pub struct WatchScope {
    /// Watched roots. Ignore rules apply to paths relative to these.
    pub roots: Vec<PathBuf>,
    /// Subtrees never reported (the build output).
    pub excluded: Vec<PathBuf>,
}

impl WatchScope {
    fn admits(&self, path: &Path) -> bool {
        if self.excluded.iter().any(|dir| path.starts_with(dir)) {
            return false;
        }
        match self.roots.iter().find_map(|root| path.strip_prefix(root).ok()) {
            Some(rel) => !rel.as_os_str().is_empty() && !is_ignored_path(rel),
            None => false,
        }
    }
}

/// Live notify watcher. Events stop when this is dropped.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Start watching `scope.roots` recursively, sending events to `tx`.
    pub fn start(scope: WatchScope, tx: mpsc::UnboundedSender<FsEvent>) -> notify::Result<Self> {
        let roots = scope.roots.clone();
        let mut translator = Translator::seeded(scope);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                for fs_event in translator.translate(&event) {
                    crate::debug!("watch"; "{} {}", fs_event.label(), fs_event.path().display());
                    let _ = tx.send(fs_event);
                }
            }
            Err(e) => crate::log!("watch"; "notify error: {}", e),
        })?;

        for root in roots.iter().filter(|root| root.exists()) {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }
        Ok(Self { _watcher: watcher })
    }
}

/// Maps notify events to build events, remembering which files exist.
///
/// Editors that save atomically write a temp file and rename it over the
/// target. The rename lands on a path already known here, so it is reported
/// as `change` rather than `add`.
pub struct Translator {
    scope: WatchScope,
    known: FxHashSet<PathBuf>,
}

impl Translator {
    pub fn new(scope: WatchScope) -> Self {
        Self {
            scope,
            known: FxHashSet::default(),
        }
    }

    /// Start out knowing every file already under the roots.
    pub fn seeded(scope: WatchScope) -> Self {
        let mut translator = Self::new(scope);
        let files: Vec<PathBuf> = translator
            .scope
            .roots
            .iter()
            .flat_map(|root| WalkDir::new(root).skip_hidden(false))
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.path())
            .collect();
        for file in files {
            translator.remember(file);
        }
        translator
    }

    fn remember(&mut self, path: PathBuf) {
        if self.scope.admits(&path) {
            self.known.insert(path);
        }
    }

    /// Map one notify event to zero or more build events.
    pub fn translate(&mut self, event: &notify::Event) -> Vec<FsEvent> {
        let mapped: Vec<FsEvent> = match event.kind {
            EventKind::Create(_) => event.paths.iter().cloned().map(FsEvent::Add).collect(),
            EventKind::Remove(_) => event.paths.iter().cloned().map(FsEvent::Unlink).collect(),
            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
            EventKind::Modify(ModifyKind::Name(mode)) => rename(mode, &event.paths),
            EventKind::Modify(_) => event
                .paths
                .iter()
                .filter(|p| !p.is_dir())
                .cloned()
                .map(FsEvent::Change)
                .collect(),
            _ => Vec::new(),
        };

        let mut events = Vec::with_capacity(mapped.len());
        for event in mapped {
            if !self.scope.admits(event.path()) {
                continue;
            }
            events.push(match event {
                FsEvent::Add(path) => {
                    if self.known.insert(path.clone()) {
                        FsEvent::Add(path)
                    } else {
                        FsEvent::Change(path)
                    }
                }
                FsEvent::Change(path) => {
                    self.known.insert(path.clone());
                    FsEvent::Change(path)
                }
                FsEvent::Unlink(path) => {
                    self.known.remove(&path);
                    FsEvent::Unlink(path)
                }
            });
        }
        events
    }
}

/// Renames are `unlink` of the old path plus `add` of the new one, before
/// the known-file check.
fn rename(mode: RenameMode, paths: &[PathBuf]) -> Vec<FsEvent> {
    match (mode, paths) {
        (RenameMode::Both, [from, to]) => vec![FsEvent::Unlink(from.clone()), FsEvent::Add(to.clone())],
        (RenameMode::From, _) => paths.iter().cloned().map(FsEvent::Unlink).collect(),
        (RenameMode::To, _) => paths.iter().cloned().map(FsEvent::Add).collect(),
        // Platforms that do not say which side of the rename this is
        _ => paths
            .iter()
            .map(|p| {
                if p.exists() {
                    FsEvent::Add(p.clone())
                } else {
                    FsEvent::Unlink(p.clone())
                }
            })
            .collect(),
    }
}
