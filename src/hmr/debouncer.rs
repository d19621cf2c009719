use std::path::PathBuf;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tokio::time::Instant;

/// Pending change set plus a single deadline.
///
/// Every change re-arms the deadline; taking the batch clears both.
pub(super) struct Debouncer {
    window: Duration,
    /// Arrival order, deduplicated through `seen`.
    pending: Vec<PathBuf>,
    seen: FxHashSet<PathBuf>,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            seen: FxHashSet::default(),
            deadline: None,
        }
    }

    pub(super) fn add(&mut self, path: PathBuf) {
        if self.seen.insert(path.clone()) {
            self.pending.push(path);
        }
        self.deadline = Some(Instant::now() + self.window);
    }

    /// Drop a path that was unlinked before the deadline.
    pub(super) fn forget(&mut self, path: &PathBuf) {
        if self.seen.remove(path) {
            self.pending.retain(|p| p != path);
        }
        if self.pending.is_empty() {
            self.deadline = None;
        }
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(super) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take the batch, disarming the timer.
    pub(super) fn take(&mut self) -> Vec<PathBuf> {
        self.deadline = None;
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }
}
