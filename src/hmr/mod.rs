//! Watch mode: filesystem events in, patches or rebuilds out.
//!
//! ```text
//! notify ─> FsWatcher ─FsEvent─> Coordinator ─┬─> HmrInstance::update ─> clients
//!                                             └─> Pipeline::rebuild_all ─> full-reload
//! ```

mod classify;
mod coordinator;
mod debouncer;
mod prune;
mod watcher;

#[cfg(test)]
mod tests;

pub use coordinator::{BuildPipeline, Coordinator, Pipeline};
pub use watcher::{FsEvent, FsWatcher, WatchScope};
