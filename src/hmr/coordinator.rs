//! Watch-mode state machine.
//!
//! ```text
//! Idle ─change─> Debouncing ─deadline─> Classifying ─┬─> Patching ──> Idle
//!  │                                                 └─> Rebuilding ─> Idle
//!  ├─add──> Rebuilding
//!  └─unlink─> remove artifact (no rebuild)
//! ```
//!
//! Events that arrive while patching or rebuilding wait in the channel and
//! open the next cycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::classify::{Classification, classify};
use super::debouncer::Debouncer;
use super::prune::remove_artifact;
use super::watcher::FsEvent;
use crate::build::{self, Builder};
use crate::logger::{status_error, status_success, status_warning};
use crate::plugin::HmrInstance;
use crate::reload::{ClientRegistry, HotMessage};
use crate::{debug, log};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Debouncing,
    Classifying,
    Patching,
    Rebuilding,
}

/// The build side the coordinator drives.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Rebuild every entry document.
    async fn rebuild_all(&self);

    /// Delete the artifact produced from an unlinked source.
    async fn remove_artifact(&self, source: &Path);
}

/// [`Pipeline`] backed by the build runner.
pub struct BuildPipeline {
    builder: Builder,
}

impl BuildPipeline {
    pub fn new(builder: Builder) -> Self {
        Self { builder }
    }
}

#[async_trait]
impl Pipeline for BuildPipeline {
    async fn rebuild_all(&self) {
        let config = self.builder.config();
        let entries = match build::crawl(&config.build.source) {
            Ok(entries) => entries,
            Err(e) => {
                status_error("rebuild failed", &format!("{e:#}"));
                return;
            }
        };

        let report = self.builder.build_all(&entries, true).await;
        if report.is_success() {
            status_success(&format!("rebuilt {} documents", report.built.len()));
        } else {
            let detail: Vec<_> = report.failed.iter().map(|(_, message)| message.as_str()).collect();
            status_error(
                &format!("rebuilt {} documents, {} failed", report.built.len(), report.failed.len()),
                &detail.join("\n"),
            );
        }
    }

    async fn remove_artifact(&self, source: &Path) {
        let config = self.builder.config();
        let graph = self.builder.graph();

        let artifact = if build::is_entry(source) {
            graph.forget(source);
            build::output_path(source, &config.build.source, &config.build.output)
        } else {
            graph
                .output_for(source)
                .or_else(|| build::output_path(source, &config.build.source, &config.build.output))
        };
        let Some(artifact) = artifact else {
            return;
        };

        match remove_artifact(&artifact, &config.build.output) {
            Ok(true) => status_warning(&format!("removed {}", artifact.display())),
            Ok(false) => debug!("watch"; "no artifact for {}", source.display()),
            Err(e) => log!("error"; "failed to remove {}: {}", artifact.display(), e),
        }
    }
}

pub struct Coordinator {
    pipeline: Arc<dyn Pipeline>,
    instances: Vec<Arc<dyn HmrInstance>>,
    clients: Arc<ClientRegistry>,
    debouncer: Debouncer,
    phase: Phase,
}

impl Coordinator {
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        instances: Vec<Arc<dyn HmrInstance>>,
        clients: Arc<ClientRegistry>,
        debounce: Duration,
    ) -> Self {
        Self {
            pipeline,
            instances,
            clients,
            debouncer: Debouncer::new(debounce),
            phase: Phase::Idle,
        }
    }

    /// Process events until shutdown or until the event channel closes.
    ///
    /// A batch still pending when the channel closes is flushed first.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<FsEvent>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let deadline = self.debouncer.deadline();
            let timer = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        if !self.debouncer.is_empty() {
                            self.flush().await;
                        }
                        break;
                    }
                },
                () = timer => self.flush().await,
            }
        }
        debug!("watch"; "coordinator stopped");
    }

    pub async fn handle(&mut self, event: FsEvent) {
        match event {
            FsEvent::Add(path) => {
                debug!("watch"; "added {}", path.display());
                // The rebuild covers whatever was pending.
                self.debouncer.take();
                self.rebuild().await;
            }
            FsEvent::Unlink(path) => {
                self.debouncer.forget(&path);
                self.pipeline.remove_artifact(&path).await;
                if self.debouncer.is_empty() {
                    self.set_phase(Phase::Idle);
                }
            }
            FsEvent::Change(path) => {
                self.debouncer.add(path);
                self.set_phase(Phase::Debouncing);
            }
        }
    }

    /// Classify the pending batch and act on it.
    pub async fn flush(&mut self) {
        self.set_phase(Phase::Classifying);
        let batch = self.debouncer.take();
        if batch.is_empty() {
            self.set_phase(Phase::Idle);
            return;
        }

        match classify(batch, &self.instances) {
            Classification::Rebuild(path) => {
                debug!("hmr"; "{} needs a rebuild", path.display());
                self.rebuild().await;
            }
            Classification::Accepted(groups) => {
                self.set_phase(Phase::Patching);
                self.patch(groups).await;
            }
        }
        self.set_phase(Phase::Idle);
    }

    async fn patch(&self, groups: Vec<(usize, Vec<PathBuf>)>) {
        for (index, files) in groups {
            let instance = &self.instances[index];
            debug!("hmr"; "{} takes {} files", instance.name(), files.len());
            if let Err(e) = instance.update(&files).await {
                log!("error"; "hmr `{}` failed: {:#}", instance.name(), e);
            }
        }
    }

    async fn rebuild(&mut self) {
        self.set_phase(Phase::Rebuilding);
        self.pipeline.rebuild_all().await;
        let reached = self.clients.broadcast(&HotMessage::FullReload);
        debug!("hmr"; "full reload sent to {} clients", reached);
        self.set_phase(Phase::Idle);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("watch"; "{:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }
}
