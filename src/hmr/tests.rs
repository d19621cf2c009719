//! Coordinator scenarios with recording fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use crossbeam::channel::{Receiver, unbounded};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::*;
use crate::build::Builder;
use crate::plugin::tests::{FakeToolchain, context_with};
use crate::plugin::{HmrInstance, PluginHost};
use crate::reload::{ClientRegistry, EventBus};

const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Default)]
struct RecordingPipeline {
    rebuilds: Mutex<usize>,
    removed: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Pipeline for RecordingPipeline {
    async fn rebuild_all(&self) {
        *self.rebuilds.lock() += 1;
    }

    async fn remove_artifact(&self, source: &Path) {
        self.removed.lock().push(source.to_path_buf());
    }
}

/// Accepts paths by extension and records every update call.
struct RecordingInstance {
    name: &'static str,
    extension: &'static str,
    fail: bool,
    updates: Mutex<Vec<Vec<PathBuf>>>,
}

impl RecordingInstance {
    fn new(name: &'static str, extension: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            extension,
            fail: false,
            updates: Mutex::default(),
        })
    }

    fn failing(name: &'static str, extension: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            extension,
            fail: true,
            updates: Mutex::default(),
        })
    }

    fn updates(&self) -> Vec<Vec<PathBuf>> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl HmrInstance for RecordingInstance {
    fn name(&self) -> &str {
        self.name
    }

    fn accept(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == self.extension)
    }

    async fn update(&self, files: &[PathBuf]) -> Result<()> {
        self.updates.lock().push(files.to_vec());
        if self.fail {
            bail!("{} exploded", self.name);
        }
        Ok(())
    }
}

struct Harness {
    pipeline: Arc<RecordingPipeline>,
    events: mpsc::UnboundedSender<FsEvent>,
    client: Receiver<String>,
    _shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Harness {
    fn start(instances: Vec<Arc<dyn HmrInstance>>) -> Self {
        let pipeline = Arc::new(RecordingPipeline::default());
        let clients = Arc::new(ClientRegistry::new(Arc::new(EventBus::new())));
        let (client_tx, client) = unbounded();
        clients.register(client_tx);

        let coordinator = Coordinator::new(
            Arc::clone(&pipeline) as Arc<dyn Pipeline>,
            instances,
            clients,
            DEBOUNCE,
        );
        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(coordinator.run(events_rx, shutdown_rx));
        Self {
            pipeline,
            events,
            client,
            _shutdown: shutdown,
            task,
        }
    }

    fn change(&self, path: &str) {
        self.events.send(FsEvent::Change(path.into())).unwrap();
    }

    fn rebuilds(&self) -> usize {
        *self.pipeline.rebuilds.lock()
    }

    fn messages(&self) -> Vec<String> {
        self.client.try_iter().collect()
    }

    async fn stop(self) -> Arc<RecordingPipeline> {
        drop(self.events);
        self.task.await.unwrap();
        self.pipeline
    }
}

fn paths(list: &[&str]) -> Vec<PathBuf> {
    list.iter().map(PathBuf::from).collect()
}

async fn wait(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_changes_within_window_coalesce_into_one_pass() {
    let css = RecordingInstance::new("css", "css");
    let harness = Harness::start(vec![css.clone()]);

    harness.change("/s/a.css");
    wait(100).await;
    harness.change("/s/b.css");
    wait(100).await;
    harness.change("/s/a.css");
    wait(150).await;
    assert!(css.updates().is_empty(), "deadline must move with every change");

    wait(100).await;
    assert_eq!(css.updates(), vec![paths(&["/s/a.css", "/s/b.css"])]);
    assert_eq!(harness.rebuilds(), 0);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_accepted_batch_reaches_only_claiming_instances() {
    let css = RecordingInstance::new("css", "css");
    let script = RecordingInstance::new("script", "js");
    let idle = RecordingInstance::new("svg", "svg");
    let harness = Harness::start(vec![css.clone(), script.clone(), idle.clone()]);

    harness.change("/s/b.js");
    harness.change("/s/a.css");
    harness.change("/s/c.css");
    wait(300).await;

    assert_eq!(css.updates(), vec![paths(&["/s/a.css", "/s/c.css"])]);
    assert_eq!(script.updates(), vec![paths(&["/s/b.js"])]);
    assert!(idle.updates().is_empty());
    assert_eq!(harness.rebuilds(), 0);
    assert!(harness.messages().is_empty());
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_first_accepting_instance_claims_the_path() {
    let first = RecordingInstance::new("first", "css");
    let second = RecordingInstance::new("second", "css");
    let harness = Harness::start(vec![first.clone(), second.clone()]);

    harness.change("/s/a.css");
    wait(300).await;
    assert_eq!(first.updates().len(), 1);
    assert!(second.updates().is_empty());
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unaccepted_path_rebuilds_whole_batch() {
    let css = RecordingInstance::new("css", "css");
    let harness = Harness::start(vec![css.clone()]);

    harness.change("/s/a.css");
    harness.change("/s/index.html");
    harness.change("/s/b.css");
    wait(300).await;

    assert!(css.updates().is_empty());
    assert_eq!(harness.rebuilds(), 1);
    assert_eq!(harness.messages(), vec![r#"{"type":"full-reload"}"#.to_string()]);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_instance_does_not_block_others() {
    let broken = RecordingInstance::failing("broken", "css");
    let script = RecordingInstance::new("script", "js");
    let harness = Harness::start(vec![broken.clone(), script.clone()]);

    harness.change("/s/a.css");
    harness.change("/s/b.js");
    wait(300).await;

    assert_eq!(broken.updates().len(), 1);
    assert_eq!(script.updates(), vec![paths(&["/s/b.js"])]);
    assert_eq!(harness.rebuilds(), 0);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_add_rebuilds_without_waiting() {
    let harness = Harness::start(Vec::new());
    harness.events.send(FsEvent::Add("/s/new.html".into())).unwrap();
    wait(1).await;
    assert_eq!(harness.rebuilds(), 1);
    assert_eq!(harness.messages(), vec![r#"{"type":"full-reload"}"#.to_string()]);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_unlink_removes_artifact_without_rebuild() {
    let css = RecordingInstance::new("css", "css");
    let harness = Harness::start(vec![css.clone()]);

    harness.change("/s/a.css");
    harness.events.send(FsEvent::Unlink("/s/a.css".into())).unwrap();
    wait(300).await;

    assert!(css.updates().is_empty(), "unlinked path leaves the pending set");
    let pipeline = harness.stop().await;
    assert_eq!(*pipeline.removed.lock(), paths(&["/s/a.css"]));
    assert_eq!(*pipeline.rebuilds.lock(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_changes_during_patch_open_a_new_cycle() {
    let css = RecordingInstance::new("css", "css");
    let harness = Harness::start(vec![css.clone()]);

    harness.change("/s/a.css");
    wait(300).await;
    harness.change("/s/b.css");
    wait(300).await;

    assert_eq!(css.updates(), vec![paths(&["/s/a.css"]), paths(&["/s/b.css"])]);
    harness.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_pending_batch_flushed_when_events_close() {
    let css = RecordingInstance::new("css", "css");
    let harness = Harness::start(vec![css.clone()]);
    harness.change("/s/a.css");
    harness.stop().await;
    assert_eq!(css.updates(), vec![paths(&["/s/a.css"])]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_loop() {
    let harness = Harness::start(Vec::new());
    harness._shutdown.send(true).unwrap();
    harness.task.await.unwrap();
}

// ============================================================================
// End to end: real builder, built-in plugins, fake compilers
// ============================================================================

struct Site {
    dir: TempDir,
    ctx: crate::plugin::PluginContext,
    toolchain: Arc<FakeToolchain>,
    client: Receiver<String>,
    events: mpsc::UnboundedSender<FsEvent>,
    _shutdown: watch::Sender<bool>,
}

impl Site {
    async fn start() -> Self {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(
            src.join("index.html"),
            r#"<html><head><link rel="stylesheet" href="a.css"></head><body></body></html>"#,
        )
        .unwrap();
        std::fs::write(
            src.join("other.html"),
            r#"<html><head><script type="module" src="b.js"></script></head><body></body></html>"#,
        )
        .unwrap();
        std::fs::write(src.join("a.css"), "a{color:red}").unwrap();
        std::fs::write(src.join("b.js"), "console.log(1)").unwrap();

        let toolchain = Arc::new(FakeToolchain::default());
        let ctx = context_with(dir.path(), toolchain.clone(), |config| {
            config.hmr.debounce_ms = 20;
        });
        let host = Arc::new(PluginHost::setup(PluginHost::factories(&ctx.config), &ctx).await);
        let builder = Builder::new(
            Arc::clone(&ctx.config),
            Arc::clone(&ctx.toolchain),
            Arc::clone(&host),
            Arc::clone(&ctx.graph),
        );
        let entries = crate::build::crawl(&src).unwrap();
        assert!(builder.build_all(&entries, false).await.is_success());

        let (client_tx, client) = unbounded();
        ctx.clients.register(client_tx);

        let coordinator = Coordinator::new(
            Arc::new(BuildPipeline::new(builder)),
            host.hmr_instances().to_vec(),
            Arc::clone(&ctx.clients),
            ctx.config.hmr.debounce(),
        );
        let (events, events_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(coordinator.run(events_rx, shutdown_rx));

        Self {
            dir,
            ctx,
            toolchain,
            client,
            events,
            _shutdown: shutdown,
        }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Overwrite a built document so a later rebuild is detectable.
    fn mark_output(&self, rel: &str) {
        std::fs::write(self.path(rel), "stale").unwrap();
    }

    fn output_is_stale(&self, rel: &str) -> bool {
        std::fs::read_to_string(self.path(rel)).unwrap() == "stale"
    }

    /// Source files compiled since the last call.
    fn take_compiled(&self, since: &mut usize) -> Vec<PathBuf> {
        let compiled = self.toolchain.compiled();
        let fresh = compiled[*since..].to_vec();
        *since = compiled.len();
        fresh
    }

    async fn next_message(&self) -> serde_json::Value {
        for _ in 0..500 {
            if let Ok(text) = self.client.try_recv() {
                return serde_json::from_str(&text).unwrap();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no message from the coordinator");
    }
}

#[tokio::test]
async fn test_css_patch_and_script_rebuild_end_to_end() {
    let site = Site::start().await;
    let index = std::fs::read_to_string(site.path("build/index.html")).unwrap();
    assert!(index.contains("/@lumen/client.js"));
    assert!(site.ctx.vfs.contains(crate::plugin::CLIENT_PATH));

    let mut seen = 0;
    site.take_compiled(&mut seen);
    site.mark_output("build/index.html");
    site.mark_output("build/other.html");

    // Stylesheet edit: patched in place, no reload, no document rebuilt.
    std::fs::write(site.path("src/a.css"), "a{color:blue}").unwrap();
    site.events.send(FsEvent::Change(site.path("src/a.css"))).unwrap();
    let message = site.next_message().await;
    assert_eq!(message["type"], "css");
    assert_eq!(message["file"], "/a.css");
    assert_eq!(message["code"], "a{color:blue}");
    assert_eq!(std::fs::read_to_string(site.path("build/a.css")).unwrap(), "a{color:blue}");
    assert_eq!(site.take_compiled(&mut seen), vec![site.path("src/a.css")]);
    assert!(site.output_is_stale("build/index.html"));
    assert!(site.output_is_stale("build/other.html"));

    // Script edit with script patching off: everything is rebuilt.
    std::fs::write(site.path("src/b.js"), "console.log(2)").unwrap();
    site.events.send(FsEvent::Change(site.path("src/b.js"))).unwrap();
    let message = site.next_message().await;
    assert_eq!(message["type"], "full-reload");
    assert_eq!(std::fs::read_to_string(site.path("build/b.js")).unwrap(), "console.log(2)");
    assert!(site.path("build/other.html").exists());

    // Removing a document deletes its output but keeps the build root.
    std::fs::remove_file(site.path("src/other.html")).unwrap();
    site.events.send(FsEvent::Unlink(site.path("src/other.html"))).unwrap();
    for _ in 0..100 {
        if !site.path("build/other.html").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!site.path("build/other.html").exists());
    assert!(site.path("build").exists());
    assert!(site.client.try_recv().is_err(), "unlink never reloads");
}

#[tokio::test]
async fn test_mixed_batch_rebuilds_every_entry_once() {
    let site = Site::start().await;
    let mut seen = 0;
    site.take_compiled(&mut seen);
    site.mark_output("build/index.html");
    site.mark_output("build/other.html");

    // Both edits land inside one debounce window.
    std::fs::write(site.path("src/a.css"), "a{color:green}").unwrap();
    std::fs::write(site.path("src/b.js"), "console.log(3)").unwrap();
    site.events.send(FsEvent::Change(site.path("src/a.css"))).unwrap();
    site.events.send(FsEvent::Change(site.path("src/b.js"))).unwrap();

    let message = site.next_message().await;
    assert_eq!(message["type"], "full-reload");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(site.client.try_recv().is_err(), "one reload, no css patch");

    let mut compiled = site.take_compiled(&mut seen);
    compiled.sort();
    assert_eq!(compiled, vec![site.path("src/a.css"), site.path("src/b.js")]);
    assert!(!site.output_is_stale("build/index.html"));
    assert!(!site.output_is_stale("build/other.html"));
    assert_eq!(std::fs::read_to_string(site.path("build/a.css")).unwrap(), "a{color:green}");
    assert_eq!(std::fs::read_to_string(site.path("build/b.js")).unwrap(), "console.log(3)");
}
