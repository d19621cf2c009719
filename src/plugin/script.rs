//! Live script patching.
//!
//! A changed script is recompiled, exposed as a throwaway module under
//! `/@lumen/patch/`, and every connected client is asked to import it. The
//! module is deleted once the last client has answered (or disconnected).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinSet;

use super::{HmrInstance, Inert, ParticipatesInHmr, Plugin, PluginContext, PluginFactory};
use crate::build::{AssetGraph, AssetKind, Toolchain, compile_asset};
use crate::config::LumenConfig;
use crate::logger::{status_error, status_success};
use crate::reload::ClientRegistry;
use crate::vfs::{VirtualContent, VirtualEntry, VirtualFileRegistry};
use crate::debug;

const PATCH_PREFIX: &str = "/@lumen/patch/";

const SCRIPT_EXTENSIONS: &[&str] = &["js", "mjs", "ts", "mts", "jsx", "tsx"];

pub struct ScriptFactory;

#[async_trait]
impl PluginFactory for ScriptFactory {
    fn name(&self) -> &str {
        "lumen:script"
    }

    async fn create(&self, ctx: &PluginContext) -> Result<Arc<dyn Plugin>> {
        if !(ctx.config.mode.watch && ctx.config.hmr.scripts) {
            return Ok(Arc::new(Inert(self.name().to_string())));
        }
        Ok(Arc::new(ScriptPlugin {
            hmr: Arc::new(ScriptHmr::new(ctx)),
        }))
    }
}

struct ScriptPlugin {
    hmr: Arc<ScriptHmr>,
}

impl Plugin for ScriptPlugin {
    fn name(&self) -> &str {
        "lumen:script"
    }

    fn as_hmr(&self) -> Option<&dyn ParticipatesInHmr> {
        Some(self)
    }
}

impl ParticipatesInHmr for ScriptPlugin {
    fn hmr_instance(&self) -> Arc<dyn HmrInstance> {
        Arc::clone(&self.hmr) as Arc<dyn HmrInstance>
    }
}

pub struct ScriptHmr {
    config: Arc<LumenConfig>,
    graph: Arc<AssetGraph>,
    toolchain: Arc<dyn Toolchain>,
    clients: Arc<ClientRegistry>,
    vfs: Arc<VirtualFileRegistry>,
    next_patch: AtomicU64,
}

impl ScriptHmr {
    pub fn new(ctx: &PluginContext) -> Self {
        Self {
            config: Arc::clone(&ctx.config),
            graph: Arc::clone(&ctx.graph),
            toolchain: Arc::clone(&ctx.toolchain),
            clients: Arc::clone(&ctx.clients),
            vfs: Arc::clone(&ctx.vfs),
            next_patch: AtomicU64::new(1),
        }
    }

    /// Returns the number of clients that evaluated the patch.
    async fn patch(&self, file: &Path) -> Result<usize> {
        let Some(asset) = self.graph.find(file, AssetKind::Script) else {
            bail!("`{}` is no longer referenced", file.display());
        };
        let compiled = compile_asset(self.toolchain.as_ref(), &asset, self.config.mode.minify).await?;
        let url = asset
            .output_url(&self.config.build.output)
            .unwrap_or_else(|| asset.raw.clone());

        let id = self.next_patch.fetch_add(1, Ordering::Relaxed);
        let path = format!("{PATCH_PREFIX}{id}.js");
        self.vfs
            .set_ephemeral(path.clone(), VirtualEntry::fixed(VirtualContent::script(compiled.code)));

        // Every lease is taken before the first evaluation starts, so a fast
        // client cannot release the entry while others still need it.
        let leased: Vec<_> = self
            .clients
            .client_ids()
            .into_iter()
            .filter_map(|client| Some((client, self.vfs.acquire(&path)?)))
            .collect();
        if leased.is_empty() {
            self.vfs.delete(&path);
            return Ok(0);
        }

        let src = match self.config.server_url() {
            Some(base) => format!("{base}{path}"),
            None => path.clone(),
        };
        let args = json!([{ "file": url }]);

        let mut tasks = JoinSet::new();
        for (client, lease) in leased {
            let clients = Arc::clone(&self.clients);
            let src = src.clone();
            let args = args.clone();
            tasks.spawn(async move {
                let result = clients.evaluate(client, &src, args).await;
                drop(lease);
                (client, result)
            });
        }

        let mut evaluated = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Some(_))) => evaluated += 1,
                Ok((client, None)) => debug!("hmr"; "client {} left before evaluating {}", client, path),
                Err(e) => debug!("hmr"; "evaluation task failed: {}", e),
            }
        }
        Ok(evaluated)
    }
}

#[async_trait]
impl HmrInstance for ScriptHmr {
    fn name(&self) -> &str {
        "script"
    }

    fn accept(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
            && self.graph.find(path, AssetKind::Script).is_some()
    }

    async fn update(&self, files: &[PathBuf]) -> Result<()> {
        let mut failed = Vec::new();
        for file in files {
            match self.patch(file).await {
                Ok(clients) => status_success(&format!(
                    "patched {} ({} clients)",
                    file.file_name().map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into()),
                    clients
                )),
                Err(e) => {
                    status_error(&format!("script: {}", file.display()), &format!("{e:#}"));
                    failed.push(file.display().to_string());
                }
            }
        }
        if !failed.is_empty() {
            bail!("script patch failed for {}", failed.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{AssetRef, EntryDocument};
    use crate::plugin::tests::{FakeToolchain, context};
    use crate::reload::message::Inbound;
    use crossbeam::channel::{Receiver, unbounded};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<ScriptHmr>, PluginContext) {
        let ctx = context(dir.path(), Arc::new(FakeToolchain::default()));
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("b.ts"), "export default () => 1").unwrap();
        ctx.graph.record(&EntryDocument {
            source: src.join("other.html"),
            output: dir.path().join("build/other.html"),
            scripts: vec![AssetRef {
                kind: AssetKind::Script,
                raw: "./b.ts".into(),
                source: src.join("b.ts"),
                output: dir.path().join("build/b.js"),
                is_module: true,
            }],
            styles: Vec::new(),
        });
        (Arc::new(ScriptHmr::new(&ctx)), ctx)
    }

    /// Answers every evaluation request after checking the patch is served.
    fn answer(ctx: &PluginContext, client: crate::reload::ClientId, rx: Receiver<String>) {
        let clients = Arc::clone(&ctx.clients);
        let vfs = Arc::clone(&ctx.vfs);
        std::thread::spawn(move || {
            while let Ok(text) = rx.recv() {
                let request: serde_json::Value = serde_json::from_str(&text).unwrap();
                let src = request["src"].as_str().unwrap();
                assert!(vfs.contains(src), "patch must be served while evaluating");
                assert_eq!(request["args"][0]["file"], "/b.js");
                let reply = json!({"type": "result", "id": request["id"], "result": true});
                assert!(Inbound::parse(&reply.to_string()).is_some());
                clients.handle_inbound(client, &reply.to_string());
            }
        });
    }

    #[test]
    fn test_accepts_referenced_scripts() {
        let dir = TempDir::new().unwrap();
        let (hmr, _ctx) = setup(&dir);
        assert!(hmr.accept(&dir.path().join("src/b.ts")));
        assert!(!hmr.accept(&dir.path().join("src/c.ts")));
        assert!(!hmr.accept(&dir.path().join("src/b.css")));
    }

    #[tokio::test]
    async fn test_patch_without_clients_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let (hmr, ctx) = setup(&dir);
        hmr.update(&[dir.path().join("src/b.ts")]).await.unwrap();
        assert_eq!(ctx.vfs.len(), 0);
        assert!(dir.path().join("build/b.js").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_patch_evaluates_in_every_client_then_deletes() {
        let dir = TempDir::new().unwrap();
        let (hmr, ctx) = setup(&dir);
        for _ in 0..3 {
            let (tx, rx) = unbounded();
            let client = ctx.clients.register(tx);
            answer(&ctx, client, rx);
        }

        let evaluated = hmr.patch(&dir.path().join("src/b.ts")).await.unwrap();
        assert_eq!(evaluated, 3);
        assert_eq!(ctx.vfs.len(), 0);
        assert_eq!(ctx.clients.pending_len(), 0);
    }
}
