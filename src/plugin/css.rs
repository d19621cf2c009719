//! Stylesheet hot reload.
//!
//! A changed stylesheet that some document references is recompiled and
//! pushed to every client as `{type:"css", file, code}`. Output identical to
//! the last push is suppressed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::{HmrInstance, Inert, ParticipatesInHmr, Plugin, PluginContext, PluginFactory};
use crate::build::{AssetGraph, AssetKind, Toolchain, compile_asset};
use crate::logger::{status_error, status_success};
use crate::reload::{ClientRegistry, HotMessage};
use crate::utils::hash;

pub struct CssFactory;

#[async_trait]
impl PluginFactory for CssFactory {
    fn name(&self) -> &str {
        "lumen:css"
    }

    async fn create(&self, ctx: &PluginContext) -> Result<Arc<dyn Plugin>> {
        if !(ctx.config.mode.watch && ctx.config.hmr.css) {
            return Ok(Arc::new(Inert(self.name().to_string())));
        }
        Ok(Arc::new(CssPlugin {
            hmr: Arc::new(CssHmr::new(ctx)),
        }))
    }
}

struct CssPlugin {
    hmr: Arc<CssHmr>,
}

impl Plugin for CssPlugin {
    fn name(&self) -> &str {
        "lumen:css"
    }

    fn as_hmr(&self) -> Option<&dyn ParticipatesInHmr> {
        Some(self)
    }
}

impl ParticipatesInHmr for CssPlugin {
    fn hmr_instance(&self) -> Arc<dyn HmrInstance> {
        Arc::clone(&self.hmr) as Arc<dyn HmrInstance>
    }
}

pub struct CssHmr {
    graph: Arc<AssetGraph>,
    toolchain: Arc<dyn Toolchain>,
    clients: Arc<ClientRegistry>,
    output_root: PathBuf,
    minify: bool,
    /// Output path → digest of the last pushed code.
    digests: Mutex<FxHashMap<PathBuf, String>>,
}

impl CssHmr {
    pub fn new(ctx: &PluginContext) -> Self {
        Self {
            graph: Arc::clone(&ctx.graph),
            toolchain: Arc::clone(&ctx.toolchain),
            clients: Arc::clone(&ctx.clients),
            output_root: ctx.config.build.output.clone(),
            minify: ctx.config.mode.minify,
            digests: Mutex::default(),
        }
    }

    /// Returns whether a message went out.
    async fn update_one(&self, file: &Path) -> Result<bool> {
        let Some(asset) = self.graph.find(file, AssetKind::Style) else {
            bail!("`{}` is no longer referenced", file.display());
        };
        let compiled = compile_asset(self.toolchain.as_ref(), &asset, self.minify).await?;

        let digest = hash::digest(&compiled.code);
        let previous = self.digests.lock().insert(asset.output.clone(), digest.clone());
        if previous.as_deref() == Some(digest.as_str()) {
            return Ok(false);
        }

        let Some(url) = asset.output_url(&self.output_root) else {
            bail!("`{}` is outside the output directory", asset.output.display());
        };
        self.clients.broadcast(&HotMessage::css(url, compiled.code));
        Ok(true)
    }
}

#[async_trait]
impl HmrInstance for CssHmr {
    fn name(&self) -> &str {
        "css"
    }

    fn accept(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "css")
            && self.graph.find(path, AssetKind::Style).is_some()
    }

    async fn update(&self, files: &[PathBuf]) -> Result<()> {
        let mut pushed = 0;
        let mut failed = Vec::new();
        for file in files {
            match self.update_one(file).await {
                Ok(sent) => pushed += usize::from(sent),
                Err(e) => {
                    status_error(&format!("css: {}", file.display()), &format!("{e:#}"));
                    failed.push(file.display().to_string());
                }
            }
        }
        if !failed.is_empty() {
            bail!("css update failed for {}", failed.join(", "));
        }
        if pushed > 0 {
            status_success(&format!("css updated ({pushed})"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{AssetRef, EntryDocument};
    use crate::plugin::tests::{FakeToolchain, context};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (CssHmr, crossbeam::channel::Receiver<String>) {
        let ctx = context(dir.path(), Arc::new(FakeToolchain::default()));
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.css"), "a{color:red}").unwrap();
        ctx.graph.record(&EntryDocument {
            source: src.join("index.html"),
            output: dir.path().join("build/index.html"),
            scripts: Vec::new(),
            styles: vec![AssetRef {
                kind: AssetKind::Style,
                raw: "a.css".into(),
                source: src.join("a.css"),
                output: dir.path().join("build/a.css"),
                is_module: false,
            }],
        });
        let (tx, rx) = crossbeam::channel::unbounded();
        ctx.clients.register(tx);
        (CssHmr::new(&ctx), rx)
    }

    #[test]
    fn test_accepts_only_referenced_stylesheets() {
        let dir = TempDir::new().unwrap();
        let (hmr, _rx) = setup(&dir);
        assert!(hmr.accept(&dir.path().join("src/a.css")));
        assert!(!hmr.accept(&dir.path().join("src/b.css")));
        assert!(!hmr.accept(&dir.path().join("src/a.js")));
    }

    #[tokio::test]
    async fn test_update_broadcasts_then_suppresses_unchanged() {
        let dir = TempDir::new().unwrap();
        let (hmr, rx) = setup(&dir);
        let file = dir.path().join("src/a.css");

        hmr.update(std::slice::from_ref(&file)).await.unwrap();
        let message: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(message["type"], "css");
        assert_eq!(message["file"], "/a.css");
        assert_eq!(message["code"], "a{color:red}");
        assert!(dir.path().join("build/a.css").exists());

        hmr.update(std::slice::from_ref(&file)).await.unwrap();
        assert!(rx.try_recv().is_err());

        std::fs::write(&file, "a{color:blue}").unwrap();
        hmr.update(&[file]).await.unwrap();
        assert!(rx.try_recv().unwrap().contains("blue"));
    }
}
