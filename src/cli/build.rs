//! Build session: everything a run needs to compile the entry documents.
//!
//! Setup order matters in watch mode. The socket and HTTP listeners are bound
//! before [`Session::setup`], so the client runtime rendered by the plugins
//! and the `LUMEN_SERVER_URL` seen by command plugins carry the real ports.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::build::{self, AssetGraph, BuildReport, Builder, DefaultToolchain, Toolchain};
use crate::config::LumenConfig;
use crate::plugin::{PluginContext, PluginHost};
use crate::reload::{ClientRegistry, EventBus};
use crate::vfs::VirtualFileRegistry;
use crate::{debug, log};

/// Explicitly owned registries and the builder wired to them.
pub struct Session {
    pub config: Arc<LumenConfig>,
    pub builder: Builder,
    pub plugins: Arc<PluginHost>,
    pub vfs: Arc<VirtualFileRegistry>,
    pub clients: Arc<ClientRegistry>,
}

/// Crawl the source tree and prepare the output directory.
///
/// Both failures are fatal for the run.
pub fn prepare_output(config: &LumenConfig) -> Result<Vec<PathBuf>> {
    let entries = build::crawl(&config.build.source)
        .with_context(|| format!("failed to crawl {}", config.build.source.display()))?;
    debug!("build"; "found {} entry documents", entries.len());

    if config.build.clean {
        build::clean_output_dir(&config.build.output)?;
    }
    Ok(entries)
}

/// Client registry shared by the socket listener and the plugins.
pub fn client_registry() -> Arc<ClientRegistry> {
    Arc::new(ClientRegistry::new(Arc::new(EventBus::new())))
}

impl Session {
    /// Create the toolchain and every plugin.
    pub async fn setup(config: Arc<LumenConfig>, clients: Arc<ClientRegistry>) -> Result<Self> {
        let toolchain: Arc<dyn Toolchain> = Arc::new(
            DefaultToolchain::new(&config.build.browsers).context("invalid `build.browsers`")?,
        );
        let graph = Arc::new(AssetGraph::new());
        let vfs = Arc::new(VirtualFileRegistry::new());

        let ctx = PluginContext {
            config: Arc::clone(&config),
            vfs: Arc::clone(&vfs),
            clients: Arc::clone(&clients),
            toolchain: Arc::clone(&toolchain),
            graph: Arc::clone(&graph),
        };
        let plugins = Arc::new(PluginHost::setup(PluginHost::factories(&config), &ctx).await);
        debug!("plugin"; "loaded: {}", plugins.names().join(", "));

        let builder = Builder::new(Arc::clone(&config), toolchain, Arc::clone(&plugins), graph);
        Ok(Self {
            config,
            builder,
            plugins,
            vfs,
            clients,
        })
    }

    /// First build pass of the run.
    pub async fn build_initial(&self, entries: &[PathBuf]) -> BuildReport {
        let report = self.builder.build_all(entries, false).await;
        if report.is_success() {
            log!("build"; "built {} documents into {}", report.built.len(), self.config.build.output.display());
        } else {
            log!("build"; "built {} documents, {} failed", report.built.len(), report.failed.len());
        }
        report
    }
}
