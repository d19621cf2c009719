//! Plugin host.
//!
//! A plugin is created once per run by a [`PluginFactory`] and declares
//! what it does through capability queries:
//!
//! | Capability          | Hook                                   |
//! |---------------------|----------------------------------------|
//! | [`Serves`]          | answer dev server requests             |
//! | [`ParticipatesInHmr`] | provide an [`HmrInstance`]           |
//! | [`MutatesDocument`] | edit each entry document before write  |
//! | [`ObservesBuildEnd`] | run after every build pass            |
//!
//! Built-ins (client bootstrap, CSS hot reload, script patching, web
//! extension support) always come first, user plugins after them. Hooks run
//! in that order and every hook error is logged without stopping the others.

mod bootstrap;
mod command;
mod css;
mod script;
mod webext;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::build::{AssetGraph, EntryDocument, HtmlDocument, Toolchain};
use crate::config::LumenConfig;
use crate::reload::ClientRegistry;
use crate::vfs::{VirtualContent, VirtualFileRegistry, VirtualRequest};
use crate::{debug, log};

pub use bootstrap::CLIENT_PATH;

/// Shared services handed to every factory.
#[derive(Clone)]
pub struct PluginContext {
    pub config: Arc<LumenConfig>,
    pub vfs: Arc<VirtualFileRegistry>,
    pub clients: Arc<ClientRegistry>,
    pub toolchain: Arc<dyn Toolchain>,
    pub graph: Arc<AssetGraph>,
}

#[async_trait]
pub trait PluginFactory: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self, ctx: &PluginContext) -> Result<Arc<dyn Plugin>>;
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn as_server(&self) -> Option<&dyn Serves> {
        None
    }

    fn as_hmr(&self) -> Option<&dyn ParticipatesInHmr> {
        None
    }

    fn as_document_mutator(&self) -> Option<&dyn MutatesDocument> {
        None
    }

    fn as_build_observer(&self) -> Option<&dyn ObservesBuildEnd> {
        None
    }
}

#[async_trait]
pub trait Serves: Send + Sync {
    /// `Ok(None)` passes the request on.
    async fn serve(&self, request: &VirtualRequest) -> Result<Option<VirtualContent>>;
}

pub trait ParticipatesInHmr: Send + Sync {
    /// The instance used for every cycle of this run.
    fn hmr_instance(&self) -> Arc<dyn HmrInstance>;
}

#[async_trait]
pub trait MutatesDocument: Send + Sync {
    async fn mutate(&self, doc: &mut HtmlDocument, entry: &EntryDocument) -> Result<()>;
}

#[async_trait]
pub trait ObservesBuildEnd: Send + Sync {
    async fn build_end(&self, rebuild: bool) -> Result<()>;
}

/// In-place updater for one class of files.
#[async_trait]
pub trait HmrInstance: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `path` can be absorbed without a rebuild. Must not block.
    fn accept(&self, path: &Path) -> bool;

    /// Push an update for exactly the files this instance accepted.
    async fn update(&self, files: &[PathBuf]) -> Result<()>;
}

/// Built-in whose feature is switched off for this run.
struct Inert(String);

impl Plugin for Inert {
    fn name(&self) -> &str {
        &self.0
    }
}

/// Registered plugins in dispatch order.
#[derive(Default)]
pub struct PluginHost {
    plugins: Vec<Arc<dyn Plugin>>,
    hmr: Vec<Arc<dyn HmrInstance>>,
}

impl PluginHost {
    /// Create every plugin. A failing factory is logged and left out.
    pub async fn setup(factories: Vec<Box<dyn PluginFactory>>, ctx: &PluginContext) -> Self {
        let mut plugins = Vec::with_capacity(factories.len());
        for factory in factories {
            match factory.create(ctx).await {
                Ok(plugin) => {
                    debug!("plugin"; "loaded {}", plugin.name());
                    plugins.push(plugin);
                }
                Err(e) => log!("error"; "plugin `{}` failed to load: {:#}", factory.name(), e),
            }
        }
        Self::from_plugins(plugins)
    }

    pub fn from_plugins(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        let hmr = plugins
            .iter()
            .filter_map(|p| p.as_hmr().map(ParticipatesInHmr::hmr_instance))
            .collect();
        Self { plugins, hmr }
    }

    /// Built-in factories followed by the configured user plugins.
    pub fn factories(config: &LumenConfig) -> Vec<Box<dyn PluginFactory>> {
        let mut factories: Vec<Box<dyn PluginFactory>> = vec![
            Box::new(bootstrap::BootstrapFactory),
            Box::new(css::CssFactory),
            Box::new(script::ScriptFactory),
            Box::new(webext::WebextFactory),
        ];
        factories.extend(
            config
                .plugins
                .iter()
                .cloned()
                .map(|cfg| Box::new(command::CommandFactory(cfg)) as Box<dyn PluginFactory>),
        );
        factories
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn hmr_instances(&self) -> &[Arc<dyn HmrInstance>] {
        &self.hmr
    }

    /// First plugin answer wins.
    pub async fn serve(&self, request: &VirtualRequest) -> Option<VirtualContent> {
        for plugin in &self.plugins {
            let Some(server) = plugin.as_server() else {
                continue;
            };
            match server.serve(request).await {
                Ok(Some(content)) => return Some(content),
                Ok(None) => {}
                Err(e) => log!("error"; "plugin `{}` serve {}: {:#}", plugin.name(), request.path, e),
            }
        }
        None
    }

    pub async fn mutate_document(&self, doc: &mut HtmlDocument, entry: &EntryDocument) {
        for plugin in &self.plugins {
            if let Some(mutator) = plugin.as_document_mutator()
                && let Err(e) = mutator.mutate(doc, entry).await
            {
                log!("error"; "plugin `{}` on {}: {:#}", plugin.name(), entry.source.display(), e);
            }
        }
    }

    pub async fn build_end(&self, rebuild: bool) {
        for plugin in &self.plugins {
            if let Some(observer) = plugin.as_build_observer()
                && let Err(e) = observer.build_end(rebuild).await
            {
                log!("error"; "plugin `{}` build_end: {:#}", plugin.name(), e);
            }
        }
    }
}
