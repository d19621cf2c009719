//! Web extension integration.
//!
//! Extension pages connect from `moz-extension://<uuid>` or
//! `chrome-extension://<id>` origins that are only known at runtime. Each
//! client's origin is learned from its `origin` message and from a probe
//! evaluated on connect, and the known extension origins are published at
//! `/@lumen/extensions.json`. After the initial build `web-ext run` is
//! launched once per target selected by `--webext`.

use std::collections::BTreeSet;
use std::process::Child;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use super::{ObservesBuildEnd, Plugin, PluginContext, PluginFactory, Serves};
use crate::config::LumenConfig;
use crate::embed::serve::PROBE_JS;
use crate::reload::bus::CONNECT;
use crate::reload::{ClientEvent, ClientRegistry};
use crate::utils::exec::Cmd;
use crate::utils::mime;
use crate::vfs::{VirtualContent, VirtualEntry, VirtualRequest};
use crate::{debug, log};

/// Known extension origins as a JSON array.
pub const EXTENSIONS_PATH: &str = "/@lumen/extensions.json";

const PROBE_PATH: &str = "/@lumen/probe.js";

const ORIGIN_EVENT: &str = "origin";

const EXTENSION_SCHEMES: &[&str] = &["moz-extension://", "chrome-extension://", "safari-web-extension://"];

pub struct WebextFactory;

#[async_trait]
impl PluginFactory for WebextFactory {
    fn name(&self) -> &str {
        "lumen:webext"
    }

    async fn create(&self, ctx: &PluginContext) -> Result<Arc<dyn Plugin>> {
        let plugin = Arc::new(Webext {
            config: Arc::clone(&ctx.config),
            origins: Arc::default(),
            children: Mutex::default(),
        });

        if ctx.config.mode.watch && ctx.config.webext_filter.is_some() {
            ctx.vfs.set(PROBE_PATH, VirtualEntry::fixed(VirtualContent::script(PROBE_JS)));
            plugin.listen(&ctx.clients);
        }
        Ok(plugin)
    }
}

struct Webext {
    config: Arc<LumenConfig>,
    origins: Arc<Mutex<BTreeSet<String>>>,
    children: Mutex<Vec<Child>>,
}

impl Webext {
    /// Track origins reported by clients, and probe every new client.
    fn listen(&self, clients: &Arc<ClientRegistry>) {
        let mut reported = clients.bus().subscribe(ORIGIN_EVENT);
        let origins = Arc::clone(&self.origins);
        tokio::spawn(async move {
            while let Some(event) = reported.recv().await {
                record_origin(&origins, &event);
            }
        });

        let mut connected = clients.bus().subscribe(CONNECT);
        let origins = Arc::clone(&self.origins);
        let clients = Arc::clone(clients);
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            while let Some(event) = connected.recv().await {
                let clients = Arc::clone(&clients);
                let origins = Arc::clone(&origins);
                let src = probe_src(&config);
                tokio::spawn(async move {
                    if let Some(origin) = clients.evaluate(event.client, &src, json!([])).await {
                        record_origin(
                            &origins,
                            &ClientEvent {
                                client: event.client,
                                kind: ORIGIN_EVENT.into(),
                                payload: json!({ "origin": origin }),
                            },
                        );
                    }
                });
            }
        });
    }

    fn launch(&self, filter: &str) {
        let webext = &self.config.webext;
        let output = &self.config.build.output;
        let mut children = self.children.lock();
        for target in webext.matching_targets(filter) {
            let cmd = Cmd::from_slice(&webext.command)
                .args(["run", "--target", target, "--source-dir"])
                .arg(output)
                .args(["--no-reload"])
                .cwd(&self.config.root);
            match cmd.spawn() {
                Ok(child) => {
                    log!("webext"; "launched {} (pid {})", target, child.id());
                    children.push(child);
                }
                Err(e) => log!("error"; "webext {}: {:#}", target, e),
            }
        }
        if children.is_empty() {
            log!("warning"; "no [webext] target matches `{}`", filter);
        }
    }
}

impl Drop for Webext {
    fn drop(&mut self) {
        for child in self.children.get_mut().iter_mut() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Plugin for Webext {
    fn name(&self) -> &str {
        "lumen:webext"
    }

    fn as_server(&self) -> Option<&dyn Serves> {
        Some(self)
    }

    fn as_build_observer(&self) -> Option<&dyn ObservesBuildEnd> {
        Some(self)
    }
}

#[async_trait]
impl Serves for Webext {
    async fn serve(&self, request: &VirtualRequest) -> Result<Option<VirtualContent>> {
        if request.path != EXTENSIONS_PATH {
            return Ok(None);
        }
        let origins: Vec<String> = self.origins.lock().iter().cloned().collect();
        let body = serde_json::to_vec(&origins)?;
        Ok(Some(VirtualContent::typed(body, mime::types::JSON)))
    }
}

#[async_trait]
impl ObservesBuildEnd for Webext {
    async fn build_end(&self, rebuild: bool) -> Result<()> {
        let config = &self.config;
        if rebuild || !config.mode.watch || !config.webext.launch {
            return Ok(());
        }
        if let Some(filter) = &config.webext_filter {
            self.launch(filter);
        }
        Ok(())
    }
}

/// Probe module URL. Absolute so extension pages fetch it from the server.
fn probe_src(config: &LumenConfig) -> String {
    match config.server_url() {
        Some(base) => format!("{base}{PROBE_PATH}"),
        None => PROBE_PATH.to_string(),
    }
}

fn record_origin(origins: &Mutex<BTreeSet<String>>, event: &ClientEvent) {
    let Some(origin) = event.payload.get("origin").and_then(Value::as_str) else {
        return;
    };
    if !is_extension_origin(origin) {
        return;
    }
    if origins.lock().insert(origin.to_string()) {
        debug!("webext"; "client {} is extension {}", event.client, origin);
    }
}

fn is_extension_origin(origin: &str) -> bool {
    EXTENSION_SCHEMES.iter().any(|scheme| origin.starts_with(scheme))
}
