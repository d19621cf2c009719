//! Client bootstrap: serves the hot reload runtime and wires it into pages.

use std::net::IpAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{MutatesDocument, ObservesBuildEnd, Plugin, PluginContext, PluginFactory};
use crate::build::{EntryDocument, HtmlDocument};
use crate::config::LumenConfig;
use crate::debug;
use crate::embed::serve::client_js;
use crate::vfs::{VirtualContent, VirtualEntry};

/// Request path of the client runtime.
pub const CLIENT_PATH: &str = "/@lumen/client.js";

const CLIENT_TAG: &str = r#"<script type="module" src="/@lumen/client.js"></script>"#;

pub struct BootstrapFactory;

#[async_trait]
impl PluginFactory for BootstrapFactory {
    fn name(&self) -> &str {
        "lumen:bootstrap"
    }

    async fn create(&self, ctx: &PluginContext) -> Result<Arc<dyn Plugin>> {
        let config = Arc::clone(&ctx.config);
        ctx.vfs.set(
            CLIENT_PATH,
            VirtualEntry::lazy(move |_| {
                let code = render_client(&config);
                async move { Ok(VirtualContent::script(code)) }
            }),
        );
        Ok(Arc::new(Bootstrap {
            config: Arc::clone(&ctx.config),
        }))
    }
}

struct Bootstrap {
    config: Arc<LumenConfig>,
}

impl Plugin for Bootstrap {
    fn name(&self) -> &str {
        "lumen:bootstrap"
    }

    fn as_document_mutator(&self) -> Option<&dyn MutatesDocument> {
        Some(self)
    }

    fn as_build_observer(&self) -> Option<&dyn ObservesBuildEnd> {
        Some(self)
    }
}

#[async_trait]
impl MutatesDocument for Bootstrap {
    async fn mutate(&self, doc: &mut HtmlDocument, _entry: &EntryDocument) -> Result<()> {
        if self.config.mode.watch && !doc.as_str().contains(CLIENT_PATH) {
            doc.inject_head(CLIENT_TAG);
        }
        Ok(())
    }
}

#[async_trait]
impl ObservesBuildEnd for Bootstrap {
    /// Extension pages resolve `/@lumen/client.js` inside the package, so the
    /// runtime is written next to the build output.
    async fn build_end(&self, _rebuild: bool) -> Result<()> {
        if !self.config.mode.watch || self.config.webext_filter.is_none() {
            return Ok(());
        }
        let path = self
            .config
            .build
            .output
            .join(CLIENT_PATH.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create `{}`", parent.display()))?;
        }
        tokio::fs::write(&path, render_client(&self.config))
            .await
            .with_context(|| format!("failed to write `{}`", path.display()))?;
        debug!("bootstrap"; "wrote {}", path.display());
        Ok(())
    }
}

/// Client runtime pointed at the bound socket.
fn render_client(config: &LumenConfig) -> String {
    client_js(&ws_url(config.serve.interface, config.ws_port()))
}

fn ws_url(interface: IpAddr, port: u16) -> String {
    let host = match interface {
        ip if ip.is_unspecified() => "localhost".to_string(),
        IpAddr::V6(ip) => format!("[{ip}]"),
        IpAddr::V4(ip) => ip.to_string(),
    };
    format!("ws://{host}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_ws_url() {
        assert_eq!(ws_url(IpAddr::V4(Ipv4Addr::LOCALHOST), 5001), "ws://127.0.0.1:5001");
        assert_eq!(ws_url(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5001), "ws://localhost:5001");
        assert_eq!(ws_url(IpAddr::V6(Ipv6Addr::LOCALHOST), 5002), "ws://[::1]:5002");
    }

    #[test]
    fn test_render_client_uses_resolved_port() {
        let config = LumenConfig::default();
        config.set_ws_port(5004);
        assert!(render_client(&config).contains("ws://127.0.0.1:5004"));
    }
}
