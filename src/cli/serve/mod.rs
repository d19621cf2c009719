//! Development server with hot reload support.
//!
//! ```text
//! request ──► Serves plugins ──► virtual files ──► served dirs ──► 404
//! ```
//!
//! The HTTP listener runs its accept loop on a plain thread and hands each
//! request to the tokio runtime. The socket listener for the client runtime
//! lives on a sibling port (see [`crate::reload::server`]).

mod lifecycle;
mod path;
mod response;

pub use response::Reply;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tiny_http::{Request, Server};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use super::build::Session;
use crate::config::LumenConfig;
use crate::core::{is_shutdown, register_server};
use crate::hmr::{BuildPipeline, Coordinator, FsWatcher, WatchScope};
use crate::plugin::PluginHost;
use crate::reload::{ClientRegistry, server::start_ws_server};
use crate::tls::CertificateStore;
use crate::vfs::{VirtualFileRegistry, VirtualRequest};
use crate::{debug, log};

/// Listeners bound ahead of the first build.
pub struct Listeners {
    server: Arc<Server>,
}

/// Bind the socket and HTTP listeners and record their addresses.
pub fn bind(config: &LumenConfig, clients: &Arc<ClientRegistry>) -> Result<Listeners> {
    let serve = &config.serve;

    let ws_port = start_ws_server(serve.interface, serve.ws_port, Arc::clone(clients))?;
    config.set_ws_port(ws_port);
    debug!("ws"; "listening on port {}", ws_port);

    let tls = if serve.https {
        Some(CertificateStore::new(&serve.cert_dir).load_or_generate()?)
    } else {
        None
    };
    let (server, addr) = lifecycle::bind_with_retry(serve.interface, serve.port, tls.as_ref())?;

    let url = lifecycle::base_url(addr, serve.https);
    log!("serve"; "{}", url);
    config.set_server_url(url);

    debug!("serve"; "bound {}", addr);

    Ok(Listeners {
        server: Arc::new(server),
    })
}

/// Serve and watch until Ctrl+C.
pub async fn run(listeners: Listeners, session: Session) -> Result<()> {
    let config = Arc::clone(&session.config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    register_server(Arc::clone(&listeners.server), shutdown_tx);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let scope = WatchScope {
        roots: vec![config.build.source.clone()],
        excluded: vec![config.build.output.clone()],
    };
    let _watcher = FsWatcher::start(scope, events_tx)
        .with_context(|| format!("failed to watch {}", config.build.source.display()))?;
    log!("watch"; "watching {}", config.build.source.display());

    let router = Arc::new(Router::new(&session));
    let server = Arc::clone(&listeners.server);
    let runtime = Handle::current();
    let request_loop = std::thread::spawn(move || run_request_loop(&server, &router, &runtime));

    let coordinator = Coordinator::new(
        Arc::new(BuildPipeline::new(session.builder.clone())),
        session.plugins.hmr_instances().to_vec(),
        Arc::clone(&session.clients),
        config.hmr.debounce(),
    );
    coordinator.run(events_rx, shutdown_rx).await;

    listeners.server.unblock();
    lifecycle::wait_for_shutdown(request_loop);
    Ok(())
}

fn run_request_loop(server: &Server, router: &Arc<Router>, runtime: &Handle) {
    for request in server.incoming_requests() {
        let router = Arc::clone(router);
        runtime.spawn(async move {
            if let Err(e) = handle_request(request, &router).await {
                log!("serve"; "request error: {e}");
            }
        });
    }
}

async fn handle_request(request: Request, router: &Router) -> Result<()> {
    let reply = if is_shutdown() {
        Reply::unavailable()
    } else {
        router.route(virtual_request(&request)).await
    };
    debug!("serve"; "{} {} {}", request.method(), request.url(), reply.status);
    tokio::task::spawn_blocking(move || reply.send(request)).await?
}

fn virtual_request(request: &Request) -> VirtualRequest {
    let mut virtual_request = VirtualRequest::from_url(request.url());
    virtual_request.headers = request
        .headers()
        .iter()
        .map(|h| (h.field.as_str().as_str().to_ascii_lowercase(), h.value.to_string()))
        .collect();
    virtual_request
}

/// Request resolution, first match wins.
pub struct Router {
    plugins: Arc<PluginHost>,
    vfs: Arc<VirtualFileRegistry>,
    served: Vec<PathBuf>,
    not_found_page: PathBuf,
}

impl Router {
    pub fn new(session: &Session) -> Self {
        Self::from_parts(
            Arc::clone(&session.plugins),
            Arc::clone(&session.vfs),
            &session.config,
        )
    }

    pub fn from_parts(
        plugins: Arc<PluginHost>,
        vfs: Arc<VirtualFileRegistry>,
        config: &LumenConfig,
    ) -> Self {
        Self {
            plugins,
            vfs,
            served: config.served_dirs(),
            not_found_page: config.build.output.join("404.html"),
        }
    }

    pub async fn route(&self, request: VirtualRequest) -> Reply {
        if let Some(content) = self.plugins.serve(&request).await {
            return Reply::content(&request.path, content);
        }

        let request_path = request.path.clone();
        match self.vfs.resolve(request).await {
            Some(Ok(content)) => return Reply::content(&request_path, content),
            Some(Err(e)) => {
                log!("error"; "virtual file {}: {:#}", request_path, e);
                return Reply::server_error(&format!("{e:#}"));
            }
            None => {}
        }

        if let Some(file) = path::resolve_path(&request_path, &self.served) {
            match tokio::fs::read(&file).await {
                Ok(body) => return Reply::file(&file, body),
                Err(e) => log!("serve"; "failed to read {}: {}", file.display(), e),
            }
        }

        Reply::not_found(tokio::fs::read(&self.not_found_page).await.ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{Plugin, Serves};
    use crate::vfs::{VirtualContent, VirtualEntry};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;

    struct Fixed(&'static str, &'static str);

    impl Plugin for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn as_server(&self) -> Option<&dyn Serves> {
            Some(self)
        }
    }

    #[async_trait]
    impl Serves for Fixed {
        async fn serve(&self, request: &VirtualRequest) -> Result<Option<VirtualContent>> {
            Ok((request.path == self.0).then(|| VirtualContent::new(self.1)))
        }
    }

    fn router(dir: &TempDir, plugins: Vec<Arc<dyn Plugin>>) -> (Router, Arc<VirtualFileRegistry>) {
        let mut config = LumenConfig::default().resolve(dir.path());
        config.build.assets = vec![dir.path().join("public")];
        fs::create_dir_all(&config.build.output).unwrap();
        fs::create_dir_all(dir.path().join("public")).unwrap();

        let vfs = Arc::new(VirtualFileRegistry::new());
        let host = Arc::new(PluginHost::from_plugins(plugins));
        (Router::from_parts(host, Arc::clone(&vfs), &config), vfs)
    }

    #[tokio::test]
    async fn test_plugin_before_virtual_before_disk() {
        let dir = TempDir::new().unwrap();
        let (router, vfs) = router(&dir, vec![Arc::new(Fixed("/a.js", "from plugin"))]);
        vfs.set("/a.js", VirtualEntry::fixed(VirtualContent::script("from vfs")));
        vfs.set("/b.js", VirtualEntry::fixed(VirtualContent::script("from vfs")));
        fs::write(dir.path().join("build/b.js"), "from disk").unwrap();
        fs::write(dir.path().join("build/c.js"), "from disk").unwrap();

        let a = router.route(VirtualRequest::from_url("/a.js")).await;
        assert_eq!(a.body, b"from plugin");
        assert_eq!(a.header("content-type"), Some(crate::utils::mime::types::JAVASCRIPT));

        let b = router.route(VirtualRequest::from_url("/b.js?t=1")).await;
        assert_eq!(b.body, b"from vfs");

        let c = router.route(VirtualRequest::from_url("/c.js")).await;
        assert_eq!(c.body, b"from disk");
        assert_eq!(c.header("access-control-allow-origin"), Some("*"));
        assert_eq!(c.header("cache-control"), Some("no-cache"));
    }

    #[tokio::test]
    async fn test_asset_dirs_and_not_found() {
        let dir = TempDir::new().unwrap();
        let (router, _vfs) = router(&dir, Vec::new());
        fs::write(dir.path().join("public/logo.svg"), "<svg/>").unwrap();
        fs::write(dir.path().join("secret.txt"), "no").unwrap();

        let logo = router.route(VirtualRequest::from_url("/logo.svg")).await;
        assert_eq!(logo.status, 200);

        let escaped = router.route(VirtualRequest::from_url("/../secret.txt")).await;
        assert_eq!(escaped.status, 404);
        assert_eq!(escaped.body, b"404 Not Found");

        fs::write(dir.path().join("build/404.html"), "<h1>custom</h1>").unwrap();
        let custom = router.route(VirtualRequest::from_url("/nope")).await;
        assert_eq!(custom.status, 404);
        assert_eq!(custom.body, b"<h1>custom</h1>");
    }

    #[tokio::test]
    async fn test_failing_virtual_entry_is_500() {
        let dir = TempDir::new().unwrap();
        let (router, vfs) = router(&dir, Vec::new());
        vfs.set(
            "/broken.js",
            VirtualEntry::lazy(|_| async { Err(anyhow::anyhow!("resolver exploded")) }),
        );

        let reply = router.route(VirtualRequest::from_url("/broken.js")).await;
        assert_eq!(reply.status, 500);
        assert!(String::from_utf8_lossy(&reply.body).contains("resolver exploded"));
    }
}
