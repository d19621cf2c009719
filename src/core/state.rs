//! Process-wide shutdown state.
//!
//! Ctrl+C before the dev server is registered exits right away. Afterwards
//! it flips [`is_shutdown`], signals the watch loop and unblocks the HTTP
//! accept loop so `main` can return normally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use anyhow::Context;
use tiny_http::Server;
use tokio::sync::watch;

static REQUESTED: AtomicBool = AtomicBool::new(false);
static HOOKS: OnceLock<ShutdownHooks> = OnceLock::new();

/// What a running dev server needs told on Ctrl+C.
struct ShutdownHooks {
    server: Arc<Server>,
    signal: watch::Sender<bool>,
}

impl ShutdownHooks {
    fn fire(&self) {
        self.signal.send_replace(true);
        self.server.unblock();
    }
}

pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(on_interrupt).context("failed to install the Ctrl+C handler")
}

fn on_interrupt() {
    REQUESTED.store(true, Ordering::SeqCst);
    match HOOKS.get() {
        Some(hooks) => {
            crate::log!("serve"; "shutting down...");
            hooks.fire();
        }
        None => std::process::exit(0),
    }
}

/// Hand the bound server and the watch loop's shutdown signal to the
/// Ctrl+C handler. Only the first registration counts.
pub fn register_server(server: Arc<Server>, signal: watch::Sender<bool>) {
    let _ = HOOKS.set(ShutdownHooks { server, signal });
}

pub fn is_shutdown() -> bool {
    REQUESTED.load(Ordering::Relaxed)
}
