//! Lumen - development build pipeline for static sites and browser extensions.

mod build;
mod cli;
mod config;
mod core;
mod embed;
mod hmr;
mod logger;
mod plugin;
mod reload;
mod tls;
mod utils;
mod vfs;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::{Cli, build::Session};
use config::LumenConfig;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let config = Arc::new(LumenConfig::load(&cli)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    let result = runtime.block_on(run(config));

    // Blocking tasks get two seconds to finish
    runtime.shutdown_timeout(Duration::from_secs(2));
    result
}

async fn run(config: Arc<LumenConfig>) -> Result<()> {
    let entries = cli::build::prepare_output(&config)?;
    let clients = cli::build::client_registry();

    // Ports must be known before plugins render the client runtime
    let listeners = if config.mode.watch {
        Some(cli::serve::bind(&config, &clients)?)
    } else {
        None
    };

    let session = Session::setup(Arc::clone(&config), clients).await?;
    session.build_initial(&entries).await;

    match listeners {
        Some(listeners) => cli::serve::run(listeners, session).await,
        None => Ok(()),
    }
}
