//! `[[plugins]]` user command plugins.
//!
//! ```toml
//! [[plugins]]
//! name = "icons"
//! command = ["node", "scripts/icons.mjs"]
//! on = "build_end"            # or "rebuild" (skip the initial build)
//!
//! [[plugins]]
//! name = "fixtures"
//! serve_prefix = "/api/"
//! serve_dir = "fixtures"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When a command plugin runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    /// After every build pass, initial included.
    #[default]
    BuildEnd,
    /// Only after watch-mode rebuilds.
    Rebuild,
}

/// A user plugin backed by an external command and/or a served directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandPluginConfig {
    pub name: String,
    pub command: Vec<String>,
    pub on: HookPoint,
    pub serve_prefix: Option<String>,
    pub serve_dir: Option<PathBuf>,
}
