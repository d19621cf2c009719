//! `[hmr]` section configuration.
//!
//! ```toml
//! [hmr]
//! css = true          # Patch stylesheets in place
//! scripts = false     # Re-evaluate changed scripts in connected clients
//! debounce_ms = 200
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hot module reload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HmrConfig {
    pub css: bool,
    pub scripts: bool,
    pub debounce_ms: u64,
}

impl HmrConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for HmrConfig {
    fn default() -> Self {
        Self {
            css: true,
            scripts: false,
            debounce_ms: 200,
        }
    }
}
