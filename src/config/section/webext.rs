//! `[webext]` section configuration.
//!
//! ```toml
//! [webext]
//! targets = ["firefox-desktop", "chromium"]
//! launch = true
//! command = ["web-ext"]        # e.g. ["npx", "web-ext"]
//! ```

use serde::{Deserialize, Serialize};

/// Browser extension development settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebextConfig {
    /// `web-ext run --target` values.
    pub targets: Vec<String>,

    /// Launch a browser per matching target after the initial build.
    pub launch: bool,

    /// Launcher command and leading arguments.
    pub command: Vec<String>,
}

impl WebextConfig {
    /// Targets selected by a `--webext` filter (substring match, `all` or empty selects all).
    pub fn matching_targets<'a>(&'a self, filter: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.targets
            .iter()
            .map(String::as_str)
            .filter(move |t| filter.is_empty() || filter == "all" || t.contains(filter))
    }
}

impl Default for WebextConfig {
    fn default() -> Self {
        Self {
            targets: vec!["firefox-desktop".into(), "chromium".into()],
            launch: true,
            command: vec!["web-ext".into()],
        }
    }
}
