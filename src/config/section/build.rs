//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! source = "src"                         # Crawled for *.html entry documents
//! output = "build"                       # Written artifacts
//! assets = ["public"]                    # Extra directories served as-is
//! browsers = ["chrome 100", "firefox 115"]
//! minify = true                          # Default: on for production builds
//! clean = true                           # Wipe `output` before the first build
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Build paths and compilation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSectionConfig {
    /// Source root, crawled for entry documents.
    pub source: PathBuf,

    /// Output root. Never deleted by pruning, only by `clean`.
    pub output: PathBuf,

    /// Additional directories served by the dev server.
    pub assets: Vec<PathBuf>,

    /// Browser targets, `"<name> <major>[.<minor>]"`.
    pub browsers: Vec<String>,

    /// Force minification on or off. `None` follows the build mode.
    pub minify: Option<bool>,

    /// Remove the output directory before the initial build.
    pub clean: bool,
}

impl Default for BuildSectionConfig {
    fn default() -> Self {
        Self {
            source: "src".into(),
            output: "build".into(),
            assets: Vec::new(),
            browsers: Vec::new(),
            minify: None,
            clean: true,
        }
    }
}
