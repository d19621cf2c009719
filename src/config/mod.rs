//! Project configuration management for `lumen.toml`.
//!
//! ```text
//! config/
//! ├── section/   # [build] [serve] [hmr] [webext] [[plugins]]
//! ├── error      # ConfigError
//! └── mod.rs     # LumenConfig (this file)
//! ```
//!
//! The file is read once per run. The only values written afterwards are the
//! resolved server URL and socket port, each set once after binding.

mod error;
pub mod section;

pub use error::ConfigError;
pub use section::{
    BuildSectionConfig, CommandPluginConfig, HmrConfig, HookPoint, ServeConfig, WebextConfig,
};

use crate::{cli::Cli, core::BuildMode, debug, log};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// Values only known once the listeners are bound.
#[derive(Debug, Clone, Default)]
struct Resolved {
    url: OnceLock<String>,
    ws_port: OnceLock<u16>,
}

/// Root configuration structure representing `lumen.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LumenConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory, parent of the config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// Build mode selected on the command line (internal use only)
    #[serde(skip)]
    pub mode: BuildMode,

    /// `--webext` target filter (internal use only)
    #[serde(skip)]
    pub webext_filter: Option<String>,

    #[serde(skip)]
    resolved: Resolved,

    #[serde(default)]
    pub build: BuildSectionConfig,

    #[serde(default)]
    pub serve: ServeConfig,

    #[serde(default)]
    pub hmr: HmrConfig,

    #[serde(default)]
    pub webext: WebextConfig,

    #[serde(default)]
    pub plugins: Vec<CommandPluginConfig>,
}

impl LumenConfig {
    /// Load configuration for a run.
    ///
    /// Searches upward from cwd for the config file. A missing file is not an
    /// error: defaults apply with the cwd as project root.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let (mut config, config_path) = match find_config_file(&cli.config) {
            Some(path) => (Self::from_path(&path)?, path),
            None => {
                debug!("config"; "no {} found, using defaults", cli.config.display());
                (Self::default(), cwd.join(&cli.config))
            }
        };

        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(cwd);

        config.config_path = config_path;
        config.mode = BuildMode::from_flags(cli.watch, cli.critical);
        config.webext_filter = cli.webext.clone();
        if let Some(port) = cli.port {
            config.serve.port = port;
        }
        if let Some(interface) = cli.interface {
            config.serve.interface = interface;
        }

        let config = config.resolve(&root);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {} ignored: {}", display_path, fields.join(", "));
    }

    /// Anchor every configured path at `root`.
    pub fn resolve(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self.build.source = root.join(&self.build.source);
        self.build.output = root.join(&self.build.output);
        self.build.assets = self.build.assets.iter().map(|p| root.join(p)).collect();
        self.serve.cert_dir = root.join(&self.serve.cert_dir);
        for plugin in &mut self.plugins {
            if let Some(dir) = &plugin.serve_dir {
                plugin.serve_dir = Some(root.join(dir));
            }
        }
        if let Some(minify) = self.build.minify {
            self.mode.minify = minify;
        }
        self
    }

    /// Reject configurations that would make the run destructive or unbindable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let build = &self.build;
        if !build.source.is_dir() {
            return Err(ConfigError::Validation(format!(
                "`build.source` directory `{}` does not exist",
                build.source.display()
            )));
        }
        if build.source.starts_with(&build.output) {
            return Err(ConfigError::Validation(
                "`build.output` must not contain `build.source`".into(),
            ));
        }
        self.serve.validate()?;
        for plugin in &self.plugins {
            if plugin.name.is_empty() {
                return Err(ConfigError::Validation("every [[plugins]] entry needs a `name`".into()));
            }
            if plugin.serve_prefix.is_some() != plugin.serve_dir.is_some() {
                return Err(ConfigError::Validation(format!(
                    "plugin `{}`: `serve_prefix` and `serve_dir` go together",
                    plugin.name
                )));
            }
        }
        Ok(())
    }

    /// Directories the dev server may read from disk.
    pub fn served_dirs(&self) -> Vec<PathBuf> {
        std::iter::once(self.build.output.clone())
            .chain(self.build.assets.iter().cloned())
            .collect()
    }

    /// Record the bound server URL. Later calls are ignored.
    pub fn set_server_url(&self, url: String) {
        let _ = self.resolved.url.set(url);
    }

    /// Bound server URL, once the HTTP listener is up.
    pub fn server_url(&self) -> Option<&str> {
        self.resolved.url.get().map(String::as_str)
    }

    /// Record the bound socket port. Later calls are ignored.
    pub fn set_ws_port(&self, port: u16) {
        let _ = self.resolved.ws_port.set(port);
    }

    /// Socket port, resolved after binding or the configured one before.
    pub fn ws_port(&self) -> u16 {
        self.resolved.ws_port.get().copied().unwrap_or(self.serve.ws_port)
    }
}

/// Find config file by searching upward from current directory.
fn find_config_file(config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let cwd = std::env::current_dir().ok()?;
    let mut current = cwd.as_path();
    loop {
        let candidate = current.join(config_name);
        if candidate.exists() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

/// Parse a config string for tests.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> LumenConfig {
    LumenConfig::parse_with_ignored(content).unwrap().0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_fields_collected() {
        let (_, ignored) =
            LumenConfig::parse_with_ignored("[serve]\nport = 3000\nlivereload = true").unwrap();
        assert_eq!(ignored, vec!["serve.livereload".to_string()]);
    }

    #[test]
    fn test_invalid_toml() {
        let err = LumenConfig::parse_with_ignored("[serve\nport = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_resolve_anchors_paths() {
        let dir = TempDir::new().unwrap();
        let config = test_parse_config("[build]\nassets = [\"public\"]").resolve(dir.path());
        assert_eq!(config.build.source, dir.path().join("src"));
        assert_eq!(config.build.output, dir.path().join("build"));
        assert_eq!(
            config.served_dirs(),
            vec![dir.path().join("build"), dir.path().join("public")]
        );
    }

    #[test]
    fn test_minify_override() {
        let dir = TempDir::new().unwrap();
        let config = test_parse_config("[build]\nminify = false").resolve(dir.path());
        assert!(!config.mode.minify);
        assert!(!config.mode.watch);
    }

    #[test]
    fn test_validate_missing_source() {
        let dir = TempDir::new().unwrap();
        let config = LumenConfig::default().resolve(dir.path());
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_validate_output_containing_source() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("build/src")).unwrap();
        let config = test_parse_config("[build]\nsource = \"build/src\"").resolve(dir.path());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_same_ports() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        let config = test_parse_config("[serve]\nport = 4000\nws_port = 4000").resolve(dir.path());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_cells_write_once() {
        let config = LumenConfig::default();
        assert_eq!(config.ws_port(), 5001);
        assert!(config.server_url().is_none());

        config.set_ws_port(5003);
        config.set_ws_port(5009);
        config.set_server_url("http://127.0.0.1:5000".into());
        config.set_server_url("http://127.0.0.1:5002".into());

        assert_eq!(config.ws_port(), 5003);
        assert_eq!(config.server_url(), Some("http://127.0.0.1:5000"));
    }
}
