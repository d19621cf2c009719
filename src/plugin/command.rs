//! User `[[plugins]]`: an external command run after builds, and/or a
//! directory served under a URL prefix.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use rustc_hash::FxHashMap;

use super::{ObservesBuildEnd, Plugin, PluginContext, PluginFactory, Serves};
use crate::config::{CommandPluginConfig, HookPoint, LumenConfig};
use crate::log;
use crate::utils::exec::Cmd;
use crate::utils::mime;
use crate::utils::path::lexical_clean;
use crate::vfs::{VirtualContent, VirtualRequest};

pub struct CommandFactory(pub CommandPluginConfig);

#[async_trait]
impl PluginFactory for CommandFactory {
    fn name(&self) -> &str {
        &self.0.name
    }

    async fn create(&self, ctx: &PluginContext) -> Result<Arc<dyn Plugin>> {
        let settings = self.0.clone();
        if let Some(dir) = &settings.serve_dir
            && !dir.is_dir()
        {
            anyhow::bail!("serve_dir `{}` is not a directory", dir.display());
        }
        if let Some(program) = settings.command.first() {
            which::which(program)
                .or_else(|_| which::which_in(program, std::env::var_os("PATH"), &ctx.config.root))
                .with_context(|| format!("`{program}` not found"))?;
        }
        Ok(Arc::new(CommandPlugin {
            settings,
            config: Arc::clone(&ctx.config),
        }))
    }
}

struct CommandPlugin {
    settings: CommandPluginConfig,
    config: Arc<LumenConfig>,
}

impl Plugin for CommandPlugin {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn as_server(&self) -> Option<&dyn Serves> {
        self.settings.serve_prefix.is_some().then_some(self as &dyn Serves)
    }

    fn as_build_observer(&self) -> Option<&dyn ObservesBuildEnd> {
        (!self.settings.command.is_empty()).then_some(self as &dyn ObservesBuildEnd)
    }
}

#[async_trait]
impl ObservesBuildEnd for CommandPlugin {
    async fn build_end(&self, rebuild: bool) -> Result<()> {
        if self.settings.on == HookPoint::Rebuild && !rebuild {
            return Ok(());
        }

        let vars = build_lumen_vars(&self.config, rebuild);
        let command = resolve_args(&self.settings.command, &vars);
        let root = self.config.root.clone();
        let name = self.settings.name.clone();

        log!(&name; "`{}` running", command.join(" "));
        let output = tokio::task::spawn_blocking(move || {
            Cmd::from_slice(&command)
                .cwd(root)
                .envs(&vars)
                .quiet()
                .run()
        })
        .await??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if !stdout.is_empty() {
            println!("{stdout}");
        }
        Ok(())
    }
}

#[async_trait]
impl Serves for CommandPlugin {
    async fn serve(&self, request: &VirtualRequest) -> Result<Option<VirtualContent>> {
        let (Some(prefix), Some(dir)) = (&self.settings.serve_prefix, &self.settings.serve_dir) else {
            return Ok(None);
        };
        let Some(path) = resolve_served(&request.path, prefix, dir) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(VirtualContent::typed(body, mime::from_path(&path)))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::IsADirectory => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read `{}`", path.display())),
        }
    }
}

/// Map a request path under `prefix` onto a file under `dir`.
///
/// `None` when the path is outside the prefix or escapes the directory.
fn resolve_served(request_path: &str, prefix: &str, dir: &Path) -> Option<PathBuf> {
    let rest = request_path.strip_prefix(prefix.trim_end_matches('/'))?;
    if !(rest.is_empty() || rest.starts_with('/')) {
        return None;
    }
    let decoded = percent_decode_str(rest).decode_utf8().ok()?;
    let relative = decoded.trim_start_matches('/');
    if relative.split('/').any(|part| part == "..") {
        return None;
    }
    let path = lexical_clean(&dir.join(relative));
    path.starts_with(dir).then_some(path)
}

/// `LUMEN_*` variables for command plugins.
pub fn build_lumen_vars(config: &LumenConfig, rebuild: bool) -> FxHashMap<String, String> {
    let mut vars = FxHashMap::default();
    vars.insert("LUMEN_ROOT".into(), config.root.display().to_string());
    vars.insert("LUMEN_SOURCE".into(), config.build.source.display().to_string());
    vars.insert("LUMEN_OUTPUT".into(), config.build.output.display().to_string());
    vars.insert("LUMEN_REBUILD".into(), rebuild.to_string());

    let mode = if config.mode.watch { "watch" } else { "build" };
    vars.insert("LUMEN_MODE".into(), mode.into());
    if let Some(url) = config.server_url() {
        vars.insert("LUMEN_SERVER_URL".into(), url.to_string());
    }
    vars
}

/// Replace `$LUMEN_*` occurrences in command arguments.
pub fn resolve_args(args: &[String], vars: &FxHashMap<String, String>) -> Vec<String> {
    args.iter()
        .map(|arg| {
            let mut result = arg.clone();
            for (key, value) in vars {
                result = result.replace(&format!("${key}"), value);
            }
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::tests::{FakeToolchain, context};
    use tempfile::TempDir;

    #[test]
    fn test_resolve_served() {
        let dir = Path::new("/srv/fixtures");
        assert_eq!(
            resolve_served("/api/users.json", "/api/", dir),
            Some(PathBuf::from("/srv/fixtures/users.json"))
        );
        assert_eq!(
            resolve_served("/api/a%20b.json", "/api", dir),
            Some(PathBuf::from("/srv/fixtures/a b.json"))
        );
        assert_eq!(resolve_served("/apix/users.json", "/api", dir), None);
        assert_eq!(resolve_served("/api/../secret", "/api/", dir), None);
        assert_eq!(resolve_served("/api/%2e%2e/secret", "/api/", dir), None);
        assert_eq!(resolve_served("/other", "/api/", dir), None);
    }

    #[test]
    fn test_resolve_args() {
        let config = LumenConfig::default().resolve(Path::new("/site"));
        let vars = build_lumen_vars(&config, true);
        let args = resolve_args(&["cp".into(), "$LUMEN_OUTPUT/a".into(), "$LUMEN_REBUILD".into()], &vars);
        assert_eq!(args, vec!["cp", "/site/build/a", "true"]);
        assert_eq!(vars["LUMEN_MODE"], "build");
        assert!(!vars.contains_key("LUMEN_SERVER_URL"));
    }

    fn plugin_config(dir: &TempDir, on: HookPoint) -> CommandPluginConfig {
        CommandPluginConfig {
            name: "stamp".into(),
            command: vec![
                "sh".into(),
                "-c".into(),
                "echo $LUMEN_REBUILD >> stamp.txt".into(),
            ],
            on,
            serve_prefix: Some("/fixtures/".into()),
            serve_dir: Some(dir.path().to_path_buf()),
        }
    }

    #[tokio::test]
    async fn test_build_end_hook_points() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeToolchain::default()));

        let every = CommandFactory(plugin_config(&dir, HookPoint::BuildEnd)).create(&ctx).await.unwrap();
        let rebuild_only = CommandFactory(plugin_config(&dir, HookPoint::Rebuild)).create(&ctx).await.unwrap();

        for plugin in [&every, &rebuild_only] {
            plugin.as_build_observer().unwrap().build_end(false).await.unwrap();
        }
        for plugin in [&every, &rebuild_only] {
            plugin.as_build_observer().unwrap().build_end(true).await.unwrap();
        }

        let stamp = std::fs::read_to_string(dir.path().join("stamp.txt")).unwrap();
        assert_eq!(stamp.lines().collect::<Vec<_>>(), vec!["false", "true", "true"]);
    }

    #[tokio::test]
    async fn test_serves_files_under_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("users.json"), "[]").unwrap();
        let ctx = context(dir.path(), Arc::new(FakeToolchain::default()));
        let plugin = CommandFactory(plugin_config(&dir, HookPoint::BuildEnd)).create(&ctx).await.unwrap();
        let server = plugin.as_server().unwrap();

        let hit = server.serve(&VirtualRequest::from_url("/fixtures/users.json")).await.unwrap();
        assert_eq!(hit.unwrap().header("content-type"), Some(mime::types::JSON));

        let miss = server.serve(&VirtualRequest::from_url("/fixtures/none.json")).await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_missing_program_fails_setup() {
        let dir = TempDir::new().unwrap();
        let ctx = context(dir.path(), Arc::new(FakeToolchain::default()));
        let config = CommandPluginConfig {
            name: "broken".into(),
            command: vec!["lumen-no-such-program".into()],
            ..Default::default()
        };
        assert!(CommandFactory(config).create(&ctx).await.is_err());
    }
}
