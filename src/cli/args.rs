//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::{net::IpAddr, path::PathBuf};

/// Build pipeline for static sites and browser extensions with hot module reload
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: lumen.toml)
    #[arg(short = 'C', long, default_value = "lumen.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Keep serving and rebuild or hot-patch on change
    #[arg(short, long)]
    pub watch: bool,

    /// Inline critical CSS into written documents (ignored with --watch)
    #[arg(long)]
    pub critical: bool,

    /// Launch `web-ext run` for targets matching the filter after the first build
    #[arg(long, value_name = "TARGETS", num_args = 0..=1, default_missing_value = "all")]
    pub webext: Option<String>,

    /// HTTP port to listen on in watch mode
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
    #[arg(short, long)]
    pub interface: Option<IpAddr>,

    /// Print debug output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbose_short_flag() {
        assert!(Cli::parse_from(["lumen", "-v"]).verbose);
        let err = Cli::try_parse_from(["lumen", "-V"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["lumen"]);
        assert!(!cli.watch);
        assert!(!cli.critical);
        assert_eq!(cli.webext, None);
        assert_eq!(cli.config, PathBuf::from("lumen.toml"));
    }

    #[test]
    fn test_webext_without_value_matches_all() {
        let cli = Cli::parse_from(["lumen", "--watch", "--webext"]);
        assert!(cli.watch);
        assert_eq!(cli.webext.as_deref(), Some("all"));

        let cli = Cli::parse_from(["lumen", "-w", "--webext", "firefox"]);
        assert_eq!(cli.webext.as_deref(), Some("firefox"));
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::parse_from(["lumen", "-p", "8080", "-i", "0.0.0.0", "-C", "site.toml"]);
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.interface, Some("0.0.0.0".parse().unwrap()));
        assert_eq!(cli.config, PathBuf::from("site.toml"));
    }
}
