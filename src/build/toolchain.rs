//! External compilers behind one capability trait.
//!
//! The build runner and the HMR instances only ever see [`Toolchain`]. The
//! default implementation uses oxc for scripts (TypeScript stripping,
//! minification, source maps), lightningcss for stylesheets, minify-html for
//! documents, and the `critical` CLI for critical CSS inlining.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use oxc::allocator::Allocator;
use oxc::codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc::mangler::MangleOptions;
use oxc::minifier::{CompressOptions, Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{TransformOptions, Transformer};

use crate::utils::exec::Cmd;

/// Source handed to a compiler.
#[derive(Debug, Clone)]
pub struct CompileInput {
    /// Real path, or a synthetic one for inline blocks (`index.html#2.ts`).
    pub path: PathBuf,
    pub code: String,
    pub is_module: bool,
    pub minify: bool,
}

/// A compiler message with location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file.display())?;
        if let Some(line) = self.line {
            write!(f, ":{line}")?;
            if let Some(column) = self.column {
                write!(f, ":{column}")?;
            }
        }
        write!(f, ": {}", self.message)
    }
}

/// Compiler output.
#[derive(Debug, Clone, Default)]
pub struct Compiled {
    pub code: String,
    /// Source map JSON, when the compiler produced one.
    pub map: Option<String>,
    /// Non-fatal messages.
    pub diagnostics: Vec<Diagnostic>,
}

#[async_trait]
pub trait Toolchain: Send + Sync {
    async fn compile_script(&self, input: CompileInput) -> Result<Compiled>;

    async fn compile_style(&self, input: CompileInput) -> Result<Compiled>;

    async fn minify_html(&self, html: String) -> Result<String>;

    /// Inline above-the-fold CSS. `Ok(None)` when the tool is unavailable.
    async fn inline_critical(&self, html: String, base: &Path) -> Result<Option<String>>;
}

/// oxc + lightningcss + minify-html + `critical`.
pub struct DefaultToolchain {
    targets: Targets,
    critical_missing: AtomicBool,
}

impl DefaultToolchain {
    /// Build a toolchain for the configured browser matrix.
    pub fn new(browsers: &[String]) -> Result<Self> {
        let targets = match parse_browsers(browsers)? {
            Some(browsers) => Targets::from(browsers),
            None => Targets::default(),
        };
        Ok(Self {
            targets,
            critical_missing: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Toolchain for DefaultToolchain {
    async fn compile_script(&self, input: CompileInput) -> Result<Compiled> {
        tokio::task::spawn_blocking(move || compile_script(&input))
            .await
            .context("script compiler panicked")?
    }

    async fn compile_style(&self, input: CompileInput) -> Result<Compiled> {
        let targets = self.targets;
        tokio::task::spawn_blocking(move || compile_style(&input, targets))
            .await
            .context("style compiler panicked")?
    }

    async fn minify_html(&self, html: String) -> Result<String> {
        let mut cfg = minify_html::Cfg::new();
        cfg.keep_closing_tags = true;
        cfg.keep_html_and_head_opening_tags = true;
        cfg.keep_comments = false;
        // Inline blocks were already compiled
        cfg.minify_css = false;
        cfg.minify_js = false;
        let bytes = minify_html::minify(html.as_bytes(), &cfg);
        String::from_utf8(bytes).context("minified HTML is not UTF-8")
    }

    async fn inline_critical(&self, html: String, base: &Path) -> Result<Option<String>> {
        if which::which("critical").is_err() {
            if !self.critical_missing.swap(true, Ordering::Relaxed) {
                crate::log!("warning"; "`critical` not found in PATH, skipping critical CSS");
            }
            return Ok(None);
        }

        let base = base.to_path_buf();
        let output = tokio::task::spawn_blocking(move || {
            Cmd::new("critical")
                .arg("--base")
                .arg(&base)
                .arg("--inline")
                .stdin(html)
                .quiet()
                .run()
        })
        .await
        .context("critical runner panicked")??;

        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

/// Transpile (and in production minify) one script.
pub fn compile_script(input: &CompileInput) -> Result<Compiled> {
    let allocator = Allocator::default();
    let source_type = SourceType::from_path(&input.path)
        .unwrap_or_else(|_| SourceType::ts())
        .with_module(true);

    let parsed = Parser::new(&allocator, &input.code, source_type).parse();
    if !parsed.errors.is_empty() {
        bail!(join_errors(&input.path, parsed.errors.iter()));
    }
    let mut program = parsed.program;

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let transformed = Transformer::new(&allocator, &input.path, &TransformOptions::default())
        .build_with_scoping(scoping, &mut program);
    if !transformed.errors.is_empty() {
        bail!(join_errors(&input.path, transformed.errors.iter()));
    }

    let scoping = if input.minify {
        let options = MinifierOptions {
            mangle: Some(MangleOptions::default()),
            compress: Some(CompressOptions::smallest()),
        };
        Minifier::new(options).minify(&allocator, &mut program).scoping
    } else {
        None
    };

    let generated = Codegen::new()
        .with_options(CodegenOptions {
            minify: input.minify,
            comments: if input.minify {
                CommentOptions::disabled()
            } else {
                CommentOptions::default()
            },
            source_map_path: (!input.minify).then(|| input.path.clone()),
            ..CodegenOptions::default()
        })
        .with_scoping(scoping)
        .build(&program);

    Ok(Compiled {
        code: generated.code,
        map: generated.map.map(|m| m.to_json_string()),
        diagnostics: Vec::new(),
    })
}

/// Lower (and in production minify) one stylesheet for `targets`.
pub fn compile_style(input: &CompileInput, targets: Targets) -> Result<Compiled> {
    let options = ParserOptions {
        filename: input.path.display().to_string(),
        ..ParserOptions::default()
    };
    let mut sheet = StyleSheet::parse(&input.code, options).map_err(|e| {
        let diagnostic = Diagnostic {
            file: input.path.clone(),
            line: e.loc.as_ref().map(|l| l.line + 1),
            column: e.loc.as_ref().map(|l| l.column),
            message: e.kind.to_string(),
        };
        anyhow!("{diagnostic}")
    })?;

    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| anyhow!("{}: {}", input.path.display(), e))?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify: input.minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| anyhow!("{}: {}", input.path.display(), e))?;

    Ok(Compiled {
        code: printed.code,
        map: None,
        diagnostics: Vec::new(),
    })
}

fn join_errors<E: fmt::Display>(path: &Path, errors: impl Iterator<Item = E>) -> String {
    errors
        .map(|e| format!("{}: {}", path.display(), e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parse `["chrome 100", "safari 15.4"]` into lightningcss browser versions.
pub fn parse_browsers(entries: &[String]) -> Result<Option<Browsers>> {
    if entries.is_empty() {
        return Ok(None);
    }

    let mut browsers = Browsers::default();
    for entry in entries {
        let mut parts = entry.split_whitespace();
        let (Some(name), Some(version), None) = (parts.next(), parts.next(), parts.next()) else {
            bail!("invalid browser target `{entry}`, expected `<name> <version>`");
        };
        let version = encode_version(version)
            .ok_or_else(|| anyhow!("invalid version in browser target `{entry}`"))?;

        let slot = match name.to_ascii_lowercase().as_str() {
            "android" => &mut browsers.android,
            "chrome" => &mut browsers.chrome,
            "edge" => &mut browsers.edge,
            "firefox" => &mut browsers.firefox,
            "ie" => &mut browsers.ie,
            "ios" | "ios_saf" => &mut browsers.ios_saf,
            "opera" => &mut browsers.opera,
            "safari" => &mut browsers.safari,
            "samsung" => &mut browsers.samsung,
            other => bail!("unknown browser `{other}` in `{entry}`"),
        };
        *slot = Some(slot.map_or(version, |v: u32| v.min(version)));
    }
    Ok(Some(browsers))
}

/// `major[.minor[.patch]]` → `major << 16 | minor << 8 | patch`.
fn encode_version(version: &str) -> Option<u32> {
    let mut parts = version.split('.').map(str::parse::<u32>);
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    (minor < 256 && patch < 256).then_some((major << 16) | (minor << 8) | patch)
}
