//! In-memory toolchain for tests.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::toolchain::{CompileInput, Compiled, Toolchain};

/// Echoes sources back unchanged and fails on chosen paths.
#[derive(Default)]
pub struct FakeToolchain {
    failing: Mutex<FxHashSet<PathBuf>>,
    compiled: Mutex<Vec<PathBuf>>,
}

impl FakeToolchain {
    pub fn fail_on(&self, path: impl Into<PathBuf>) {
        self.failing.lock().insert(path.into());
    }

    /// Paths compiled so far, in call order.
    pub fn compiled(&self) -> Vec<PathBuf> {
        self.compiled.lock().clone()
    }

    fn compile(&self, input: CompileInput) -> Result<Compiled> {
        if self.failing.lock().contains(&input.path) {
            bail!("{}:1:1: unexpected token", input.path.display());
        }
        self.compiled.lock().push(input.path);
        Ok(Compiled {
            code: input.code,
            ..Compiled::default()
        })
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn compile_script(&self, input: CompileInput) -> Result<Compiled> {
        self.compile(input)
    }

    async fn compile_style(&self, input: CompileInput) -> Result<Compiled> {
        self.compile(input)
    }

    async fn minify_html(&self, html: String) -> Result<String> {
        Ok(html.lines().map(str::trim).collect())
    }

    async fn inline_critical(&self, _html: String, _base: &Path) -> Result<Option<String>> {
        Ok(None)
    }
}
