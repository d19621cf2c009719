//! Build task runner and the pieces it drives.
//!
//! ```text
//! crawl ─> EntryDocument ─> compile scripts/styles ─> plugin mutations ─> minify ─> write
//!                 │
//!                 └─> AssetGraph (read by HMR instances)
//! ```

mod document;
mod entry;
mod error;
mod graph;
mod runner;
mod toolchain;

#[cfg(test)]
pub mod fake;

pub use document::{Element, HtmlDocument};
pub use entry::{AssetKind, AssetRef, EntryDocument, crawl, is_entry, output_path};
pub use error::BuildError;
pub use graph::AssetGraph;
pub use runner::{BuildReport, Builder, clean_output_dir, compile_asset};
pub use toolchain::{CompileInput, Compiled, DefaultToolchain, Diagnostic, Toolchain};
