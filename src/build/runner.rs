//! Build task runner.
//!
//! One pass builds every entry document concurrently. A failing document is
//! logged and skipped; the pass always waits for every document before
//! firing `build_end` on the plugins.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tokio::task::JoinSet;

use super::document::{Element, HtmlDocument};
use super::entry::{self, AssetKind, AssetRef, EntryDocument};
use super::error::BuildError;
use super::graph::AssetGraph;
use super::toolchain::{CompileInput, Compiled, Toolchain};
use crate::config::LumenConfig;
use crate::logger::BuildProgress;
use crate::plugin::PluginHost;
use crate::{debug, log};

/// Outcome of one build pass.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub built: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct Builder {
    config: Arc<LumenConfig>,
    toolchain: Arc<dyn Toolchain>,
    plugins: Arc<PluginHost>,
    graph: Arc<AssetGraph>,
}

impl Builder {
    pub fn new(
        config: Arc<LumenConfig>,
        toolchain: Arc<dyn Toolchain>,
        plugins: Arc<PluginHost>,
        graph: Arc<AssetGraph>,
    ) -> Self {
        Self {
            config,
            toolchain,
            plugins,
            graph,
        }
    }

    pub fn config(&self) -> &Arc<LumenConfig> {
        &self.config
    }

    pub fn graph(&self) -> &Arc<AssetGraph> {
        &self.graph
    }

    /// Build every entry, then notify plugins.
    pub async fn build_all(&self, entries: &[PathBuf], rebuild: bool) -> BuildReport {
        let progress = (!rebuild).then(|| BuildProgress::new(entries.len()));

        let mut tasks = JoinSet::new();
        for entry in entries {
            let builder = self.clone();
            let entry = entry.clone();
            tasks.spawn(async move {
                let result = builder.build_document(&entry).await;
                (entry, result)
            });
        }

        let mut report = BuildReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((entry, Ok(_))) => {
                    if let Some(progress) = &progress {
                        progress.built();
                    }
                    report.built.push(entry);
                }
                Ok((entry, Err(e))) => {
                    if let Some(progress) = &progress {
                        progress.failed();
                    }
                    let message = format!("{:#}", anyhow::Error::from(e));
                    log!("error"; "{}", message);
                    report.failed.push((entry, message));
                }
                Err(e) => log!("error"; "document build task failed: {}", e),
            }
        }
        if let Some(progress) = progress {
            progress.finish();
        }

        report.built.sort();
        self.plugins.build_end(rebuild).await;
        report
    }

    /// Build a single entry. Returns the written HTML, or `None` on failure.
    #[cfg(test)]
    pub async fn build_one(&self, file: &Path) -> Option<String> {
        match self.build_document(file).await {
            Ok(html) => Some(html),
            Err(e) => {
                log!("error"; "{:#}", anyhow::Error::from(e));
                None
            }
        }
    }

    async fn build_document(&self, source: &Path) -> Result<String, BuildError> {
        let build = &self.config.build;
        let mode = self.config.mode;

        let html = tokio::fs::read_to_string(source)
            .await
            .map_err(|e| BuildError::Read(source.to_path_buf(), e))?;
        let mut doc = HtmlDocument::parse(html)
            .map_err(|e| BuildError::Parse(source.to_path_buf(), e.to_string()))?;
        let output = entry::output_path(source, &build.source, &build.output).ok_or_else(|| {
            BuildError::Parse(source.to_path_buf(), "outside of the source directory".into())
        })?;

        let entry = self.extract_entry(&doc, source, output);
        self.graph.record(&entry);

        self.compile_assets(&entry).await?;
        rewrite_references(&mut doc, &entry);
        self.compile_inline(&mut doc, source).await?;

        self.plugins.mutate_document(&mut doc, &entry).await;

        let mut html = doc.into_html();
        if mode.minify {
            match self.toolchain.minify_html(html.clone()).await {
                Ok(minified) => html = minified,
                Err(e) => log!("warning"; "{}: html minify failed: {:#}", source.display(), e),
            }
        }
        if mode.critical {
            let base = entry.output.parent().unwrap_or(&build.output);
            match self.toolchain.inline_critical(html.clone(), base).await {
                Ok(Some(inlined)) => html = inlined,
                Ok(None) => {}
                Err(e) => log!("warning"; "{}: critical css failed: {:#}", source.display(), e),
            }
        }

        write_file(&entry.output, &html).await?;
        debug!("build"; "wrote {}", entry.output.display());
        Ok(html)
    }

    fn extract_entry(&self, doc: &HtmlDocument, source: &Path, output: PathBuf) -> EntryDocument {
        let build = &self.config.build;
        let resolve = |kind, raw: &str, is_module| {
            entry::asset_ref(kind, raw, is_module, source, &build.source, &build.output)
        };

        let scripts = doc
            .elements("script")
            .iter()
            .filter_map(|el| {
                let src = el.attr("src")?;
                resolve(AssetKind::Script, src, el.attr("type") == Some("module"))
            })
            .collect();

        let styles = doc
            .elements("link")
            .iter()
            .filter(|el| is_stylesheet_link(el))
            .filter_map(|el| resolve(AssetKind::Style, el.attr("href")?, false))
            .collect();

        EntryDocument {
            source: source.to_path_buf(),
            output,
            scripts,
            styles,
        }
    }

    /// Compile every referenced asset concurrently.
    async fn compile_assets(&self, entry: &EntryDocument) -> Result<(), BuildError> {
        let mut seen = FxHashSet::default();
        let mut tasks = JoinSet::new();
        for asset in entry.assets().filter(|a| seen.insert(a.source.clone())) {
            let asset = asset.clone();
            let toolchain = Arc::clone(&self.toolchain);
            let minify = self.config.mode.minify;
            tasks.spawn(async move {
                let result = compile_asset(toolchain.as_ref(), &asset, minify).await;
                (asset.source, result)
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let (path, result) = match joined {
                Ok(done) => done,
                Err(e) => {
                    log!("error"; "asset compile task failed: {}", e);
                    continue;
                }
            };
            if let Err(source) = result
                && first_error.is_none()
            {
                first_error = Some(BuildError::Compile {
                    document: entry.source.clone(),
                    path,
                    source,
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Compile inline `<script>` and `<style>` blocks in place.
    async fn compile_inline(&self, doc: &mut HtmlDocument, source: &Path) -> Result<(), BuildError> {
        let minify = self.config.mode.minify;
        let mut edits = Vec::new();

        let scripts = doc.elements("script");
        let styles = doc.elements("style");
        let blocks = scripts
            .iter()
            .filter(|el| is_inline_script(el))
            .map(|el| (el, AssetKind::Script))
            .chain(styles.iter().map(|el| (el, AssetKind::Style)));

        for (index, (el, kind)) in blocks.enumerate() {
            if el.inner.trim().is_empty() {
                continue;
            }
            let ext = if kind == AssetKind::Script { "ts" } else { "css" };
            let input = CompileInput {
                path: PathBuf::from(format!("{}#{index}.{ext}", source.display())),
                code: el.inner.clone(),
                is_module: el.attr("type") == Some("module"),
                minify,
            };
            let compiled = match kind {
                AssetKind::Script => self.toolchain.compile_script(input).await,
                AssetKind::Style => self.toolchain.compile_style(input).await,
            }
            .map_err(|e| BuildError::Compile {
                document: source.to_path_buf(),
                path: source.to_path_buf(),
                source: e,
            })?;
            report_diagnostics(&compiled);
            edits.push((el.inner_span.clone(), compiled.code.trim_end().to_string()));
        }

        doc.splice(edits);
        Ok(())
    }
}

/// Compile one referenced asset to its output path.
pub async fn compile_asset(
    toolchain: &dyn Toolchain,
    asset: &AssetRef,
    minify: bool,
) -> anyhow::Result<Compiled> {
    use anyhow::Context;

    let code = tokio::fs::read_to_string(&asset.source)
        .await
        .with_context(|| format!("failed to read `{}`", asset.source.display()))?;
    let input = CompileInput {
        path: asset.source.clone(),
        code,
        is_module: asset.is_module,
        minify,
    };
    let compiled = match asset.kind {
        AssetKind::Script => toolchain.compile_script(input).await?,
        AssetKind::Style => toolchain.compile_style(input).await?,
    };
    report_diagnostics(&compiled);

    let mut code = compiled.code.clone();
    if let Some(map) = &compiled.map {
        let map_path = PathBuf::from(format!("{}.map", asset.output.display()));
        write_file(&map_path, map).await?;
        if let Some(name) = map_path.file_name() {
            code.push_str(&format!("\n//# sourceMappingURL={}\n", name.to_string_lossy()));
        }
    }
    write_file(&asset.output, &code).await?;
    Ok(compiled)
}

/// Remove the output directory before the first build.
pub fn clean_output_dir(output: &Path) -> anyhow::Result<()> {
    use anyhow::Context;

    if output.exists() {
        std::fs::remove_dir_all(output)
            .with_context(|| format!("failed to clean `{}`", output.display()))?;
        debug!("build"; "cleaned {}", output.display());
    }
    Ok(())
}

async fn write_file(path: &Path, contents: &str) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BuildError::Write(path.to_path_buf(), e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| BuildError::Write(path.to_path_buf(), e))
}

fn report_diagnostics(compiled: &Compiled) {
    for diagnostic in &compiled.diagnostics {
        log!("warning"; "{}", diagnostic);
    }
}

/// Point references whose output extension changed at the compiled file.
fn rewrite_references(doc: &mut HtmlDocument, entry: &EntryDocument) {
    for asset in entry.assets() {
        let rewritten = asset.rewritten();
        if rewritten == asset.raw {
            continue;
        }
        let (tag, attr) = match asset.kind {
            AssetKind::Script => ("script", "src"),
            AssetKind::Style => ("link", "href"),
        };
        if let Some(el) = doc
            .elements(tag)
            .into_iter()
            .find(|el| el.attr(attr) == Some(asset.raw.as_str()))
        {
            doc.set_attr(&el, attr, &rewritten);
        }
    }
}

fn is_stylesheet_link(el: &Element) -> bool {
    el.attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("stylesheet")))
}

/// Inline scripts holding JavaScript or TypeScript (not JSON, import maps, templates).
fn is_inline_script(el: &Element) -> bool {
    !el.has_attr("src")
        && match el.attr("type").map(str::to_ascii_lowercase).as_deref() {
            None | Some("" | "module" | "text/javascript" | "application/javascript") => true,
            Some("text/typescript" | "ts") => true,
            _ => false,
        }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(html: &str, tag: &str) -> Element {
        HtmlDocument::parse(html).unwrap().elements(tag).remove(0)
    }

    #[test]
    fn test_is_inline_script() {
        assert!(is_inline_script(&element("<script>a()</script>", "script")));
        assert!(is_inline_script(&element("<script type=\"module\">a()</script>", "script")));
        assert!(!is_inline_script(&element("<script src=\"a.js\"></script>", "script")));
        assert!(!is_inline_script(&element(
            "<script type=\"application/ld+json\">{}</script>",
            "script"
        )));
        assert!(!is_inline_script(&element("<script type=\"importmap\">{}</script>", "script")));
    }

    #[test]
    fn test_is_stylesheet_link() {
        assert!(is_stylesheet_link(&element("<link rel=\"stylesheet\" href=\"a.css\">", "link")));
        assert!(is_stylesheet_link(&element("<link rel=\"preload stylesheet\" href=\"a.css\">", "link")));
        assert!(!is_stylesheet_link(&element("<link rel=\"icon\" href=\"a.png\">", "link")));
    }

    #[test]
    fn test_rewrite_references() {
        let mut doc = HtmlDocument::parse(
            r#"<script type="module" src="./app.ts"></script><script src="./b.js"></script>"#,
        )
        .unwrap();
        let src = Path::new("/s");
        let out = Path::new("/o");
        let doc_path = Path::new("/s/index.html");
        let entry = EntryDocument {
            source: doc_path.into(),
            output: "/o/index.html".into(),
            scripts: vec![
                entry::asset_ref(AssetKind::Script, "./app.ts", true, doc_path, src, out).unwrap(),
                entry::asset_ref(AssetKind::Script, "./b.js", false, doc_path, src, out).unwrap(),
            ],
            styles: Vec::new(),
        };
        rewrite_references(&mut doc, &entry);
        assert_eq!(
            doc.as_str(),
            r#"<script type="module" src="./app.js"></script><script src="./b.js"></script>"#
        );
    }
}
