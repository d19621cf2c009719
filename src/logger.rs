//! Terminal output.
//!
//! - `log!` / `debug!` print one line under a colored `[module]` tag
//! - [`BuildProgress`] keeps a live `[build] 3/12 documents` line at the bottom
//!   while the first build runs
//! - the status block (`status_success`, `status_error`, `status_warning`) is
//!   what watch mode prints after each rebuild or hot update; each new status
//!   replaces the previous one
//!
//! ```ignore
//! log!("serve"; "http://localhost:{}", port);
//! debug!("hmr"; "client {} left", id);
//! status_error("failed: src/index.html", &format!("{err:#}"));
//! ```

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Text of the live progress line, if one is on screen.
static PROGRESS: Mutex<Option<String>> = Mutex::new(None);

/// Lines printed by the last status, erased by the next one.
static STATUS_HEIGHT: Mutex<usize> = Mutex::new(0);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Log a message under a colored module tag.
///
/// ```ignore
/// log!("build"; "wrote {}", path.display());
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Like `log!`, only printed with `--verbose`.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let progress = PROGRESS.lock();
    let mut out = stdout().lock();

    if progress.is_some() {
        execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
    }
    writeln!(out, "{} {message}", tag(module)).ok();
    if let Some(line) = progress.as_deref() {
        write!(out, "{line}").ok();
    }
    out.flush().ok();

    // Anything logged after a status pushes it out of reach
    *STATUS_HEIGHT.lock() = 0;
}

fn tag(module: &str) -> String {
    let tag = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "serve" | "ws" => tag.bright_blue().bold().to_string(),
        "watch" | "hmr" => tag.bright_green().bold().to_string(),
        "plugin" | "webext" => tag.bright_cyan().bold().to_string(),
        "error" => tag.bright_red().bold().to_string(),
        "warning" => tag.bright_magenta().bold().to_string(),
        _ => tag.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Status block
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success,
    Failure,
    Warning,
}

impl Outcome {
    fn glyph(self) -> String {
        match self {
            Self::Success => "✓".green().to_string(),
            Self::Failure => "✗".red().to_string(),
            Self::Warning => "⚠".yellow().to_string(),
        }
    }
}

/// `summary` plus an optional multi-line `detail` (compiler output).
fn status_text(summary: &str, detail: &str) -> String {
    if detail.is_empty() {
        summary.to_string()
    } else {
        format!("{summary}\n{detail}")
    }
}

fn show_status(outcome: Outcome, text: &str) {
    let mut height = STATUS_HEIGHT.lock();
    let mut out = stdout().lock();

    if *height > 0 {
        #[allow(clippy::cast_possible_truncation)]
        execute!(out, cursor::MoveUp(*height as u16), Clear(ClearType::FromCursorDown)).ok();
    }
    let stamp = format!("[{}]", clock(SystemTime::now())).dimmed().to_string();
    writeln!(out, "{stamp} {} {text}", outcome.glyph()).ok();
    out.flush().ok();

    *height = line_count(text);
}

fn line_count(text: &str) -> usize {
    text.lines().count().max(1)
}

/// UTC wall-clock time as `HH:MM:SS`.
fn clock(now: SystemTime) -> String {
    let secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    format!("{:02}:{:02}:{:02}", (secs / 3600) % 24, (secs / 60) % 60, secs % 60)
}

pub fn status_success(message: &str) {
    show_status(Outcome::Success, message);
}

pub fn status_error(summary: &str, detail: &str) {
    show_status(Outcome::Failure, &status_text(summary, detail));
}

pub fn status_warning(message: &str) {
    show_status(Outcome::Warning, message);
}

// ============================================================================
// Build progress
// ============================================================================

/// Live document counter for one build pass.
///
/// Updates are best effort: a caller that finds the terminal busy skips the
/// redraw, the next update catches up.
pub struct BuildProgress {
    total: usize,
    done: AtomicUsize,
    failed: AtomicUsize,
}

impl BuildProgress {
    pub fn new(total: usize) -> Self {
        let progress = Self {
            total,
            done: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        };
        progress.redraw();
        progress
    }

    /// One document was written.
    pub fn built(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.redraw();
    }

    /// One document failed; its error is logged separately.
    pub fn failed(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.redraw();
    }

    fn render(&self) -> String {
        let done = self.done.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let mut line = format!("{}/{} documents", done, self.total);
        if failed > 0 {
            line.push_str(&format!(" ({failed} failed)"));
        }
        line
    }

    fn redraw(&self) {
        let Some(mut progress) = PROGRESS.try_lock() else {
            return;
        };
        let line = format!("{} {}", tag("build"), self.render());
        let mut out = stdout().lock();
        execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
        write!(out, "{line}").ok();
        out.flush().ok();
        *progress = Some(line);
    }

    /// Leave the final count on screen.
    pub fn finish(self) {
        let mut progress = PROGRESS.lock();
        *progress = None;
        let mut out = stdout().lock();
        execute!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine)).ok();
        writeln!(out, "{} {}", tag("build"), self.render()).ok();
        out.flush().ok();
    }
}
