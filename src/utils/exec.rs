//! Running the external tools lumen drives: `critical`, `mkcert`, `web-ext`
//! and the programs behind command plugins.
//!
//! ```ignore
//! let output = Cmd::new("critical").args(["--base", "build", "--inline"]).stdin(html).quiet().run()?;
//! let child = Cmd::from_slice(&["web-ext", "run"]).cwd(root).spawn()?;
//! ```

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use thiserror::Error;

use crate::log;

static ANSI_ESCAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").ok());

/// A tool exited unsuccessfully.
#[derive(Debug, Error)]
#[error("`{program}` exited with {status}{detail}")]
pub struct CommandFailed {
    pub program: String,
    pub status: ExitStatus,
    /// Cleaned stderr, prefixed with a newline when present.
    detail: String,
}

pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    envs: Vec<(OsString, OsString)>,
    input: Option<Vec<u8>>,
    echo_stderr: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_owned(),
            args: Vec::new(),
            cwd: None,
            envs: Vec::new(),
            input: None,
            echo_stderr: true,
        }
    }

    /// First element is the program, the rest are leading arguments.
    /// An empty slice yields a command that fails to start.
    pub fn from_slice<S: AsRef<OsStr>>(argv: &[S]) -> Self {
        match argv.split_first() {
            Some((program, rest)) => Self::new(program).args(rest),
            None => Self::new(""),
        }
    }

    /// Empty arguments are dropped.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        let arg = arg.as_ref();
        if !arg.is_empty() {
            self.args.push(arg.to_owned());
        }
        self
    }

    pub fn args<I, S>(self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        args.into_iter().fold(self, Cmd::arg)
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.envs.extend(
            vars.into_iter()
                .map(|(k, v)| (k.as_ref().to_owned(), v.as_ref().to_owned())),
        );
        self
    }

    /// Bytes written to the child's stdin.
    pub fn stdin(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.input = Some(data.into());
        self
    }

    /// Don't forward stderr of a successful run to the log.
    pub fn quiet(mut self) -> Self {
        self.echo_stderr = false;
        self
    }

    fn name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).envs(self.envs.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command
    }

    /// Run to completion and capture stdout and stderr.
    ///
    /// A non-zero exit is a [`CommandFailed`] error.
    pub fn run(self) -> Result<Output> {
        let name = self.name();
        let mut child = self
            .command()
            .stdin(if self.input.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start `{name}`"))?;

        if let (Some(mut pipe), Some(input)) = (child.stdin.take(), self.input) {
            pipe.write_all(&input)
                .with_context(|| format!("failed to write to `{name}`"))?;
        }

        let output = child
            .wait_with_output()
            .with_context(|| format!("failed to wait for `{name}`"))?;
        let stderr = clean(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let detail = if stderr.is_empty() {
                String::new()
            } else {
                format!("\n{stderr}")
            };
            return Err(CommandFailed {
                program: name,
                status: output.status,
                detail,
            }
            .into());
        }

        if self.echo_stderr && !stderr.is_empty() {
            log!(&name; "{}", stderr);
        }
        Ok(output)
    }

    /// Start a long-running child that shares the terminal.
    pub fn spawn(self) -> Result<Child> {
        let name = self.name();
        self.command()
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to start `{name}`"))
    }
}

/// Strip terminal escapes and blank lines from tool output.
fn clean(text: &str) -> String {
    let plain = match ANSI_ESCAPE.as_ref() {
        Some(re) => re.replace_all(text, ""),
        None => Cow::Borrowed(text),
    };
    plain
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
