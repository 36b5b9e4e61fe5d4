//! Invariant backed by an external command.
//!
//! Every check writes the trial texts into a fresh temporary directory and
//! runs the command there. Arguments may refer to the trial through two
//! placeholders:
//!
//! - `{dir}`: the temporary directory
//! - `{files}`: the materialized files; a bare `{files}` argument expands to
//!   one argument per file, anywhere else it becomes a space-separated list
//!
//! ```rust,ignore
//! let invariant = ProcessInvariant::new("rustc", Acceptance::OutputMatches(Regex::new("internal compiler error")?))
//!     .with_args(["--crate-type=lib", "{files}"])
//!     .with_timeout(Duration::from_secs(30));
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{trace, warn};

use crate::context::InvariantContext;
use crate::error::{MinimizerError, Result};
use crate::traits::Invariant;

const DIR_PLACEHOLDER: &str = "{dir}";
const FILES_PLACEHOLDER: &str = "{files}";

/// When a command run counts as "the property still holds".
#[derive(Debug, Clone)]
pub enum Acceptance {
    /// The command exits with this code.
    ExitCode(i32),
    /// Stdout or stderr contains a match.
    OutputMatches(Regex),
}

impl Acceptance {
    fn accepts(&self, code: Option<i32>, stdout: &[u8], stderr: &[u8]) -> bool {
        match self {
            Self::ExitCode(expected) => code == Some(*expected),
            Self::OutputMatches(pattern) => {
                pattern.is_match(&String::from_utf8_lossy(stdout))
                    || pattern.is_match(&String::from_utf8_lossy(stderr))
            }
        }
    }
}

/// What a finished command run produced.
struct RunOutput {
    code: Option<i32>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

/// Counters kept across checks.
#[derive(Debug, Clone, Default)]
pub struct ProcessStats {
    pub runs: usize,
    pub accepted: usize,
    pub timeouts: usize,
    pub total_time: Duration,
}

/// Runs a command against each trial.
#[derive(Debug)]
pub struct ProcessInvariant {
    /// Program to execute.
    program: PathBuf,

    /// Arguments, possibly containing placeholders.
    args: Vec<String>,

    acceptance: Acceptance,

    /// Per-run limit; an expired run counts as not accepted.
    timeout: Option<Duration>,

    stats: ProcessStats,
}

impl ProcessInvariant {
    pub fn new(program: impl Into<PathBuf>, acceptance: Acceptance) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            acceptance,
            timeout: None,
            stats: ProcessStats::default(),
        }
    }

    /// Set the command arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn stats(&self) -> &ProcessStats {
        &self.stats
    }

    /// Expands placeholders against one materialized trial.
    fn expand_args(&self, dir: &Path, files: &[PathBuf]) -> Vec<String> {
        let dir = dir.display().to_string();
        let joined = files
            .iter()
            .map(|f| f.display().to_string())
            .collect::<Vec<_>>()
            .join(" ");

        let mut expanded = Vec::with_capacity(self.args.len() + files.len());
        for arg in &self.args {
            if arg == FILES_PLACEHOLDER {
                expanded.extend(files.iter().map(|f| f.display().to_string()));
            } else {
                expanded.push(
                    arg.replace(DIR_PLACEHOLDER, &dir)
                        .replace(FILES_PLACEHOLDER, &joined),
                );
            }
        }
        expanded
    }

    fn build_command(&self, dir: &Path, files: &[PathBuf]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.expand_args(dir, files));
        cmd.current_dir(dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Runs the command once. `None` means it timed out and was killed.
    async fn run(&self, dir: &Path, files: &[PathBuf]) -> Result<Option<RunOutput>> {
        let mut child = self.build_command(dir, files).spawn().map_err(|e| {
            MinimizerError::Invariant(format!(
                "failed to start {}: {}",
                self.program.display(),
                e
            ))
        })?;

        let mut stdout = child.stdout.take();
        let stdout_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut out) = stdout {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });
        let mut stderr = child.stderr.take();
        let stderr_handle = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(ref mut err) = stderr {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match self.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!(program = %self.program.display(), timeout = ?limit, "Invariant command timed out, killing");
                    let _ = child.kill().await;
                    stdout_handle.abort();
                    stderr_handle.abort();
                    return Ok(None);
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| MinimizerError::Invariant(format!("failed to wait for {}: {}", self.program.display(), e)))?;

        let stdout = stdout_handle.await.unwrap_or_default();
        let stderr = stderr_handle.await.unwrap_or_default();
        Ok(Some(RunOutput {
            code: status.code(),
            stdout,
            stderr,
        }))
    }
}

#[async_trait]
impl Invariant for ProcessInvariant {
    fn name(&self) -> &str {
        "process"
    }

    async fn check_is_satisfied(&mut self, ctx: &InvariantContext<'_>) -> Result<bool> {
        let dir = tempfile::tempdir().map_err(|e| MinimizerError::io(std::env::temp_dir(), e))?;
        let files = ctx.materialize_scratch(dir.path()).await?;

        let started = Instant::now();
        let outcome = self.run(dir.path(), &files).await?;
        self.stats.runs += 1;
        self.stats.total_time += started.elapsed();

        let accepted = match outcome {
            Some(output) => {
                let accepted = self
                    .acceptance
                    .accepts(output.code, &output.stdout, &output.stderr);
                trace!(
                    code = ?output.code,
                    stdout_bytes = output.stdout.len(),
                    stderr_bytes = output.stderr.len(),
                    accepted,
                    "Invariant command finished"
                );
                accepted
            }
            None => {
                self.stats.timeouts += 1;
                false
            }
        };
        if accepted {
            self.stats.accepted += 1;
        }
        Ok(accepted)
    }

    fn print_statistics(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "Invariant '{}' ({}): {} runs, {} accepted, {} timed out, {:?} total",
            self.name(),
            self.program.display(),
            self.stats.runs,
            self.stats.accepted,
            self.stats.timeouts,
            self.stats.total_time
        )
    }
}
