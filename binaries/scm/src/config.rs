//! Command-line configuration.
//!
//! Settings come from an optional TOML file and are then overridden by CLI
//! arguments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use regex::Regex;
use scm_minimizer::{
    Acceptance, DdminStrategy, FileMapping, GreedyStrategy, Invariant, MinimizerConfig,
    ParseableInvariant, ProcessInvariant, Strategy,
};
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScmConfig {
    /// Engine settings.
    pub minimizer: MinimizerConfig,

    /// Files to minimize, as input/working-copy pairs.
    pub files: Vec<FileMapping>,

    /// Node-selection strategy.
    pub strategy: StrategyConfig,

    /// Acceptance predicate.
    pub invariant: InvariantConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Available strategies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Greedy,
    #[default]
    Ddmin,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self.kind {
            StrategyKind::Greedy => Box::new(GreedyStrategy::new()),
            StrategyKind::Ddmin => Box::new(DdminStrategy::new()),
        }
    }
}

/// Available invariants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum InvariantKind {
    /// Every file still parses.
    #[default]
    Parseable,
    /// `command` exits with `exit_code`.
    ExitCode,
    /// `command`'s output matches `pattern`.
    OutputMatches,
}

/// Invariant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvariantConfig {
    pub kind: InvariantKind,

    /// Program to run for the process-backed kinds.
    pub command: Option<String>,

    /// Arguments; `{dir}` and `{files}` are expanded per check.
    pub args: Vec<String>,

    /// Expected exit code for `exit-code`.
    pub exit_code: i32,

    /// Regular expression for `output-matches`.
    pub pattern: Option<String>,

    /// Kill the command after this many seconds.
    pub timeout_secs: Option<u64>,
}

impl Default for InvariantConfig {
    fn default() -> Self {
        Self {
            kind: InvariantKind::Parseable,
            command: None,
            args: Vec::new(),
            exit_code: 0,
            pattern: None,
            timeout_secs: None,
        }
    }
}

impl InvariantConfig {
    /// Returns the command timeout as a Duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    fn command(&self) -> anyhow::Result<&str> {
        self.command
            .as_deref()
            .with_context(|| format!("Invariant '{:?}' requires a command", self.kind))
    }

    fn acceptance(&self) -> anyhow::Result<Option<Acceptance>> {
        Ok(match self.kind {
            InvariantKind::Parseable => None,
            InvariantKind::ExitCode => Some(Acceptance::ExitCode(self.exit_code)),
            InvariantKind::OutputMatches => {
                let pattern = self
                    .pattern
                    .as_deref()
                    .context("Invariant 'output-matches' requires a pattern")?;
                let regex = Regex::new(pattern)
                    .with_context(|| format!("Invalid output pattern: {}", pattern))?;
                Some(Acceptance::OutputMatches(regex))
            }
        })
    }

    pub fn build(&self) -> anyhow::Result<Box<dyn Invariant>> {
        let Some(acceptance) = self.acceptance()? else {
            return Ok(Box::new(ParseableInvariant::new()));
        };
        let mut invariant =
            ProcessInvariant::new(self.command()?, acceptance).with_args(self.args.iter().cloned());
        if let Some(timeout) = self.timeout() {
            invariant = invariant.with_timeout(timeout);
        }
        Ok(Box::new(invariant))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ScmConfig {
    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) {
        // Files on the command line replace the configured ones
        if !args.files.is_empty() {
            self.files = args.files.clone();
        }

        if let Some(kind) = args.strategy {
            self.strategy.kind = kind;
        }

        if let Some(kind) = args.invariant {
            self.invariant.kind = kind;
        }
        if let Some(ref command) = args.command {
            self.invariant.command = Some(command.clone());
        }
        if !args.args.is_empty() {
            self.invariant.args = args.args.clone();
        }
        if let Some(code) = args.exit_code {
            self.invariant.exit_code = code;
        }
        if let Some(ref pattern) = args.pattern {
            self.invariant.pattern = Some(pattern.clone());
        }
        if let Some(secs) = args.timeout_secs {
            self.invariant.timeout_secs = Some(secs);
        }

        if let Some(interval) = args.cleanup_interval {
            self.minimizer.cleanup_interval = interval;
        }
        if let Some(max) = args.max_passes {
            self.minimizer.max_passes = Some(max);
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        // Validate log format
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        self.minimizer.validate()?;

        if self.files.is_empty() {
            anyhow::bail!("No input files given");
        }
        for mapping in &self.files {
            if !mapping.input.exists() {
                anyhow::bail!("Input file not found: {}", mapping.input.display());
            }
        }
        FileMapping::check_distinct(&self.files)?;

        if self.invariant.kind != InvariantKind::Parseable {
            self.invariant.command()?;
        }
        self.invariant.acceptance()?;
        if self.invariant.timeout_secs == Some(0) {
            anyhow::bail!("Invariant timeout must be positive");
        }

        Ok(())
    }
}

/// Parses `INPUT:OUTPUT`.
pub fn parse_file_mapping(value: &str) -> Result<FileMapping, String> {
    match value.split_once(':') {
        Some((input, output)) if !input.is_empty() && !output.is_empty() => {
            Ok(FileMapping::new(PathBuf::from(input), PathBuf::from(output)))
        }
        _ => Err(format!("expected INPUT:OUTPUT, got '{}'", value)),
    }
}
