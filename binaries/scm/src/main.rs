//! scm - hierarchical source-code minimizer.
//!
//! Shrinks one or more source files while an invariant keeps holding, e.g.
//! while a compiler still reports the same internal error. Each input is
//! copied to its output path and minimized there; the inputs are never
//! modified.
//!
//! # Usage
//!
//! ```bash
//! # Keep only what is needed for compile.sh to exit with status 1
//! scm -f crash.stmt:crash.min.stmt --invariant exit-code --exit-code 1 \
//!     --command ./compile.sh --arg '{files}'
//!
//! # Start with a configuration file
//! scm --config scm.toml
//!
//! # Show every option with its default
//! scm --print-config
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use config::{InvariantKind, ScmConfig, StrategyKind};
use scm_core::StatementLanguage;
use scm_minimizer::{FileMapping, MinimizationReport, Minimizer};
use tracing::{error, info};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// CLI arguments for scm.
#[derive(Parser, Debug)]
#[command(
    name = "scm",
    about = "Minimizes source files while an invariant keeps holding",
    version,
    author
)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File to minimize; the input is copied to the output, which is then
    /// reduced in place. May be repeated.
    #[arg(short = 'f', long = "file", value_name = "INPUT:OUTPUT", value_parser = config::parse_file_mapping)]
    files: Vec<FileMapping>,

    /// Node-selection strategy.
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Acceptance predicate.
    #[arg(long, value_enum)]
    invariant: Option<InvariantKind>,

    /// Program run by the process-backed invariants.
    #[arg(long, value_name = "CMD")]
    command: Option<String>,

    /// Argument for the invariant command; `{dir}` and `{files}` are
    /// expanded. May be repeated.
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    args: Vec<String>,

    /// Exit code that means the invariant holds.
    #[arg(long, value_name = "N", allow_negative_numbers = true)]
    exit_code: Option<i32>,

    /// Output pattern that means the invariant holds.
    #[arg(long, value_name = "REGEX")]
    pattern: Option<String>,

    /// Kill the invariant command after this many seconds.
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Run a white-space cleanup every N passes.
    #[arg(long, value_name = "N")]
    cleanup_interval: Option<usize>,

    /// Stop after this many passes.
    #[arg(long, value_name = "N")]
    max_passes: Option<usize>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long)]
    json_logs: bool,

    /// Print the default configuration and exit.
    #[arg(long)]
    print_config: bool,
}

/// Initialize tracing/logging.
fn init_tracing(config: &config::LoggingConfig, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    let format = if json_logs || config.format == "json" {
        "json"
    } else {
        &config.format
    };

    tracing_subscriber::registry()
        .with(log_layer(format))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

/// The fmt layer for `format`. Logs go to stderr; stdout carries the report.
fn log_layer(format: &str) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_writer(std::io::stderr);
    match format {
        "json" => layer.json().boxed(),
        "compact" => layer.compact().boxed(),
        _ => layer.pretty().boxed(),
    }
}

/// Builds the collaborators and runs one minimization.
async fn run(config: ScmConfig) -> Result<MinimizationReport> {
    let strategy = config.strategy.build();
    let invariant = config.invariant.build()?;

    info!(
        files = config.files.len(),
        strategy = strategy.name(),
        invariant = invariant.name(),
        "Loading inputs"
    );

    let minimizer = Minimizer::new(
        config.minimizer,
        config.files,
        Arc::new(StatementLanguage),
        invariant,
        strategy,
    )
    .await
    .context("Failed to load input files")?;

    minimizer.run().await.context("Minimization failed")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Handle --print-config
    if args.print_config {
        let config = ScmConfig::default();
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        ScmConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        ScmConfig::default()
    };

    // Merge CLI arguments
    config.merge_cli_args(&args);

    // Validate configuration
    config.validate().context("Invalid configuration")?;

    // Initialize tracing
    init_tracing(&config.logging, args.json_logs)?;

    info!(version = env!("CARGO_PKG_VERSION"), "scm starting");

    match run(config).await {
        Ok(report) => {
            print!("{}", report);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Minimization failed");
            Err(e)
        }
    }
}
