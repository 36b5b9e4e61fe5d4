//! Error types for the minimizer.
//!
//! Only faults that abort a run live here. A trial that is refused because
//! its text does not parse or because the invariant rejects it is a normal
//! outcome and is reported through [`Rejection`](crate::control::Rejection).

use std::path::PathBuf;

use scm_core::ParseError;
use thiserror::Error;

/// Errors that abort a minimization run.
#[derive(Debug, Error)]
pub enum MinimizerError {
    /// No source files were configured.
    #[error("No input files to minimize")]
    NoInputs,

    /// Reading, writing or copying a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A working copy could not be parsed before any change was made.
    #[error("Input {} does not parse: {source}", path.display())]
    BaselineUnparseable {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    /// The invariant failed in a way that is not a plain "not satisfied".
    #[error("Invariant error: {0}")]
    Invariant(String),

    /// The strategy failed.
    #[error("Strategy error: {0}")]
    Strategy(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl MinimizerError {
    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for minimizer operations.
pub type Result<T> = std::result::Result<T, MinimizerError>;
