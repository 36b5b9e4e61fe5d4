//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MinimizerError, Result};

/// One input file and the working copy the engine minimizes in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMapping {
    /// Original file; never modified.
    pub input: PathBuf,

    /// Working copy; always holds the last committed text.
    pub output: PathBuf,
}

impl FileMapping {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Rejects mapping sets where an output is the same file as any input, or
    /// two mappings share an output. Copying an input over itself truncates it.
    ///
    /// Paths are compared after resolving symlinks and `..`; on unix, two
    /// existing paths are also compared by device and inode.
    pub fn check_distinct(mappings: &[FileMapping]) -> Result<()> {
        for (i, mapping) in mappings.iter().enumerate() {
            if let Some(aliased) = mappings
                .iter()
                .find(|other| same_file(&other.input, &mapping.output))
            {
                return Err(MinimizerError::InvalidConfig(format!(
                    "output {} is the same file as input {}",
                    mapping.output.display(),
                    aliased.input.display()
                )));
            }
            if mappings[..i]
                .iter()
                .any(|other| same_file(&other.output, &mapping.output))
            {
                return Err(MinimizerError::InvalidConfig(format!(
                    "output {} is used by more than one file",
                    mapping.output.display()
                )));
            }
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;

        if let (Ok(a), Ok(b)) = (std::fs::metadata(a), std::fs::metadata(b)) {
            return a.dev() == b.dev() && a.ino() == b.ino();
        }
    }
    resolve(a) == resolve(b)
}

/// Absolute form of `path` with symlinks and `..` resolved. Only the parent
/// directory has to exist.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(resolved) = std::fs::canonicalize(path) {
        return resolved;
    }
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (std::fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/// Configuration for the minimization engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerConfig {
    /// Every n-th pass is a white-space cleanup pass instead of a strategy pass.
    pub cleanup_interval: usize,

    /// Upper bound on passes; `None` runs until the strategy is exhausted.
    pub max_passes: Option<usize>,

    /// Per-check invariant timeout in milliseconds. A timed-out check counts
    /// as "not satisfied".
    pub check_timeout_ms: Option<u64>,

    /// Extension of the temporary file written next to a working copy before
    /// it is atomically renamed over it.
    pub staging_suffix: String,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: 10,
            max_passes: None,
            check_timeout_ms: None,
            staging_suffix: "scm-staged".to_string(),
        }
    }
}

impl MinimizerConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cleanup interval.
    pub fn with_cleanup_interval(mut self, interval: usize) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the maximum number of passes.
    pub fn with_max_passes(mut self, max: usize) -> Self {
        self.max_passes = Some(max);
        self
    }

    /// Set the invariant check timeout.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Returns the invariant check timeout as a Duration.
    pub fn check_timeout(&self) -> Option<Duration> {
        self.check_timeout_ms.map(Duration::from_millis)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cleanup_interval < 2 {
            return Err(MinimizerError::InvalidConfig(format!(
                "cleanup_interval must be at least 2, got {}",
                self.cleanup_interval
            )));
        }
        if self.max_passes == Some(0) {
            return Err(MinimizerError::InvalidConfig(
                "max_passes must be positive".into(),
            ));
        }
        if self.check_timeout_ms == Some(0) {
            return Err(MinimizerError::InvalidConfig(
                "check_timeout_ms must be positive".into(),
            ));
        }
        if self.staging_suffix.is_empty() {
            return Err(MinimizerError::InvalidConfig(
                "staging_suffix must not be empty".into(),
            ));
        }
        Ok(())
    }
}
