//! Progress metrics and the end-of-run report.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::Rejection;

/// Total size of the committed state across all units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub bytes: usize,
    pub nodes: usize,
}

impl MetricsSnapshot {
    /// This snapshot as a percentage of `original`, per dimension.
    pub fn percent_of(&self, original: &MetricsSnapshot) -> (usize, usize) {
        fn pct(part: usize, whole: usize) -> usize {
            if whole == 0 {
                100
            } else {
                part * 100 / whole
            }
        }
        (pct(self.bytes, original.bytes), pct(self.nodes, original.nodes))
    }
}

/// Where in the run a snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Checkpoint {
    Original,
    InitialCleanup,
    Pass { number: usize, cleanup: bool },
    FinalCleanup,
    BlankLineCleanup,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => write!(f, "Original file(s)"),
            Self::InitialCleanup => write!(f, "After initial white-space cleanup"),
            Self::Pass {
                number,
                cleanup: true,
            } => write!(f, "After pass #{} (white-space cleanup)", number),
            Self::Pass { number, .. } => write!(f, "After pass #{}", number),
            Self::FinalCleanup => write!(f, "After final white-space cleanup"),
            Self::BlankLineCleanup => write!(f, "After blank line clean up"),
        }
    }
}

/// One line of the progress log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub checkpoint: Checkpoint,
    pub metrics: MetricsSnapshot,
}

/// Statistics about the minimization process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinimizationStats {
    /// Size before anything was changed.
    pub original: MetricsSnapshot,

    /// Size after finalization.
    pub minimized: MetricsSnapshot,

    /// Passes run, cleanup passes included.
    pub passes: usize,

    /// Passes that were white-space cleanups.
    pub cleanup_passes: usize,

    /// Invariant evaluations.
    pub checks_performed: usize,

    /// Successful commits.
    pub commits: usize,

    /// Trials refused by the invariant.
    pub invariant_rejections: usize,

    /// Trials refused because some text did not parse.
    pub parse_rejections: usize,

    /// Invariant checks that timed out.
    pub timeouts: usize,

    /// Node references that did not belong to the current forest.
    pub unknown_node_references: usize,

    /// Whether the strategy forced the run to end.
    pub forced_exit: bool,

    /// Whether the pass limit ended the run.
    pub early_terminated: bool,

    /// Reason for early termination, if applicable.
    pub termination_reason: Option<String>,

    /// Time taken for minimization.
    #[serde(skip)]
    pub duration: Option<Duration>,
}

impl MinimizationStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a refused trial.
    pub fn record_rejection(&mut self, rejection: &Rejection) {
        match rejection {
            Rejection::InvariantUnsatisfied => self.invariant_rejections += 1,
            Rejection::TimedOut => self.timeouts += 1,
            Rejection::Unparseable { .. } => self.parse_rejections += 1,
            Rejection::NothingToRemove | Rejection::Exhausted => {}
        }
    }

    /// Record early termination.
    pub fn record_early_termination(&mut self, reason: &str) {
        self.early_terminated = true;
        self.termination_reason = Some(reason.to_string());
    }

    /// Get the total number of refused trials.
    pub fn total_rejections(&self) -> usize {
        self.invariant_rejections + self.parse_rejections + self.timeouts
    }

    /// Get the fraction of trials that were committed.
    pub fn success_rate(&self) -> f64 {
        let total = self.commits + self.total_rejections();
        if total == 0 {
            0.0
        } else {
            self.commits as f64 / total as f64
        }
    }

    /// Get the percentage of bytes removed.
    pub fn byte_reduction_percentage(&self) -> f64 {
        if self.original.bytes == 0 {
            0.0
        } else {
            (1.0 - self.minimized.bytes as f64 / self.original.bytes as f64) * 100.0
        }
    }
}

impl fmt::Display for MinimizationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ {} -> {} bytes ({:.1}% reduction), {} -> {} nodes, {} passes, {} commits, {} checks, {:.1}% success rate",
            self.original.bytes,
            self.minimized.bytes,
            self.byte_reduction_percentage(),
            self.original.nodes,
            self.minimized.nodes,
            self.passes,
            self.commits,
            self.checks_performed,
            self.success_rate() * 100.0
        )?;
        if self.forced_exit {
            write!(f, ", forced exit")?;
        }
        if self.early_terminated {
            if let Some(ref reason) = self.termination_reason {
                write!(f, ", early terminated: {}", reason)?;
            }
        }
        if let Some(duration) = self.duration {
            write!(f, ", {:?}", duration)?;
        }
        write!(f, " }}")
    }
}

/// Everything a finished run reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MinimizationReport {
    pub stats: MinimizationStats,

    /// Snapshots in the order they were taken.
    pub progress: Vec<ProgressEntry>,

    /// Output of the invariant's `print_statistics`.
    pub invariant_statistics: String,

    /// Output of the strategy's `print_statistics`.
    pub strategy_statistics: String,
}

impl MinimizationReport {
    /// Renders the progress log, one line per snapshot.
    pub fn progress_lines(&self) -> Vec<String> {
        let original = self.stats.original;
        self.progress
            .iter()
            .map(|entry| match entry.checkpoint {
                Checkpoint::Original => format!(
                    "{}: {} bytes, {} nodes.",
                    entry.checkpoint, entry.metrics.bytes, entry.metrics.nodes
                ),
                _ => {
                    let (pct_bytes, pct_nodes) = entry.metrics.percent_of(&original);
                    format!(
                        "{}: size {} bytes ({}%), {} nodes ({}%)",
                        entry.checkpoint,
                        entry.metrics.bytes,
                        pct_bytes,
                        entry.metrics.nodes,
                        pct_nodes
                    )
                }
            })
            .collect()
    }
}

impl fmt::Display for MinimizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.progress_lines() {
            writeln!(f, "{}", line)?;
        }
        writeln!(f, "{}", self.stats)?;
        if !self.invariant_statistics.is_empty() {
            write!(f, "{}", self.invariant_statistics)?;
        }
        if !self.strategy_statistics.is_empty() {
            write!(f, "{}", self.strategy_statistics)?;
        }
        Ok(())
    }
}
