//! Collaborator traits: the acceptance predicate, the node-selection
//! algorithm, and the operations the engine offers to the latter.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use scm_core::{Forest, NodeInformationProvider, NodeSet};

use crate::context::InvariantContext;
use crate::control::PassControl;
use crate::error::Result;

/// The property a minimized result must keep, e.g. "still crashes the
/// compiler".
///
/// Invariants are stateful: they are initialised once per run and may keep
/// statistics across checks.
///
/// # Example
///
/// ```rust,ignore
/// use scm_minimizer::{Invariant, InvariantContext, Result};
///
/// struct MentionsPanic;
///
/// #[async_trait]
/// impl Invariant for MentionsPanic {
///     fn name(&self) -> &str {
///         "mentions-panic"
///     }
///
///     async fn check_is_satisfied(&mut self, ctx: &InvariantContext<'_>) -> Result<bool> {
///         Ok(ctx.units().any(|u| ctx.scratch_text(u).unwrap_or("").contains("panic")))
///     }
/// }
/// ```
#[async_trait]
pub trait Invariant: Send + Sync {
    /// The name of this invariant for logging purposes.
    fn name(&self) -> &str;

    /// Called once, after the baseline is loaded and before any check.
    async fn initialize(&mut self, _ctx: &InvariantContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Evaluates the predicate over the current trial texts.
    ///
    /// Returning `Ok(false)` rejects the trial. Returning an error aborts the
    /// whole run, so reserve it for faults such as a missing executable.
    async fn check_is_satisfied(&mut self, ctx: &InvariantContext<'_>) -> Result<bool>;

    /// Writes accumulated statistics.
    fn print_statistics(&self, _out: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }
}

/// Engine operations available to a strategy during a pass.
///
/// Every removal or cleanup either commits (and returns
/// [`PassControl::Continue`]), ends the run ([`PassControl::Stop`]) or
/// fails ([`PassControl::Failed`]). The first two must be returned from
/// [`Strategy::perform_single_pass`] unchanged and immediately.
#[async_trait]
pub trait MinimizerOperations: Send {
    /// Tries to delete `nodes`; they must belong to the current forest.
    async fn try_remove_nodes(&mut self, nodes: &NodeSet) -> Result<PassControl>;

    /// Tries to commit a white-space cleanup of every unit.
    async fn try_cleanup(&mut self) -> Result<PassControl>;

    /// Deletes `nodes` and commits without any check, then ends the run.
    ///
    /// The caller guarantees that the result is parseable and satisfies the
    /// invariant.
    async fn force_remove_nodes_and_exit(&mut self, nodes: &NodeSet) -> Result<PassControl>;

    /// The current forest. Node references from any other forest are ignored.
    fn forest(&self) -> Arc<Forest>;

    fn node_information(&self) -> &dyn NodeInformationProvider;
}

/// The algorithm that proposes which nodes to delete.
///
/// A pass ends as soon as one removal commits. Returning a failed signal
/// from [`perform_single_pass`](Self::perform_single_pass) ends the whole
/// minimization, so a strategy must try every granularity it supports before
/// doing so.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// The name of this strategy for logging purposes.
    fn name(&self) -> &str;

    /// Called once before the first pass.
    async fn initialize(&mut self, _ops: &mut dyn MinimizerOperations) -> Result<()> {
        Ok(())
    }

    /// Runs one pass over `forest`.
    async fn perform_single_pass(
        &mut self,
        forest: Arc<Forest>,
        ops: &mut dyn MinimizerOperations,
    ) -> Result<PassControl>;

    /// Writes accumulated statistics.
    fn print_statistics(&self, _out: &mut dyn Write) -> std::io::Result<()> {
        Ok(())
    }
}
