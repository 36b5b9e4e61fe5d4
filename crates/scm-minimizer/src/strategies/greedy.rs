use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use scm_core::{Forest, NodeSet};
use tracing::{debug, trace};

use super::with_dependents;
use crate::control::PassControl;
use crate::error::Result;
use crate::traits::{MinimizerOperations, Strategy};

/// Statistics about greedy passes.
#[derive(Debug, Clone, Default)]
struct GreedyStats {
    passes: usize,
    attempts: usize,
    removals: usize,
}

/// Tries every non-root node in pre-order, so a subtree is offered before
/// any of its parts. Each candidate is removed together with its dependents.
#[derive(Debug, Default)]
pub struct GreedyStrategy {
    stats: GreedyStats,
}

impl GreedyStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    fn candidates(forest: &Forest, ops: &dyn MinimizerOperations) -> Vec<NodeSet> {
        let info = ops.node_information();
        forest
            .nodes()
            .filter(|node| forest.parent(*node).is_some())
            .map(|node| with_dependents(forest, info, [node]))
            .collect()
    }
}

#[async_trait]
impl Strategy for GreedyStrategy {
    fn name(&self) -> &str {
        "greedy"
    }

    async fn perform_single_pass(
        &mut self,
        forest: Arc<Forest>,
        ops: &mut dyn MinimizerOperations,
    ) -> Result<PassControl> {
        self.stats.passes += 1;
        let candidates = Self::candidates(&forest, ops);
        debug!(pass = self.stats.passes, candidates = candidates.len(), "Greedy pass");

        for candidate in candidates {
            self.stats.attempts += 1;
            let control = ops.try_remove_nodes(&candidate).await?;
            if control.is_transfer() {
                if control == PassControl::Continue {
                    self.stats.removals += 1;
                }
                return Ok(control);
            }
            trace!(nodes = candidate.len(), ?control, "Candidate refused");
        }
        Ok(PassControl::exhausted())
    }

    fn print_statistics(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "Strategy '{}': {} passes, {} candidates tried, {} removed",
            self.name(),
            self.stats.passes,
            self.stats.attempts,
            self.stats.removals
        )
    }
}
