//! Hierarchical delta debugging.
//!
//! Nodes are grouped by tree depth across all units, shallowest first. Within
//! one depth the classic ddmin schedule applies: split the nodes into `n`
//! chunks, try removing each chunk, then (for `n > 2`) try keeping only one
//! chunk; if nothing commits, double `n`. A depth is exhausted once
//! single-node chunks have all been refused.
//!
//! The granularity reached at each depth is remembered across passes and
//! halved after a successful removal, so the next pass neither restarts from
//! two chunks nor stays at the finest split.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use scm_core::{Forest, NodeRef, NodeSet};
use tracing::{debug, trace};

use super::with_dependents;
use crate::control::PassControl;
use crate::error::Result;
use crate::traits::{MinimizerOperations, Strategy};

/// Statistics about ddmin passes.
#[derive(Debug, Clone, Default)]
struct DdminStats {
    passes: usize,
    chunk_attempts: usize,
    complement_attempts: usize,
    removals: usize,
    granularity_increases: usize,
    max_granularity: usize,
}

/// Delta debugging, one tree depth at a time.
#[derive(Debug, Default)]
pub struct DdminStrategy {
    /// Granularity to start from, per depth.
    granularity: BTreeMap<usize, usize>,
    stats: DdminStats,
}

impl DdminStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-root nodes grouped by depth, each group in unit then pre-order.
    fn levels(forest: &Forest) -> BTreeMap<usize, Vec<NodeRef>> {
        let mut levels: BTreeMap<usize, Vec<NodeRef>> = BTreeMap::new();
        for node in forest.nodes() {
            match forest.depth(node) {
                Some(0) | None => {}
                Some(depth) => levels.entry(depth).or_default().push(node),
            }
        }
        levels
    }

    /// Split nodes into `n` roughly equal chunks.
    fn split_into_chunks(nodes: &[NodeRef], n: usize) -> Vec<&[NodeRef]> {
        let len = nodes.len();
        if n == 0 || len == 0 {
            return vec![];
        }

        let chunk_size = len.div_ceil(n);
        nodes.chunks(chunk_size).collect()
    }

    /// All chunks except the i-th one.
    fn complement<'a>(
        chunks: &'a [&'a [NodeRef]],
        i: usize,
    ) -> impl Iterator<Item = NodeRef> + 'a {
        chunks
            .iter()
            .enumerate()
            .filter(move |(idx, _)| *idx != i)
            .flat_map(|(_, chunk)| chunk.iter().copied())
    }

    /// Bookkeeping for a pass that ends early; `control` is passed through.
    fn end_pass(&mut self, depth: usize, n: usize, control: PassControl) -> PassControl {
        if control == PassControl::Continue {
            self.stats.removals += 1;
            self.granularity.insert(depth, (n / 2).max(2));
        }
        control
    }

    async fn try_remove(
        forest: &Forest,
        ops: &mut dyn MinimizerOperations,
        nodes: impl IntoIterator<Item = NodeRef>,
    ) -> Result<PassControl> {
        let set: NodeSet = with_dependents(forest, ops.node_information(), nodes);
        ops.try_remove_nodes(&set).await
    }
}

#[async_trait]
impl Strategy for DdminStrategy {
    fn name(&self) -> &str {
        "ddmin"
    }

    async fn perform_single_pass(
        &mut self,
        forest: Arc<Forest>,
        ops: &mut dyn MinimizerOperations,
    ) -> Result<PassControl> {
        self.stats.passes += 1;
        let levels = Self::levels(&forest);
        debug!(pass = self.stats.passes, depths = levels.len(), "Ddmin pass");

        for (depth, nodes) in levels {
            let mut n = self
                .granularity
                .get(&depth)
                .copied()
                .unwrap_or(2)
                .clamp(1, nodes.len());

            loop {
                self.stats.max_granularity = self.stats.max_granularity.max(n);
                let chunks = Self::split_into_chunks(&nodes, n);
                trace!(depth, granularity = n, chunks = chunks.len(), "Trying chunks");

                for chunk in &chunks {
                    self.stats.chunk_attempts += 1;
                    let control = Self::try_remove(&forest, ops, chunk.iter().copied()).await?;
                    if control.is_transfer() {
                        return Ok(self.end_pass(depth, n, control));
                    }
                }

                if chunks.len() > 2 {
                    for i in 0..chunks.len() {
                        self.stats.complement_attempts += 1;
                        let control =
                            Self::try_remove(&forest, ops, Self::complement(&chunks, i)).await?;
                        if control.is_transfer() {
                            return Ok(self.end_pass(depth, n, control));
                        }
                    }
                }

                if n >= nodes.len() {
                    break;
                }
                n = (n * 2).min(nodes.len());
                self.stats.granularity_increases += 1;
                self.granularity.insert(depth, n);
            }
        }

        Ok(PassControl::exhausted())
    }

    fn print_statistics(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            out,
            "Strategy '{}': {} passes, {} chunk and {} complement attempts, {} removed, \
             {} granularity increases (max {})",
            self.name(),
            self.stats.passes,
            self.stats.chunk_attempts,
            self.stats.complement_attempts,
            self.stats.removals,
            self.stats.granularity_increases,
            self.stats.max_granularity
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scm_core::{Generation, Language, NodeIndex, StatementLanguage, UnitId};

    use crate::control::Rejection;
    use crate::strategies::testing::MockOps;

    fn forest(texts: &[&str]) -> Forest {
        let trees = texts
            .iter()
            .map(|t| Arc::new(StatementLanguage.parse(t).unwrap()))
            .collect();
        Forest::new(Generation(0), trees)
    }

    fn indices(set: &NodeSet) -> Vec<(usize, u32)> {
        set.iter().map(|n| (n.unit.index(), n.index.0)).collect()
    }

    #[test]
    fn test_split_into_chunks() {
        let forest = forest(&["a; b; c; d; e;"]);
        let nodes: Vec<NodeRef> = forest.nodes().collect();

        let chunks = DdminStrategy::split_into_chunks(&nodes, 3);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.iter().map(|c| c.len()).collect::<Vec<_>>(), vec![4, 4, 3]);
        assert!(DdminStrategy::split_into_chunks(&nodes, 0).is_empty());

        let rest: Vec<NodeRef> = DdminStrategy::complement(&chunks, 1).collect();
        assert_eq!(rest.len(), 7);
        assert!(!rest.contains(&chunks[1][0]));
    }

    #[test]
    fn test_levels_span_units() {
        let forest = forest(&["a; { b; }", "c;"]);
        let levels = DdminStrategy::levels(&forest);

        assert_eq!(levels.len(), 3);
        // Depth 1: stmt a, block, stmt c.
        assert_eq!(
            levels[&1]
                .iter()
                .map(|n| (n.unit, n.index))
                .collect::<Vec<_>>(),
            vec![
                (UnitId(0), NodeIndex(1)),
                (UnitId(0), NodeIndex(3)),
                (UnitId(1), NodeIndex(1)),
            ]
        );
    }

    #[tokio::test]
    async fn test_exhausts_down_to_single_nodes() {
        let mut ops = MockOps::rejecting(forest(&["a; b; c; d;"]));
        let mut strategy = DdminStrategy::new();
        let control = strategy
            .perform_single_pass(ops.forest(), &mut ops)
            .await
            .unwrap();

        assert_eq!(control, PassControl::Failed(Rejection::Exhausted));
        // Every depth-1 statement and depth-2 word was offered on its own.
        for index in 1..=8 {
            assert!(
                ops.removals
                    .iter()
                    .any(|set| indices(set) == vec![(0, index)]),
                "node {} never tried alone",
                index
            );
        }
    }

    #[tokio::test]
    async fn test_halves_granularity_after_commit() {
        // Only the third statement may go.
        let mut ops = MockOps::new(forest(&["a; b; c; d;"]), |set| {
            if indices(set) == vec![(0, 5)] {
                PassControl::Continue
            } else {
                PassControl::Failed(Rejection::InvariantUnsatisfied)
            }
        });
        let mut strategy = DdminStrategy::new();
        let control = strategy
            .perform_single_pass(ops.forest(), &mut ops)
            .await
            .unwrap();

        assert_eq!(control, PassControl::Continue);
        assert_eq!(strategy.granularity[&1], 2);
        assert_eq!(indices(ops.removals.last().unwrap()), vec![(0, 5)]);
    }

    #[tokio::test]
    async fn test_passes_stop_through() {
        let mut ops = MockOps::new(forest(&["a; b;"]), |_| PassControl::Stop);
        let mut strategy = DdminStrategy::new();
        let control = strategy
            .perform_single_pass(ops.forest(), &mut ops)
            .await
            .unwrap();

        assert_eq!(control, PassControl::Stop);
        assert_eq!(ops.removals.len(), 1);
    }
}
