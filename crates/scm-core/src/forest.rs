//! Forest generations and generation-stamped node references.
//!
//! The engine owns exactly one [`Forest`] at a time and replaces it wholesale
//! after every successful commit. Every replacement gets a fresh
//! [`Generation`]; a [`NodeRef`] carries the generation it was taken from, so a
//! reference kept across a commit is detected as stale instead of silently
//! pointing at an unrelated node of the re-parsed tree.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tree::{Node, NodeIndex, Tree};

/// Monotonic forest generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Generation(pub u64);

impl Generation {
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.0)
    }
}

/// Identifies one source unit (one file) by its position in the input list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub usize);

impl UnitId {
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit{}", self.0)
    }
}

/// A node of one specific forest generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub generation: Generation,
    pub unit: UnitId,
    pub index: NodeIndex,
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}{}", self.generation, self.unit, self.index)
    }
}

/// An ordered set of node references, as proposed by a strategy.
pub type NodeSet = BTreeSet<NodeRef>;

/// Node references split by the unit that owns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// One entry per unit, in unit order; entries may be empty.
    pub per_unit: Vec<Vec<NodeIndex>>,

    /// References that do not resolve against the forest.
    pub unknown: Vec<NodeRef>,
}

impl Partition {
    /// Total number of resolved references.
    pub fn matched(&self) -> usize {
        self.per_unit.iter().map(Vec::len).sum()
    }
}

/// The parsed trees of all units, one per unit, from a single commit.
#[derive(Debug, Clone)]
pub struct Forest {
    generation: Generation,
    trees: Vec<Arc<Tree>>,
}

impl Forest {
    pub fn new(generation: Generation, trees: Vec<Arc<Tree>>) -> Self {
        Self { generation, trees }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn unit_count(&self) -> usize {
        self.trees.len()
    }

    pub fn tree(&self, unit: UnitId) -> Option<&Tree> {
        self.trees.get(unit.index()).map(Arc::as_ref)
    }

    pub fn trees(&self) -> impl Iterator<Item = (UnitId, &Tree)> + '_ {
        self.trees
            .iter()
            .enumerate()
            .map(|(i, tree)| (UnitId(i), tree.as_ref()))
    }

    /// Stamps a reference for `index` in `unit` with this forest's generation.
    pub fn node_ref(&self, unit: UnitId, index: NodeIndex) -> NodeRef {
        NodeRef {
            generation: self.generation,
            unit,
            index,
        }
    }

    /// Every node of every unit, unit by unit, each tree in pre-order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.trees().flat_map(move |(unit, tree)| {
            tree.indices().map(move |index| self.node_ref(unit, index))
        })
    }

    /// Resolves a reference, returning `None` if it is stale or out of range.
    pub fn resolve(&self, node: NodeRef) -> Option<&Node> {
        if node.generation != self.generation {
            return None;
        }
        self.tree(node.unit).and_then(|tree| tree.get(node.index))
    }

    pub fn contains(&self, node: NodeRef) -> bool {
        self.resolve(node).is_some()
    }

    pub fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.resolve(node)
            .and_then(Node::parent)
            .map(|index| self.node_ref(node.unit, index))
    }

    pub fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        self.resolve(node)
            .map(|n| {
                n.children()
                    .iter()
                    .map(|index| self.node_ref(node.unit, *index))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Depth of a node in its tree; `None` for unresolvable references.
    pub fn depth(&self, node: NodeRef) -> Option<usize> {
        self.resolve(node)?;
        self.tree(node.unit).map(|tree| tree.depth(node.index))
    }

    /// Total number of nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.trees.iter().map(|tree| tree.len()).sum()
    }

    /// Splits `nodes` by owning unit, separating references that do not
    /// belong to this forest.
    pub fn partition(&self, nodes: &NodeSet) -> Partition {
        let mut partition = Partition {
            per_unit: vec![Vec::new(); self.trees.len()],
            unknown: Vec::new(),
        };
        for node in nodes {
            if self.contains(*node) {
                partition.per_unit[node.unit.index()].push(node.index);
            } else {
                partition.unknown.push(*node);
            }
        }
        partition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeBuilder;

    fn tree(words: usize) -> Arc<Tree> {
        let mut b = TreeBuilder::new();
        b.start_node("program", 0);
        for i in 0..words {
            b.leaf("word", i * 2, i * 2 + 1);
        }
        b.finish_node(words * 2);
        Arc::new(b.finish().unwrap())
    }

    #[test]
    fn test_counts_and_stamping() {
        let forest = Forest::new(Generation(3), vec![tree(2), tree(1)]);
        assert_eq!(forest.unit_count(), 2);
        assert_eq!(forest.node_count(), 5);
        let nodes: Vec<_> = forest.nodes().collect();
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[3].unit, UnitId(1));
        assert!(nodes.iter().all(|n| n.generation == Generation(3)));
    }

    #[test]
    fn test_stale_references_do_not_resolve() {
        let old = Forest::new(Generation(1), vec![tree(2)]);
        let new = Forest::new(old.generation().next(), vec![tree(2)]);

        let stale = old.node_ref(UnitId(0), NodeIndex(1));
        assert!(old.contains(stale));
        assert!(!new.contains(stale));
        assert!(!new.contains(new.node_ref(UnitId(0), NodeIndex(9))));
        assert!(!new.contains(new.node_ref(UnitId(4), NodeIndex(0))));
    }

    #[test]
    fn test_partition() {
        let forest = Forest::new(Generation(2), vec![tree(2), tree(2)]);
        let stale = NodeRef {
            generation: Generation(1),
            unit: UnitId(0),
            index: NodeIndex(1),
        };
        let nodes: NodeSet = [
            forest.node_ref(UnitId(0), NodeIndex(2)),
            forest.node_ref(UnitId(1), NodeIndex(1)),
            forest.node_ref(UnitId(1), NodeIndex(2)),
            stale,
        ]
        .into_iter()
        .collect();

        let partition = forest.partition(&nodes);
        assert_eq!(partition.per_unit[0], vec![NodeIndex(2)]);
        assert_eq!(partition.per_unit[1], vec![NodeIndex(1), NodeIndex(2)]);
        assert_eq!(partition.unknown, vec![stale]);
        assert_eq!(partition.matched(), 3);
    }

    #[test]
    fn test_navigation() {
        let forest = Forest::new(Generation(0), vec![tree(3)]);
        let root = forest.node_ref(UnitId(0), NodeIndex::ROOT);
        let children = forest.children(root);
        assert_eq!(children.len(), 3);
        assert_eq!(forest.parent(children[2]), Some(root));
        assert_eq!(forest.depth(children[0]), Some(1));
        assert_eq!(forest.parent(root), None);
    }
}
