//! Node-selection strategies.
//!
//! - [`GreedyStrategy`]: one node (plus its dependents) at a time, largest
//!   subtrees first
//! - [`DdminStrategy`]: delta debugging over the nodes of each tree depth

mod ddmin;
mod greedy;

pub use ddmin::DdminStrategy;
pub use greedy::GreedyStrategy;

use scm_core::{Forest, NodeInformationProvider, NodeRef, NodeSet};

/// `nodes` together with everything that transitively depends on them.
///
/// Dependents are looked up within each node's own tree.
pub(crate) fn with_dependents(
    forest: &Forest,
    info: &dyn NodeInformationProvider,
    nodes: impl IntoIterator<Item = NodeRef>,
) -> NodeSet {
    let mut closure = NodeSet::new();
    let mut pending: Vec<NodeRef> = nodes.into_iter().collect();
    while let Some(node) = pending.pop() {
        if !closure.insert(node) {
            continue;
        }
        let Some(tree) = forest.tree(node.unit) else {
            continue;
        };
        pending.extend(
            info.dependents(tree, node.index)
                .into_iter()
                .map(|index| forest.node_ref(node.unit, index))
                .filter(|dependent| !closure.contains(dependent)),
        );
    }
    closure
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use async_trait::async_trait;
    use scm_core::{Forest, NoDependencies, NodeInformationProvider, NodeSet};

    use crate::control::{PassControl, Rejection};
    use crate::error::Result;
    use crate::traits::MinimizerOperations;

    /// Operations that never touch a file: `decide` answers every removal.
    pub struct MockOps {
        pub forest: Arc<Forest>,
        pub decide: Box<dyn Fn(&NodeSet) -> PassControl + Send>,
        pub info: Box<dyn NodeInformationProvider>,
        pub removals: Vec<NodeSet>,
        pub forced: Vec<NodeSet>,
    }

    impl MockOps {
        pub fn new(forest: Forest, decide: impl Fn(&NodeSet) -> PassControl + Send + 'static) -> Self {
            Self {
                forest: Arc::new(forest),
                decide: Box::new(decide),
                info: Box::new(NoDependencies),
                removals: Vec::new(),
                forced: Vec::new(),
            }
        }

        pub fn rejecting(forest: Forest) -> Self {
            Self::new(forest, |_| PassControl::Failed(Rejection::InvariantUnsatisfied))
        }
    }

    #[async_trait]
    impl MinimizerOperations for MockOps {
        async fn try_remove_nodes(&mut self, nodes: &NodeSet) -> Result<PassControl> {
            self.removals.push(nodes.clone());
            Ok((self.decide)(nodes))
        }

        async fn try_cleanup(&mut self) -> Result<PassControl> {
            Ok(PassControl::Failed(Rejection::InvariantUnsatisfied))
        }

        async fn force_remove_nodes_and_exit(&mut self, nodes: &NodeSet) -> Result<PassControl> {
            self.forced.push(nodes.clone());
            Ok(PassControl::Stop)
        }

        fn forest(&self) -> Arc<Forest> {
            Arc::clone(&self.forest)
        }

        fn node_information(&self) -> &dyn NodeInformationProvider {
            self.info.as_ref()
        }
    }
}
