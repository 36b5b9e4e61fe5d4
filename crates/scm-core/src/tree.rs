//! Arena-backed syntax trees.
//!
//! A [`Tree`] is produced once per parse and never mutated afterwards. Nodes
//! live in a flat arena and are addressed by [`NodeIndex`]; indices are
//! assigned in pre-order, so index `0` is always the root and iterating the
//! arena front to back visits parents before their children.

use std::fmt;
use std::ops::{Index, Range};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Position of a node inside its tree's arena.
///
/// # Examples
///
/// ```
/// use scm_core::tree::NodeIndex;
///
/// assert_eq!(NodeIndex::ROOT.index(), 0);
/// assert_eq!(NodeIndex::new(3).to_string(), "#3");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// The root of every tree.
    pub const ROOT: NodeIndex = NodeIndex(0);

    /// Creates a new index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the arena slot as a `usize`.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Half-open byte range `[start, end)` of a node in its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    /// Creates a span; `end` is clamped so the span is never inverted.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// A single syntax node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    kind: &'static str,
    span: Span,
    parent: Option<NodeIndex>,
    children: Vec<NodeIndex>,
}

impl Node {
    /// The language-defined node kind, e.g. `"statement"`.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn parent(&self) -> Option<NodeIndex> {
        self.parent
    }

    pub fn children(&self) -> &[NodeIndex] {
        &self.children
    }
}

/// An immutable syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    /// The root node index.
    pub fn root(&self) -> NodeIndex {
        NodeIndex::ROOT
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a tree produced by [`TreeBuilder`]; provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node, returning `None` for an index outside this tree.
    pub fn get(&self, index: NodeIndex) -> Option<&Node> {
        self.nodes.get(index.index())
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        index.index() < self.nodes.len()
    }

    /// All node indices in pre-order.
    pub fn indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        (0..self.nodes.len() as u32).map(NodeIndex)
    }

    /// Nodes in pre-order, paired with their index.
    pub fn iter(&self) -> impl Iterator<Item = (NodeIndex, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIndex(i as u32), node))
    }

    /// Distance from the root; the root has depth 0.
    pub fn depth(&self, index: NodeIndex) -> usize {
        let mut depth = 0;
        let mut current = self.get(index).and_then(Node::parent);
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent.index()].parent;
        }
        depth
    }

    /// The slice of `source` covered by `index`, if both are valid.
    pub fn text<'a>(&self, index: NodeIndex, source: &'a str) -> Option<&'a str> {
        self.get(index).and_then(|node| source.get(node.span.range()))
    }
}

impl Index<NodeIndex> for Tree {
    type Output = Node;

    fn index(&self, index: NodeIndex) -> &Node {
        &self.nodes[index.index()]
    }
}

/// Incremental builder used by parsers.
///
/// Nodes are opened with [`start_node`](Self::start_node) and closed with
/// [`finish_node`](Self::finish_node); the builder records parent links and
/// assigns pre-order indices.
///
/// ```
/// use scm_core::tree::TreeBuilder;
///
/// let mut builder = TreeBuilder::new();
/// builder.start_node("program", 0);
/// builder.leaf("word", 0, 1);
/// builder.finish_node(1);
/// let tree = builder.finish().unwrap();
/// assert_eq!(tree.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
    stack: Vec<NodeIndex>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a node starting at byte `start` as a child of the innermost open node.
    pub fn start_node(&mut self, kind: &'static str, start: usize) -> NodeIndex {
        let index = NodeIndex(self.nodes.len() as u32);
        let parent = self.stack.last().copied();
        if let Some(parent) = parent {
            self.nodes[parent.index()].children.push(index);
        }
        self.nodes.push(Node {
            kind,
            span: Span::new(start, start),
            parent,
            children: Vec::new(),
        });
        self.stack.push(index);
        index
    }

    /// Closes the innermost open node at byte `end`.
    pub fn finish_node(&mut self, end: usize) {
        if let Some(index) = self.stack.pop() {
            let span = &mut self.nodes[index.index()].span;
            *span = Span::new(span.start, end);
        }
    }

    /// Adds a childless node.
    pub fn leaf(&mut self, kind: &'static str, start: usize, end: usize) -> NodeIndex {
        let index = self.start_node(kind, start);
        self.finish_node(end);
        index
    }

    /// Completes the tree.
    ///
    /// Fails if no root was opened or some node is still open.
    pub fn finish(self) -> Result<Tree, ParseError> {
        if self.nodes.is_empty() {
            return Err(ParseError::unlocated("tree has no root node"));
        }
        if !self.stack.is_empty() {
            return Err(ParseError::unlocated(format!(
                "{} node(s) left open",
                self.stack.len()
            )));
        }
        Ok(Tree { nodes: self.nodes })
    }
}
