//! The language seam: parsing, deletion and layout normalisation.
//!
//! The minimizer is language agnostic. Everything it needs to know about a
//! concrete language goes through [`Language`]; the provided methods give a
//! generic, span-based behaviour that is good enough for most
//! whitespace-insensitive languages.

use crate::error::ParseError;
use crate::tree::{NodeIndex, Span, Tree};

/// Semantic relationships between nodes of one tree.
///
/// Strategies use this to remove a declaration together with its uses, for
/// example. Both methods report direct relationships only.
pub trait NodeInformationProvider: Send + Sync {
    /// Nodes that `node` directly depends on.
    fn dependencies(&self, _tree: &Tree, _node: NodeIndex) -> Vec<NodeIndex> {
        Vec::new()
    }

    /// Nodes that directly depend on `node`.
    fn dependents(&self, _tree: &Tree, _node: NodeIndex) -> Vec<NodeIndex> {
        Vec::new()
    }
}

/// Provider for languages without dependency information.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDependencies;

impl NodeInformationProvider for NoDependencies {}

/// A parseable language.
///
/// Implementations must be deterministic: the same text always yields the
/// same tree or the same error, and a failed parse has no side effects.
pub trait Language: Send + Sync {
    /// Short identifier used in logs and configuration.
    fn name(&self) -> &str;

    /// Parses `text` into a tree.
    fn parse(&self, text: &str) -> Result<Tree, ParseError>;

    /// Returns `text` with the given nodes of `tree` deleted.
    ///
    /// `tree` must be the parse of `text`. The result only has to be
    /// plausible; it is re-parsed before it can be committed.
    fn excise(&self, text: &str, tree: &Tree, nodes: &[NodeIndex]) -> String {
        excise_spans(text, tree, nodes)
    }

    /// Returns `text` with its layout normalised. Must be idempotent.
    fn reformat(&self, text: &str) -> String {
        normalize_whitespace(text)
    }

    /// Returns `text` without whitespace-only lines.
    fn strip_blank_lines(&self, text: &str) -> String {
        strip_blank_lines(text)
    }

    fn node_information(&self) -> &dyn NodeInformationProvider {
        &NoDependencies
    }
}

/// Removes the source spans of `nodes` from `text`.
///
/// Nested selections collapse into their outermost node; indices that do not
/// belong to `tree`, or spans that do not fall on character boundaries of
/// `text`, are ignored.
pub fn excise_spans(text: &str, tree: &Tree, nodes: &[NodeIndex]) -> String {
    let mut spans: Vec<Span> = nodes
        .iter()
        .filter_map(|index| tree.get(*index))
        .map(|node| node.span())
        .filter(|span| {
            span.end <= text.len()
                && text.is_char_boundary(span.start)
                && text.is_char_boundary(span.end)
        })
        .collect();
    spans.sort_by_key(|span| (span.start, std::cmp::Reverse(span.end)));

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start <= last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in merged {
        out.push_str(&text[cursor..span.start]);
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    out
}

/// Trims trailing whitespace, collapses runs of blank lines into one, drops
/// leading and trailing blank lines and ends non-empty text with a newline.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_blank = false;
    for line in text.lines().map(str::trim_end) {
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Drops every whitespace-only line.
pub fn strip_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines().filter(|line| !line.trim().is_empty()) {
        out.push_str(line);
        out.push('\n');
    }
    out
}
