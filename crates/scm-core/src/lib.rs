//! scm-core - syntax tree types for the scm source-code minimizer.
//!
//! This crate provides the language-facing half of the minimizer:
//!
//! - [`tree`]: arena-backed, immutable syntax trees and a builder for parsers
//! - [`forest`]: forest generations and generation-stamped node references
//! - [`language`]: the [`Language`] and [`NodeInformationProvider`] traits
//! - [`statements`]: a small block/statement language used by tests and the CLI
//! - [`error`]: parse errors
//!
//! # Example
//!
//! ```
//! use scm_core::{Language, StatementLanguage};
//!
//! let lang = StatementLanguage::new();
//! let text = "x; { y; }";
//! let tree = lang.parse(text).unwrap();
//! assert_eq!(tree.len(), 6);
//! assert_eq!(lang.reformat(text), "x;\n{\n  y;\n}\n");
//! ```

pub mod error;
pub mod forest;
pub mod language;
pub mod statements;
pub mod tree;

pub use error::ParseError;
pub use forest::{Forest, Generation, NodeRef, NodeSet, Partition, UnitId};
pub use language::{Language, NoDependencies, NodeInformationProvider};
pub use statements::StatementLanguage;
pub use tree::{Node, NodeIndex, Span, Tree, TreeBuilder};
