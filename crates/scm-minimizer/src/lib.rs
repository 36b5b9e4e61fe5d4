//! # scm-minimizer
//!
//! Hierarchical delta debugging for source files.
//!
//! Given one or more source files and a property they exhibit (the
//! *invariant*, e.g. "the compiler still crashes"), this crate deletes as
//! much of the files as it can while the property keeps holding and every
//! file keeps parsing. Deletions are proposed by a pluggable *strategy* in
//! terms of syntax-tree nodes and applied by the engine as all-or-nothing
//! transactions over every file.
//!
//! ## Components
//!
//! - **Cutter**: per-file committed and scratch texts, staged writes
//! - **Minimizer**: the commit protocol and the pass loop
//! - **Invariant**: acceptance predicate ([`ParseableInvariant`],
//!   [`FnInvariant`], [`ProcessInvariant`])
//! - **Strategy**: node selection ([`GreedyStrategy`], [`DdminStrategy`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use regex::Regex;
//! use scm_core::StatementLanguage;
//! use scm_minimizer::{
//!     Acceptance, DdminStrategy, FileMapping, Minimizer, MinimizerConfig, ProcessInvariant,
//! };
//!
//! let invariant = ProcessInvariant::new("./compile.sh", Acceptance::OutputMatches(Regex::new("ICE")?))
//!     .with_args(["{files}"]);
//!
//! let minimizer = Minimizer::new(
//!     MinimizerConfig::new().with_cleanup_interval(10),
//!     vec![FileMapping::new("crash.stmt", "crash.min.stmt")],
//!     Arc::new(StatementLanguage),
//!     Box::new(invariant),
//!     Box::new(DdminStrategy::new()),
//! )
//! .await?;
//!
//! let report = minimizer.run().await?;
//! println!("{}", report);
//! ```
//!
//! ## Guarantees
//!
//! - The working files always hold the last committed state, which parses
//!   and satisfies the invariant (unless a strategy forced a removal).
//! - A refused trial changes no file and no committed text.
//! - Node references are stamped with the forest generation they came
//!   from; references from an older generation are ignored.

pub mod config;
pub mod context;
pub mod control;
pub mod cutter;
pub mod error;
pub mod invariants;
pub mod minimizer;
pub mod result;
pub mod strategies;
pub mod traits;

pub use config::{FileMapping, MinimizerConfig};
pub use context::InvariantContext;
pub use control::{CommitOutcome, PassControl, Rejection};
pub use cutter::{Cutter, CutterState, StagedWrite};
pub use error::{MinimizerError, Result};
pub use invariants::{Acceptance, FnInvariant, ParseableInvariant, ProcessInvariant, ProcessStats};
pub use minimizer::Minimizer;
pub use result::{Checkpoint, MetricsSnapshot, MinimizationReport, MinimizationStats, ProgressEntry};
pub use strategies::{DdminStrategy, GreedyStrategy};
pub use traits::{Invariant, MinimizerOperations, Strategy};

// Re-export commonly used types from scm-core
pub use scm_core::{Forest, Language, NodeRef, NodeSet, StatementLanguage};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reexports() {
        let _config = MinimizerConfig::default();
        let _strategy: Box<dyn Strategy> = Box::new(DdminStrategy::new());
        let _invariant: Box<dyn Invariant> = Box::new(ParseableInvariant::new());
    }
}
