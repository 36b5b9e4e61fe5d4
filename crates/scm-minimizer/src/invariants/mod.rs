//! Ready-made invariants.
//!
//! - [`ParseableInvariant`]: every unit still parses
//! - [`FnInvariant`]: an in-process predicate over the trial texts
//! - [`ProcessInvariant`]: an external command judges files written to a
//!   temporary directory

mod closure;
mod parseable;
mod process;

pub use closure::FnInvariant;
pub use parseable::ParseableInvariant;
pub use process::{Acceptance, ProcessInvariant, ProcessStats};
