//! Control signals exchanged between the engine and its strategy.
//!
//! A successful removal abandons the rest of the current pass, and a forced
//! removal ends the whole run. Both transfers are values that every layer
//! returns explicitly, so each layer still gets to run its own bookkeeping on
//! the way out.

use std::fmt;

use scm_core::{ParseError, UnitId};

/// What the caller of a removal or cleanup operation must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassControl {
    /// A change was committed. Abandon the current pass and return this
    /// signal unchanged; the pass loop starts the next pass.
    Continue,

    /// The run is over (forced removal). Return this signal unchanged.
    Stop,

    /// Nothing was committed; the caller may try something else.
    Failed(Rejection),
}

impl PassControl {
    /// Returns true for the signals a strategy must pass straight up.
    pub fn is_transfer(&self) -> bool {
        matches!(self, Self::Continue | Self::Stop)
    }

    /// The signal a strategy returns once every candidate has been refused.
    pub fn exhausted() -> Self {
        Self::Failed(Rejection::Exhausted)
    }
}

/// Why a trial was not committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The invariant does not hold for the trial texts.
    InvariantUnsatisfied,

    /// The invariant check did not finish in time.
    TimedOut,

    /// A trial text does not parse.
    Unparseable { unit: UnitId, error: ParseError },

    /// None of the requested nodes exist in the current forest.
    NothingToRemove,

    /// The strategy has no candidates left.
    Exhausted,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvariantUnsatisfied => write!(f, "invariant not satisfied"),
            Self::TimedOut => write!(f, "invariant check timed out"),
            Self::Unparseable { unit, error } => write!(f, "{} does not parse: {}", unit, error),
            Self::NothingToRemove => write!(f, "no known nodes to remove"),
            Self::Exhausted => write!(f, "strategy exhausted"),
        }
    }
}

/// Result of one commit attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Every unit was promoted and the forest replaced.
    Committed,

    /// Nothing changed.
    Rejected(Rejection),
}

impl CommitOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed)
    }

    /// Converts the outcome for callers that abandon the pass on success.
    pub fn into_pass_control(self) -> PassControl {
        match self {
            Self::Committed => PassControl::Continue,
            Self::Rejected(rejection) => PassControl::Failed(rejection),
        }
    }
}
