//! Error types for syntax tree construction.
//!
//! Parse failures are an expected outcome while minimizing: every trial text
//! is re-parsed and a failure simply rejects the trial. They therefore carry
//! enough context for logging but nothing that would make them expensive.

use thiserror::Error;

/// A source text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", self.render())]
pub struct ParseError {
    /// What went wrong.
    pub message: String,

    /// Byte offset into the source text, when the parser knows one.
    pub offset: Option<usize>,
}

impl ParseError {
    /// Creates a parse error located at `offset`.
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset: Some(offset),
        }
    }

    /// Creates a parse error without location information.
    pub fn unlocated(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            offset: None,
        }
    }

    fn render(&self) -> String {
        match self.offset {
            Some(offset) => format!("parse error at byte {}: {}", offset, self.message),
            None => format!("parse error: {}", self.message),
        }
    }
}
