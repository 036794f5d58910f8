//! Error types for identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The identifier contains whitespace or control characters.
    #[error("{kind} contains whitespace or control characters: '{actual}'")]
    InvalidCharacter { kind: &'static str, actual: String },

    /// The identifier exceeds the maximum length.
    #[error("{kind} exceeds {max} characters")]
    TooLong { kind: &'static str, max: usize },

    /// The identifier format is invalid.
    #[error("invalid {kind}: {message}")]
    InvalidFormat { kind: &'static str, message: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }
}
