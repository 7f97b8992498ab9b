//! Validation errors for core domain types.

use thiserror::Error;

/// Errors produced while parsing or validating core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A transaction signature was not a base58 string of plausible length.
    #[error("invalid signature '{value}': {reason}")]
    InvalidSignature {
        /// The rejected input.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Unknown commitment level.
    #[error("unknown commitment level: {0}")]
    InvalidCommitment(String),

    /// The subscription target was empty.
    #[error("subscription target must not be empty")]
    EmptyTarget,
}
