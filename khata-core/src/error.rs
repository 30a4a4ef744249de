//! Error types for the core ledger data model

use thiserror::Error;

/// Result type for core ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Validation error (non-positive amount, missing party identity, etc.)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Obligation, transaction, or party not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invariant violation (conservation, applied/unapplied split, etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
