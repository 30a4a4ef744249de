//! Error types for the settlement engine

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for settlement operations
pub type Result<T> = std::result::Result<T, Error>;

/// Settlement errors
///
/// Every rejection happens before any mutation: a failed operation
/// leaves no partial state behind.
#[derive(Error, Debug)]
pub enum Error {
    /// Core ledger error (validation, not found, invariant violation)
    #[error("Ledger error: {0}")]
    Ledger(#[from] khata_core::Error),

    /// Farmer payment exceeds the total outstanding due (or total due
    /// is zero). Rejected with zero side effects; farmer payments never
    /// create a surplus credit.
    #[error("Overpayment: payment {payment} exceeds total due {total_due}")]
    Overpayment {
        /// Payment amount offered
        payment: Decimal,
        /// Total due across all passes at the time of the payment
        total_due: Decimal,
    },

    /// The transaction has already been reversed
    #[error("Transaction {0} is already reversed")]
    AlreadyReversed(u64),

    /// A later active transaction has re-associated the same obligation,
    /// making this reversal ambiguous
    #[error("Out-of-order reversal of transaction {transaction}: blocked by later transaction {blocking}")]
    OutOfOrderReversal {
        /// Transaction the caller asked to reverse
        transaction: u64,
        /// The later active transaction blocking the reversal
        blocking: u64,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
