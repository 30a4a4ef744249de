//! Khata Core
//!
//! Data model and storage for the party ledger: farmer/buyer identities,
//! obligations across five categories, and the settlement transaction log.
//!
//! # Invariants
//!
//! - Dues are derived: `due_amount == principal - paid_amount`, always
//! - Conservation: `paid + due == principal` (±0.1) for every obligation
//! - Conservation: `applied + unapplied == amount` for every transaction
//! - Append-only: obligations and transactions are never deleted;
//!   reversal is a flag flip that preserves full audit history

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod error;
pub mod idgen;
pub mod party;
pub mod store;
pub mod types;

// Re-exports
pub use error::{Error, Result};
pub use idgen::{IdGenerator, SequentialIdGenerator};
pub use party::{BuyerIdentity, FarmerIdentity, PartyKey, PartyRef};
pub use store::{ObligationStore, TransactionLog};
pub use types::{
    round_amount, rounding_tolerance, DiscountEntry, DiscountSplit, Obligation,
    ObligationCategory, ObligationStatus, SettlementTransaction, TransactionKind, AMOUNT_SCALE,
};
