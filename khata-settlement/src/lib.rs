//! Khata Settlement Engine
//!
//! Allocates incoming payments, discounts, and liability transfers
//! against a party's outstanding obligations in strict oldest-first
//! order, and restores global consistency whenever any historical
//! settlement transaction is reversed out of chronological order.
//!
//! # Architecture
//!
//! 1. **Allocation**: a transaction cascades across obligation
//!    categories in a fixed pass order, oldest obligation first
//! 2. **Redirection**: a sale charge's payable party follows an active
//!    liability transfer and reverts when that transfer is reversed
//! 3. **Replay**: any out-of-chronology change triggers a full
//!    re-derivation of the party's ledger from its active history
//! 4. **Serialization**: one party's mutations never interleave;
//!    different parties settle independently
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use rust_decimal::Decimal;
//! use khata_core::{BuyerIdentity, ObligationCategory, PartyRef, SequentialIdGenerator};
//! use khata_settlement::{Config, LedgerService};
//!
//! fn main() -> khata_settlement::Result<()> {
//!     let service = LedgerService::new(Config::default(), Arc::new(SequentialIdGenerator::default()));
//!     let buyer = PartyRef::Buyer(BuyerIdentity::new("Shyam Traders"));
//!
//!     service.record_obligation(buyer.clone(), None, ObligationCategory::SaleCharge,
//!                               Decimal::from(1000), Utc::now())?;
//!     let receipt = service.apply_receipt(buyer, Decimal::from(400), Utc::now())?;
//!     assert_eq!(receipt.due_balance_after, Decimal::from(600));
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod allocator;
pub mod config;
pub mod engine;
pub mod error;
pub mod locks;
pub mod replay;
pub mod reversal;
pub mod service;

// Re-exports
pub use allocator::{AllocationDelta, AllocationOutcome, FifoAllocator, PETTY_THRESHOLD};
pub use config::{Config, ReplayConfig};
pub use engine::{PartySettlementEngine, BUYER_PASS_ORDER, FARMER_PASS_ORDER};
pub use error::{Error, Result};
pub use locks::PartyLocks;
pub use replay::{ReplayPlan, ReplayRecomputer, ReplaySummary};
pub use reversal::{ReversalCoordinator, ReversalOutcome};
pub use service::{LedgerService, ObligationSnapshot, PartyStatement, TransactionSnapshot};
