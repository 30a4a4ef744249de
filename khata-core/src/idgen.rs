//! Injected sequential ID generation
//!
//! The ledger never mints its own identifiers; it is handed a generator
//! with an atomic, monotonic, never-reused increment contract.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sequential unique-ID generation contract
///
/// Implementations must be atomic and monotonic, and must never reuse
/// an identifier, even across reversals.
pub trait IdGenerator: Send + Sync {
    /// Produce the next identifier
    fn next_id(&self) -> u64;
}

/// In-process generator backed by an atomic counter
#[derive(Debug)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator starting at the given id
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}
