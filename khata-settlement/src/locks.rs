//! Per-party serialization
//!
//! Every settlement, replay, or reversal for one party must run to
//! completion without interleaving: the allocation's read-modify-write
//! steps are not safe under concurrent access to the same obligation.
//! Operations on different parties are fully independent.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use khata_core::PartyKey;

/// Registry of per-party mutexes
///
/// Callers take the party's mutex for the whole apply-or-replay
/// operation. Locks are created on first use and never removed; the
/// registry grows with the number of distinct parties, not with
/// transaction volume.
#[derive(Debug, Default)]
pub struct PartyLocks {
    locks: DashMap<PartyKey, Arc<Mutex<()>>>,
}

impl PartyLocks {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (creating if needed) the mutex serializing one party
    pub fn acquire(&self, key: &PartyKey) -> Arc<Mutex<()>> {
        self.locks.entry(key.clone()).or_default().clone()
    }
}
