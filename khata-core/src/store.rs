//! In-memory obligation store and transaction log
//!
//! Both containers are append-only from the engine's point of view:
//! records are inserted once and mutated in place, never removed.
//! Insertion order is stable so `(created_at, id)` gives a total FIFO
//! ordering even when timestamps collide.

use rust_decimal::Decimal;

use crate::party::PartyKey;
use crate::types::{
    round_amount, Obligation, ObligationStatus, SettlementTransaction, TransactionKind,
};
use crate::{Error, Result};

/// Holds every obligation, grouped on demand by party and category
#[derive(Debug, Default)]
pub struct ObligationStore {
    obligations: Vec<Obligation>,
}

impl ObligationStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new obligation
    pub fn insert(&mut self, obligation: Obligation) -> Result<u64> {
        if self.obligations.iter().any(|o| o.id == obligation.id) {
            return Err(Error::Validation(format!(
                "duplicate obligation id {}",
                obligation.id
            )));
        }
        let id = obligation.id;
        self.obligations.push(obligation);
        Ok(id)
    }

    /// Look up an obligation
    pub fn get(&self, id: u64) -> Result<&Obligation> {
        self.obligations
            .iter()
            .find(|o| o.id == id)
            .ok_or_else(|| Error::NotFound(format!("obligation {}", id)))
    }

    /// Look up an obligation mutably
    pub fn get_mut(&mut self, id: u64) -> Result<&mut Obligation> {
        self.obligations
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| Error::NotFound(format!("obligation {}", id)))
    }

    /// Mutable obligations matching a predicate, oldest first
    /// (creation time, ties broken by id)
    pub fn pass_obligations<P>(&mut self, predicate: P) -> Vec<&mut Obligation>
    where
        P: Fn(&Obligation) -> bool,
    {
        let mut selected: Vec<&mut Obligation> = self
            .obligations
            .iter_mut()
            .filter(|o| predicate(o))
            .collect();
        selected.sort_by_key(|o| (o.created_at, o.id));
        selected
    }

    /// Obligations matching a predicate, oldest first (read-only)
    pub fn select<P>(&self, predicate: P) -> Vec<&Obligation>
    where
        P: Fn(&Obligation) -> bool,
    {
        let mut selected: Vec<&Obligation> =
            self.obligations.iter().filter(|o| predicate(o)).collect();
        selected.sort_by_key(|o| (o.created_at, o.id));
        selected
    }

    /// Every obligation currently or originally owed by a party. For a
    /// farmer this includes their self-sale charges, which the farmer
    /// settles even though the debtor of record is the buyer row.
    pub fn party_obligations(&self, key: &PartyKey) -> Vec<&Obligation> {
        self.select(|o| {
            &o.debtor.key() == key
                || &o.current_debtor_key() == key
                || (o.is_self_sale()
                    && o.counterparty
                        .as_ref()
                        .map(|f| &f.key() == key)
                        .unwrap_or(false))
        })
    }

    /// Total remaining due across obligations matching a predicate.
    /// Settled obligations contribute nothing, even when a petty
    /// residue keeps their derived due above zero.
    pub fn total_due<P>(&self, predicate: P) -> Decimal
    where
        P: Fn(&Obligation) -> bool,
    {
        let mut total = Decimal::ZERO;
        for obligation in self.obligations.iter().filter(|o| predicate(o)) {
            if obligation.status == ObligationStatus::Paid {
                continue;
            }
            total = round_amount(total + obligation.due_amount());
        }
        total
    }

    /// Iterate all obligations in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Obligation> {
        self.obligations.iter()
    }

    /// Number of obligations
    pub fn len(&self) -> usize {
        self.obligations.len()
    }

    /// True when the store is empty
    pub fn is_empty(&self) -> bool {
        self.obligations.is_empty()
    }
}

/// Holds every settlement transaction, active or reversed
#[derive(Debug, Default)]
pub struct TransactionLog {
    transactions: Vec<SettlementTransaction>,
}

impl TransactionLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new transaction
    pub fn insert(&mut self, transaction: SettlementTransaction) -> Result<u64> {
        if self.transactions.iter().any(|t| t.id == transaction.id) {
            return Err(Error::Validation(format!(
                "duplicate transaction id {}",
                transaction.id
            )));
        }
        let id = transaction.id;
        self.transactions.push(transaction);
        Ok(id)
    }

    /// Look up a transaction
    pub fn get(&self, id: u64) -> Result<&SettlementTransaction> {
        self.transactions
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))
    }

    /// Look up a transaction mutably
    pub fn get_mut(&mut self, id: u64) -> Result<&mut SettlementTransaction> {
        self.transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::NotFound(format!("transaction {}", id)))
    }

    /// IDs of every still-active transaction for a party, ascending by
    /// business timestamp with ties broken by id
    pub fn active_ids_for_party(&self, key: &PartyKey) -> Vec<u64> {
        let mut active: Vec<&SettlementTransaction> = self
            .transactions
            .iter()
            .filter(|t| t.active && &t.party.key() == key)
            .collect();
        active.sort_by_key(|t| (t.occurred_at, t.id));
        active.iter().map(|t| t.id).collect()
    }

    /// All transactions for a party in chronological order, reversed
    /// ones included (audit view)
    pub fn party_transactions(&self, key: &PartyKey) -> Vec<&SettlementTransaction> {
        let mut all: Vec<&SettlementTransaction> = self
            .transactions
            .iter()
            .filter(|t| &t.party.key() == key)
            .collect();
        all.sort_by_key(|t| (t.occurred_at, t.id));
        all
    }

    /// Find an active transfer later than the given transaction that
    /// re-redirects the same obligation
    pub fn blocking_transfer_after(
        &self,
        reversing: &SettlementTransaction,
        obligation_id: u64,
    ) -> Option<&SettlementTransaction> {
        self.transactions
            .iter()
            .filter(|t| t.active && t.id != reversing.id)
            .filter(|t| (t.occurred_at, t.id) > (reversing.occurred_at, reversing.id))
            .find(|t| {
                matches!(
                    &t.kind,
                    TransactionKind::Transfer { obligation_id: ob, .. } if *ob == obligation_id
                )
            })
    }

    /// Iterate all transactions in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &SettlementTransaction> {
        self.transactions.iter()
    }

    /// Number of transactions
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True when the log is empty
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
