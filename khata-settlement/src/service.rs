//! Ledger service facade
//!
//! Owns the obligation store and transaction log, serializes work per
//! party, and exposes the operations the surrounding workflows consume:
//! recording obligations, applying receipts/discounts/transfers,
//! reversing transactions, correcting principals, and producing party
//! statements for downstream reporting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use khata_core::{
    BuyerIdentity, DiscountSplit, FarmerIdentity, IdGenerator, Obligation, ObligationCategory,
    ObligationStatus, ObligationStore, PartyRef, SettlementTransaction, TransactionKind,
    TransactionLog,
};

use crate::config::Config;
use crate::engine::PartySettlementEngine;
use crate::locks::PartyLocks;
use crate::replay::{ReplayRecomputer, ReplaySummary};
use crate::reversal::{ReversalCoordinator, ReversalOutcome};
use crate::{Error, Result};

struct LedgerState {
    store: ObligationStore,
    log: TransactionLog,
}

/// Ledger settlement service
pub struct LedgerService {
    /// Configuration
    config: Config,

    /// Injected sequential ID generation collaborator
    ids: Arc<dyn IdGenerator>,

    /// Per-party serialization
    locks: PartyLocks,

    /// Obligations and transactions
    state: RwLock<LedgerState>,
}

impl std::fmt::Debug for LedgerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerService")
            .field("service_name", &self.config.service_name)
            .finish_non_exhaustive()
    }
}

impl LedgerService {
    /// Create a new service with an injected ID generator
    pub fn new(config: Config, ids: Arc<dyn IdGenerator>) -> Self {
        tracing::info!(
            service = %config.service_name,
            version = %config.service_version,
            "ledger service created"
        );
        Self {
            config,
            ids,
            locks: PartyLocks::new(),
            state: RwLock::new(LedgerState {
                store: ObligationStore::new(),
                log: TransactionLog::new(),
            }),
        }
    }

    /// Record a new obligation from an originating business workflow
    pub fn record_obligation(
        &self,
        debtor: PartyRef,
        counterparty: Option<FarmerIdentity>,
        category: ObligationCategory,
        principal: Decimal,
        created_at: DateTime<Utc>,
    ) -> Result<u64> {
        let lock = self.locks.acquire(&debtor.key());
        let _guard = lock.lock();

        let id = self.ids.next_id();
        let obligation =
            Obligation::new(id, debtor, counterparty, category, principal, created_at)?;

        let mut state = self.state.write();
        state.store.insert(obligation)?;
        tracing::info!(obligation = id, category = ?category, "obligation recorded");
        Ok(id)
    }

    /// Apply a cash receipt (a farmer payment when the party is a
    /// farmer, a buyer receipt otherwise)
    pub fn apply_receipt(
        &self,
        party: PartyRef,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<SettlementTransaction> {
        let lock = self.locks.acquire(&party.key());
        let _guard = lock.lock();

        let id = self.ids.next_id();
        let mut txn =
            SettlementTransaction::new(id, party, TransactionKind::Receipt, amount, occurred_at)?;

        let mut state = self.state.write();
        PartySettlementEngine::apply(&mut state.store, &mut txn)?;
        state.log.insert(txn.clone())?;
        tracing::info!(
            transaction = id,
            applied = %txn.applied_amount,
            unapplied = %txn.unapplied_amount,
            "receipt applied"
        );
        Ok(txn)
    }

    /// Apply a discount split across buyers, one transaction per entry.
    /// The split was validated at construction to sum to the total.
    pub fn apply_discount(
        &self,
        farmer: FarmerIdentity,
        split: DiscountSplit,
        occurred_at: DateTime<Utc>,
    ) -> Result<Vec<SettlementTransaction>> {
        let mut applied = Vec::with_capacity(split.entries().len());
        for entry in split.entries() {
            let party = PartyRef::Buyer(entry.buyer.clone());
            let lock = self.locks.acquire(&party.key());
            let _guard = lock.lock();

            let id = self.ids.next_id();
            let mut txn = SettlementTransaction::new(
                id,
                party,
                TransactionKind::Discount {
                    farmer: farmer.clone(),
                },
                entry.amount,
                occurred_at,
            )?;

            let mut state = self.state.write();
            PartySettlementEngine::apply(&mut state.store, &mut txn)?;
            state.log.insert(txn.clone())?;
            tracing::info!(
                transaction = id,
                buyer = %entry.buyer.name,
                applied = %txn.applied_amount,
                "discount applied"
            );
            applied.push(txn);
        }
        Ok(applied)
    }

    /// Transfer a sale charge's liability to another buyer. The
    /// transaction amount is the obligation's due at transfer time.
    pub fn apply_transfer(
        &self,
        obligation_id: u64,
        to_buyer: BuyerIdentity,
        occurred_at: DateTime<Utc>,
    ) -> Result<SettlementTransaction> {
        let party = PartyRef::Buyer(to_buyer.clone());
        let lock = self.locks.acquire(&party.key());
        let _guard = lock.lock();

        let mut state = self.state.write();
        let (from_buyer, due) = {
            let obligation = state.store.get(obligation_id)?;
            let from = match (&obligation.transferred_to, &obligation.debtor) {
                (Some(current), _) => current.clone(),
                (None, PartyRef::Buyer(original)) => original.clone(),
                (None, PartyRef::Farmer(_)) => {
                    return Err(khata_core::Error::Validation(format!(
                        "obligation {} is farmer-side and cannot be transferred",
                        obligation_id
                    ))
                    .into())
                }
            };
            (from, obligation.due_amount())
        };

        let id = self.ids.next_id();
        let mut txn = SettlementTransaction::new(
            id,
            party,
            TransactionKind::Transfer {
                obligation_id,
                from_buyer: from_buyer.clone(),
                to_buyer: to_buyer.clone(),
            },
            due,
            occurred_at,
        )?;

        PartySettlementEngine::apply(&mut state.store, &mut txn)?;
        state.log.insert(txn.clone())?;
        tracing::info!(
            transaction = id,
            obligation = obligation_id,
            from = %from_buyer.name,
            to = %to_buyer.name,
            "liability transferred"
        );
        Ok(txn)
    }

    /// Reverse a settlement transaction and re-derive the affected
    /// party's ledger
    pub fn reverse(
        &self,
        transaction_id: u64,
        reversed_at: DateTime<Utc>,
    ) -> Result<ReversalOutcome> {
        let party = {
            let state = self.state.read();
            state.log.get(transaction_id)?.party.clone()
        };
        let lock = self.locks.acquire(&party.key());
        let _guard = lock.lock();

        let mut state = self.state.write();
        let state = &mut *state;
        let outcome =
            ReversalCoordinator::reverse(&mut state.store, &mut state.log, transaction_id, reversed_at)?;
        self.verify_conservation(state)?;
        Ok(outcome)
    }

    /// Retroactive principal correction from an external workflow,
    /// followed by the replay that re-derives the dues
    pub fn correct_principal(
        &self,
        obligation_id: u64,
        new_principal: Decimal,
    ) -> Result<ReplaySummary> {
        let party = {
            let state = self.state.read();
            state.store.get(obligation_id)?.settling_party()
        };
        let lock = self.locks.acquire(&party.key());
        let _guard = lock.lock();

        let mut state = self.state.write();
        let state = &mut *state;
        state.store.get_mut(obligation_id)?.correct_principal(new_principal)?;
        tracing::info!(
            obligation = obligation_id,
            principal = %new_principal,
            "principal corrected, replaying party"
        );

        let summary = ReplayRecomputer::recompute(&mut state.store, &mut state.log, &party)?;
        self.verify_conservation(state)?;
        Ok(summary)
    }

    /// Re-derive one party's ledger from its active transaction history
    pub fn recompute(&self, party: &PartyRef) -> Result<ReplaySummary> {
        let lock = self.locks.acquire(&party.key());
        let _guard = lock.lock();

        let mut state = self.state.write();
        let state = &mut *state;
        let summary = ReplayRecomputer::recompute(&mut state.store, &mut state.log, party)?;
        self.verify_conservation(state)?;
        Ok(summary)
    }

    /// Per-obligation and per-transaction view of one party's ledger
    pub fn party_statement(&self, party: &PartyRef) -> PartyStatement {
        let state = self.state.read();
        let key = party.key();

        let obligations = state
            .store
            .party_obligations(&key)
            .into_iter()
            .map(|o| ObligationSnapshot {
                id: o.id,
                category: o.category,
                principal: o.principal,
                paid_amount: o.paid_amount,
                due_amount: o.due_amount(),
                status: o.status,
                transferred_to: o.transferred_to.as_ref().map(|b| b.name.clone()),
            })
            .collect();

        let transactions = state
            .log
            .party_transactions(&key)
            .into_iter()
            .map(|t| TransactionSnapshot {
                id: t.id,
                kind: t.kind.tag().to_string(),
                amount: t.amount,
                applied_amount: t.applied_amount,
                unapplied_amount: t.unapplied_amount,
                due_balance_after: t.due_balance_after,
                occurred_at: t.occurred_at,
                active: t.active,
            })
            .collect();

        PartyStatement {
            party: party.to_string(),
            total_due: PartySettlementEngine::party_total_due(&state.store, party),
            obligations,
            transactions,
        }
    }

    fn verify_conservation(&self, state: &LedgerState) -> Result<()> {
        if !self.config.replay.verify_conservation {
            return Ok(());
        }
        for obligation in state.store.iter() {
            if !obligation.conserves() {
                return Err(Error::Ledger(khata_core::Error::InvariantViolation(
                    format!("obligation {} paid/due drift", obligation.id),
                )));
            }
        }
        for txn in state.log.iter() {
            if !txn.conserves() {
                return Err(Error::Ledger(khata_core::Error::InvariantViolation(
                    format!("transaction {} applied/unapplied split", txn.id),
                )));
            }
        }
        Ok(())
    }
}

/// Reporting view of one obligation
#[derive(Debug, Clone, Serialize)]
pub struct ObligationSnapshot {
    /// Obligation ID
    pub id: u64,
    /// Category
    pub category: ObligationCategory,
    /// Principal
    pub principal: Decimal,
    /// Paid so far
    pub paid_amount: Decimal,
    /// Derived remaining due
    pub due_amount: Decimal,
    /// Status
    pub status: ObligationStatus,
    /// Transferee name when the liability is redirected
    pub transferred_to: Option<String>,
}

/// Reporting view of one settlement transaction
#[derive(Debug, Clone, Serialize)]
pub struct TransactionSnapshot {
    /// Transaction ID
    pub id: u64,
    /// Kind tag
    pub kind: String,
    /// Amount
    pub amount: Decimal,
    /// Applied to obligations
    pub applied_amount: Decimal,
    /// Inert leftover credit
    pub unapplied_amount: Decimal,
    /// Party total due right after this transaction
    pub due_balance_after: Decimal,
    /// Business timestamp
    pub occurred_at: DateTime<Utc>,
    /// False once reversed
    pub active: bool,
}

/// Per-party statement for downstream reporting
#[derive(Debug, Clone, Serialize)]
pub struct PartyStatement {
    /// Party display name
    pub party: String,
    /// Total remaining due across the party's pass categories
    pub total_due: Decimal,
    /// Obligation views, oldest first
    pub obligations: Vec<ObligationSnapshot>,
    /// Transaction views in chronological order, reversed included
    pub transactions: Vec<TransactionSnapshot>,
}
