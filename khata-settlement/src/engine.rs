//! Party settlement engine
//!
//! Applies one transaction's amount across ordered category passes
//! specific to the party type and transaction kind, using the FIFO
//! allocator for every pass.
//!
//! Pass orders:
//!
//! - Farmer payment: opening receivables → freight → advances →
//!   self-sale charges. Overpayment is rejected outright; farmer
//!   payments never create a surplus credit.
//! - Buyer receipt: opening receivables → sale charges (resolved through
//!   current-due-buyer redirection) → extra merchant dues (original
//!   buyer only). Any leftover becomes an inert unapplied credit.
//! - Discount: sale charges of one farmer+buyer pair only.
//! - Transfer: redirects one sale charge's liability to the transferee.

use rust_decimal::Decimal;

use khata_core::{
    round_amount, BuyerIdentity, FarmerIdentity, Obligation, ObligationCategory, ObligationStore,
    PartyKey, PartyRef, SettlementTransaction, TransactionKind,
};

use crate::allocator::FifoAllocator;
use crate::{Error, Result};

/// Category pass order for a farmer payment
pub const FARMER_PASS_ORDER: [ObligationCategory; 4] = [
    ObligationCategory::OpeningReceivable,
    ObligationCategory::FreightRecord,
    ObligationCategory::AdvanceRecord,
    ObligationCategory::SaleCharge,
];

/// Category pass order for a buyer receipt
pub const BUYER_PASS_ORDER: [ObligationCategory; 3] = [
    ObligationCategory::OpeningReceivable,
    ObligationCategory::SaleCharge,
    ObligationCategory::ExtraMerchantDue,
];

/// Orchestrates one transaction's multi-pass allocation
#[derive(Debug)]
pub struct PartySettlementEngine;

impl PartySettlementEngine {
    /// Apply a new transaction. All validation happens before any
    /// mutation; a rejected transaction leaves no partial state.
    pub fn apply(store: &mut ObligationStore, txn: &mut SettlementTransaction) -> Result<()> {
        Self::apply_inner(store, txn, false)
    }

    /// Re-apply a transaction during replay, exactly as if applied for
    /// the first time, except that an overpayment caused by a
    /// retroactively shrunk principal self-heals: the engine applies
    /// what fits and parks the rest as unapplied instead of failing.
    pub fn reapply(store: &mut ObligationStore, txn: &mut SettlementTransaction) -> Result<()> {
        Self::apply_inner(store, txn, true)
    }

    fn apply_inner(
        store: &mut ObligationStore,
        txn: &mut SettlementTransaction,
        lenient: bool,
    ) -> Result<()> {
        match (txn.party.clone(), txn.kind.clone()) {
            (PartyRef::Farmer(farmer), TransactionKind::Receipt) => {
                Self::apply_farmer_payment(store, txn, &farmer, lenient)
            }
            (PartyRef::Buyer(buyer), TransactionKind::Receipt) => {
                Self::apply_buyer_receipt(store, txn, &buyer)
            }
            (PartyRef::Buyer(buyer), TransactionKind::Discount { farmer }) => {
                Self::apply_discount(store, txn, &buyer, &farmer)
            }
            (PartyRef::Farmer(_), TransactionKind::Discount { .. }) => Err(khata_core::Error::Validation(
                "discounts are recorded against the buyer, not the farmer".to_string(),
            )
            .into()),
            (party, TransactionKind::Transfer { obligation_id, to_buyer, .. }) => {
                Self::apply_transfer(store, txn, &party, obligation_id, &to_buyer)
            }
        }
    }

    /// Total remaining due for a party across its pass categories
    pub fn party_total_due(store: &ObligationStore, party: &PartyRef) -> Decimal {
        let key = party.key();
        let mut total = Decimal::ZERO;
        match party {
            PartyRef::Farmer(_) => {
                for category in FARMER_PASS_ORDER {
                    let due = store.total_due(|o| Self::farmer_scope(o, &key, category));
                    total = round_amount(total + due);
                }
            }
            PartyRef::Buyer(_) => {
                for category in BUYER_PASS_ORDER {
                    let due = store.total_due(|o| Self::buyer_scope(o, &key, category));
                    total = round_amount(total + due);
                }
            }
        }
        total
    }

    /// True when an obligation belongs to a farmer's pass for the
    /// given category
    pub fn farmer_scope(obligation: &Obligation, key: &PartyKey, category: ObligationCategory) -> bool {
        if !obligation.active || obligation.category != category {
            return false;
        }
        match category {
            // Self-sale: the farmer settles their own sale charge,
            // unless its liability was transferred to another buyer
            ObligationCategory::SaleCharge => {
                obligation.transferred_to.is_none()
                    && obligation.is_self_sale()
                    && obligation
                        .counterparty
                        .as_ref()
                        .map(|f| &f.key() == key)
                        .unwrap_or(false)
            }
            _ => &obligation.debtor.key() == key,
        }
    }

    /// True when an obligation belongs to a buyer's pass for the
    /// given category
    pub fn buyer_scope(obligation: &Obligation, key: &PartyKey, category: ObligationCategory) -> bool {
        if !obligation.active || obligation.category != category {
            return false;
        }
        match category {
            // Payable party follows an active liability transfer
            ObligationCategory::SaleCharge => &obligation.current_debtor_key() == key,
            // Exempt from redirection: matched to the original buyer only
            ObligationCategory::ExtraMerchantDue => &obligation.debtor.key() == key,
            _ => &obligation.debtor.key() == key,
        }
    }

    fn apply_farmer_payment(
        store: &mut ObligationStore,
        txn: &mut SettlementTransaction,
        farmer: &FarmerIdentity,
        lenient: bool,
    ) -> Result<()> {
        let key = farmer.key();
        let party = PartyRef::Farmer(farmer.clone());
        let total_due = Self::party_total_due(store, &party);

        if total_due <= Decimal::ZERO || txn.amount > total_due {
            if !lenient {
                return Err(Error::Overpayment {
                    payment: txn.amount,
                    total_due,
                });
            }
            tracing::warn!(
                transaction = txn.id,
                payment = %txn.amount,
                total_due = %total_due,
                "replayed farmer payment exceeds current dues; applying what fits"
            );
        }

        let mut remaining = txn.amount;
        let mut applied = Decimal::ZERO;
        for category in FARMER_PASS_ORDER {
            if remaining <= Decimal::ZERO {
                break;
            }
            let mut pass = store.pass_obligations(|o| Self::farmer_scope(o, &key, category));
            let outcome = FifoAllocator::allocate(remaining, &mut pass);
            tracing::debug!(
                transaction = txn.id,
                category = ?category,
                applied = %outcome.applied,
                "farmer payment pass"
            );
            remaining = outcome.remainder;
            applied = round_amount(applied + outcome.applied);
        }

        let due_after = Self::party_total_due(store, &party);
        txn.record_allocation(applied, due_after);
        Ok(())
    }

    fn apply_buyer_receipt(
        store: &mut ObligationStore,
        txn: &mut SettlementTransaction,
        buyer: &BuyerIdentity,
    ) -> Result<()> {
        let key = buyer.key();
        let mut remaining = txn.amount;
        let mut applied = Decimal::ZERO;

        for category in BUYER_PASS_ORDER {
            if remaining <= Decimal::ZERO {
                break;
            }
            let mut pass = store.pass_obligations(|o| Self::buyer_scope(o, &key, category));
            let outcome = FifoAllocator::allocate(remaining, &mut pass);
            tracing::debug!(
                transaction = txn.id,
                category = ?category,
                applied = %outcome.applied,
                "buyer receipt pass"
            );
            remaining = outcome.remainder;
            applied = round_amount(applied + outcome.applied);
        }

        // No overpayment rejection: the leftover stays on the
        // transaction as an inert credit, never auto-carried forward.
        let due_after = Self::party_total_due(store, &PartyRef::Buyer(buyer.clone()));
        txn.record_allocation(applied, due_after);
        Ok(())
    }

    fn apply_discount(
        store: &mut ObligationStore,
        txn: &mut SettlementTransaction,
        buyer: &BuyerIdentity,
        farmer: &FarmerIdentity,
    ) -> Result<()> {
        let buyer_key = buyer.key();
        let farmer_key = farmer.key();

        let mut pass = store.pass_obligations(|o| {
            o.active
                && o.category == ObligationCategory::SaleCharge
                && o.current_debtor_key() == buyer_key
                && o.counterparty
                    .as_ref()
                    .map(|f| f.key() == farmer_key)
                    .unwrap_or(false)
        });
        let outcome = FifoAllocator::allocate(txn.amount, &mut pass);

        let due_after = Self::party_total_due(store, &PartyRef::Buyer(buyer.clone()));
        txn.record_allocation(outcome.applied, due_after);
        Ok(())
    }

    fn apply_transfer(
        store: &mut ObligationStore,
        txn: &mut SettlementTransaction,
        party: &PartyRef,
        obligation_id: u64,
        to_buyer: &BuyerIdentity,
    ) -> Result<()> {
        if party.key() != to_buyer.key() {
            return Err(khata_core::Error::Validation(format!(
                "transfer {} must be recorded against the transferee {}",
                txn.id, to_buyer.name
            ))
            .into());
        }

        let obligation = store.get_mut(obligation_id)?;
        if obligation.category != ObligationCategory::SaleCharge {
            return Err(khata_core::Error::Validation(format!(
                "obligation {} is not a sale charge; only sale charges can be transferred",
                obligation_id
            ))
            .into());
        }

        // Redirecting back to the original owner clears the redirection
        // instead of recording a self-transfer.
        obligation.transferred_to = if to_buyer.key() == obligation.debtor.key() {
            None
        } else {
            Some(to_buyer.clone())
        };

        // The transaction amount snapshots the due at transfer time.
        // Restoring the paid amount from it makes re-applying a transfer
        // re-establish the at-transfer baseline, so a replay of the
        // transferee cannot erase payments made before the liability
        // moved. On a fresh apply this is a no-op.
        obligation.paid_amount =
            round_amount(obligation.principal - txn.amount).max(Decimal::ZERO);
        obligation.recompute_status();

        let due_after = Self::party_total_due(store, party);
        txn.record_allocation(txn.amount, due_after);
        Ok(())
    }
}
