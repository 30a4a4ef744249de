//! Full-history replay
//!
//! Restores global consistency after any out-of-chronology change
//! (a reversal, a retroactive principal correction) by re-deriving a
//! party's entire ledger from scratch: reset every obligation to
//! pristine, then re-apply every still-active transaction in business
//! timestamp order. One routine, parameterized by an ordered category
//! list per party type.
//!
//! Replay is idempotent and independent of how many prior replays ran.
//! It is deliberately sensitive to timestamp changes: reordering the
//! input reorders the allocation. No incremental replay exists; full
//! re-derivation is the correctness strategy.

use rust_decimal::Decimal;

use khata_core::{
    Obligation, ObligationCategory, ObligationStore, PartyKey, PartyRef, TransactionKind,
    TransactionLog,
};

use crate::engine::{PartySettlementEngine, BUYER_PASS_ORDER, FARMER_PASS_ORDER};
use crate::Result;

/// Ordered obligation categories replayed for one party type
#[derive(Debug, Clone, Copy)]
pub struct ReplayPlan {
    /// Categories in pass order
    pub categories: &'static [ObligationCategory],
}

impl ReplayPlan {
    /// The plan for a party
    pub fn for_party(party: &PartyRef) -> Self {
        match party {
            PartyRef::Farmer(_) => Self {
                categories: &FARMER_PASS_ORDER,
            },
            PartyRef::Buyer(_) => Self {
                categories: &BUYER_PASS_ORDER,
            },
        }
    }

    /// True when an obligation is reset and re-derived by a replay of
    /// the given party
    pub fn in_scope(&self, party: &PartyRef, key: &PartyKey, obligation: &Obligation) -> bool {
        self.categories.iter().any(|&category| match party {
            PartyRef::Farmer(_) => PartySettlementEngine::farmer_scope(obligation, key, category),
            PartyRef::Buyer(_) => PartySettlementEngine::buyer_scope(obligation, key, category),
        })
    }
}

/// Summary of one replay run
#[derive(Debug, Clone)]
pub struct ReplaySummary {
    /// Party replayed
    pub party: PartyKey,

    /// Obligations reset to pristine
    pub obligations_reset: usize,

    /// Active transactions re-applied
    pub transactions_replayed: usize,

    /// Party total due after the replay
    pub total_due_after: Decimal,
}

/// Resets a party to pristine and re-applies its active history
#[derive(Debug)]
pub struct ReplayRecomputer;

impl ReplayRecomputer {
    /// Re-derive a party's ledger from scratch.
    ///
    /// 1. Reset every in-scope obligation to pristine (`paid = 0`,
    ///    status from principal). Redirections this party's transfers
    ///    created are cleared; re-applying the still-active transfers
    ///    re-establishes them, so a reversed transfer's redirection
    ///    simply never comes back.
    /// 2. Collect every still-active transaction of the party across
    ///    all kinds, sorted ascending by business timestamp (ties by
    ///    id), and feed each through the settlement engine exactly as
    ///    if applied for the first time, overwriting each transaction's
    ///    applied/unapplied split and due-balance snapshot.
    pub fn recompute(
        store: &mut ObligationStore,
        log: &mut TransactionLog,
        party: &PartyRef,
    ) -> Result<ReplaySummary> {
        let key = party.key();
        let plan = ReplayPlan::for_party(party);

        let reset_ids: Vec<u64> = store
            .select(|o| plan.in_scope(party, &key, o))
            .iter()
            .map(|o| o.id)
            .collect();
        for id in &reset_ids {
            let obligation = store.get_mut(*id)?;
            obligation.reset_to_pristine();
            if obligation
                .transferred_to
                .as_ref()
                .map(|b| b.key() == key)
                .unwrap_or(false)
            {
                obligation.transferred_to = None;
            }
        }

        let transaction_ids = log.active_ids_for_party(&key);
        for id in &transaction_ids {
            let mut txn = log.get(*id)?.clone();
            txn.reset_allocation();

            // A transfer that a later active transfer has re-redirected
            // must not reclaim the obligation; the later transfer owns
            // the liability now. Its snapshot is still refreshed.
            let superseded = match &txn.kind {
                TransactionKind::Transfer { obligation_id, .. } => {
                    log.blocking_transfer_after(&txn, *obligation_id).is_some()
                }
                _ => false,
            };
            if superseded {
                let due = PartySettlementEngine::party_total_due(store, party);
                txn.record_allocation(txn.amount, due);
            } else {
                PartySettlementEngine::reapply(store, &mut txn)?;
            }
            *log.get_mut(*id)? = txn;
        }

        let total_due_after = PartySettlementEngine::party_total_due(store, party);
        tracing::info!(
            party = %key,
            obligations_reset = reset_ids.len(),
            transactions_replayed = transaction_ids.len(),
            total_due_after = %total_due_after,
            "replay complete"
        );

        Ok(ReplaySummary {
            party: key,
            obligations_reset: reset_ids.len(),
            transactions_replayed: transaction_ids.len(),
            total_due_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use khata_core::{
        BuyerIdentity, FarmerIdentity, ObligationStatus, SettlementTransaction, TransactionKind,
    };
    use rust_decimal::Decimal;

    fn buyer_ref(name: &str) -> PartyRef {
        PartyRef::Buyer(BuyerIdentity::new(name))
    }

    fn setup_buyer(store: &mut ObligationStore) -> PartyRef {
        let buyer = buyer_ref("Shyam Traders");
        let f = FarmerIdentity::new("Ram Kumar", "9876543210", "Rampur");
        for (id, category, amount, age) in [
            (1u64, ObligationCategory::SaleCharge, 1000i64, 5i64),
            (2, ObligationCategory::SaleCharge, 500, 3),
            (3, ObligationCategory::ExtraMerchantDue, 100, 5),
        ] {
            store
                .insert(
                    Obligation::new(
                        id,
                        buyer.clone(),
                        Some(f.clone()),
                        category,
                        Decimal::from(amount),
                        Utc::now() - Duration::days(age),
                    )
                    .unwrap(),
                )
                .unwrap();
        }
        buyer
    }

    fn apply_receipt(
        store: &mut ObligationStore,
        log: &mut TransactionLog,
        id: u64,
        party: PartyRef,
        amount: i64,
        minutes_ago: i64,
    ) {
        let mut txn = SettlementTransaction::new(
            id,
            party,
            TransactionKind::Receipt,
            Decimal::from(amount),
            Utc::now() - Duration::minutes(minutes_ago),
        )
        .unwrap();
        PartySettlementEngine::apply(store, &mut txn).unwrap();
        log.insert(txn).unwrap();
    }

    #[test]
    fn test_replay_is_idempotent() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let buyer = setup_buyer(&mut store);

        apply_receipt(&mut store, &mut log, 10, buyer.clone(), 1200, 60);
        apply_receipt(&mut store, &mut log, 11, buyer.clone(), 300, 30);

        ReplayRecomputer::recompute(&mut store, &mut log, &buyer).unwrap();
        let first: Vec<(Decimal, ObligationStatus)> = store
            .iter()
            .map(|o| (o.paid_amount, o.status))
            .collect();

        ReplayRecomputer::recompute(&mut store, &mut log, &buyer).unwrap();
        let second: Vec<(Decimal, ObligationStatus)> = store
            .iter()
            .map(|o| (o.paid_amount, o.status))
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_replay_orders_by_business_timestamp_not_insertion() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let buyer = setup_buyer(&mut store);

        // Inserted out of order; the later-inserted receipt is older
        apply_receipt(&mut store, &mut log, 10, buyer.clone(), 400, 10);
        apply_receipt(&mut store, &mut log, 11, buyer.clone(), 1100, 120);

        let summary = ReplayRecomputer::recompute(&mut store, &mut log, &buyer).unwrap();
        assert_eq!(summary.transactions_replayed, 2);

        // 1100 lands first (charge 1 cleared, 100 to charge 2), then 400
        // clears charge 2; the surplus never reaches the extra due pass
        assert_eq!(store.get(1).unwrap().due_amount(), Decimal::ZERO);
        assert_eq!(store.get(2).unwrap().due_amount(), Decimal::ZERO);
        assert_eq!(store.get(3).unwrap().due_amount(), Decimal::from(100));
    }

    #[test]
    fn test_replay_with_no_active_transactions_restores_pristine() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let buyer = setup_buyer(&mut store);

        apply_receipt(&mut store, &mut log, 10, buyer.clone(), 1700, 60);
        log.get_mut(10).unwrap().active = false;

        let summary = ReplayRecomputer::recompute(&mut store, &mut log, &buyer).unwrap();
        assert_eq!(summary.transactions_replayed, 0);
        assert_eq!(store.get(1).unwrap().due_amount(), Decimal::from(1000));
        assert_eq!(store.get(2).unwrap().due_amount(), Decimal::from(500));
        assert_eq!(store.get(3).unwrap().due_amount(), Decimal::from(100));
        assert_eq!(summary.total_due_after, Decimal::from(1600));
    }

    /// A charge partially paid by the original buyer and then
    /// transferred keeps the pre-transfer payment across a transferee
    /// replay: re-applying the transfer restores the at-transfer
    /// baseline before the transferee's receipts land.
    #[test]
    fn test_transferee_replay_keeps_pre_transfer_payments() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let original = buyer_ref("Shyam Traders");
        let f = FarmerIdentity::new("Ram Kumar", "9876543210", "Rampur");
        store
            .insert(
                Obligation::new(
                    1,
                    original.clone(),
                    Some(f),
                    ObligationCategory::SaleCharge,
                    Decimal::from(1000),
                    Utc::now() - Duration::days(5),
                )
                .unwrap(),
            )
            .unwrap();

        apply_receipt(&mut store, &mut log, 10, original, 300, 120);
        assert_eq!(store.get(1).unwrap().paid_amount, Decimal::from(300));

        let transferee = BuyerIdentity::new("Gupta & Sons");
        let mut transfer = SettlementTransaction::new(
            11,
            PartyRef::Buyer(transferee.clone()),
            TransactionKind::Transfer {
                obligation_id: 1,
                from_buyer: BuyerIdentity::new("Shyam Traders"),
                to_buyer: transferee.clone(),
            },
            Decimal::from(700),
            Utc::now() - Duration::minutes(90),
        )
        .unwrap();
        PartySettlementEngine::apply(&mut store, &mut transfer).unwrap();
        log.insert(transfer).unwrap();

        apply_receipt(&mut store, &mut log, 12, PartyRef::Buyer(transferee.clone()), 200, 30);
        assert_eq!(store.get(1).unwrap().paid_amount, Decimal::from(500));

        ReplayRecomputer::recompute(&mut store, &mut log, &PartyRef::Buyer(transferee)).unwrap();

        let ob = store.get(1).unwrap();
        assert_eq!(ob.paid_amount, Decimal::from(500));
        assert_eq!(ob.due_amount(), Decimal::from(500));
        // The original buyer's receipt still reads as applied
        assert_eq!(log.get(10).unwrap().applied_amount, Decimal::from(300));
    }

    /// Replaying a party whose transfer was later superseded leaves the
    /// liability with the newest transferee.
    #[test]
    fn test_superseded_transfer_not_reapplied() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        setup_buyer(&mut store);
        let first = BuyerIdentity::new("Gupta & Sons");
        let second = BuyerIdentity::new("Verma Traders");

        for (id, from, to, minutes_ago) in [
            (10u64, BuyerIdentity::new("Shyam Traders"), first.clone(), 90i64),
            (11, first.clone(), second.clone(), 60),
        ] {
            let mut transfer = SettlementTransaction::new(
                id,
                PartyRef::Buyer(to.clone()),
                TransactionKind::Transfer {
                    obligation_id: 1,
                    from_buyer: from,
                    to_buyer: to,
                },
                Decimal::from(1000),
                Utc::now() - Duration::minutes(minutes_ago),
            )
            .unwrap();
            PartySettlementEngine::apply(&mut store, &mut transfer).unwrap();
            log.insert(transfer).unwrap();
        }

        ReplayRecomputer::recompute(&mut store, &mut log, &PartyRef::Buyer(first)).unwrap();

        assert_eq!(store.get(1).unwrap().current_debtor_key(), second.key());
        let superseded = log.get(10).unwrap();
        assert_eq!(superseded.applied_amount, superseded.amount);
    }

    #[test]
    fn test_principal_correction_self_heals_overpayment() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let f = FarmerIdentity::new("Ram Kumar", "9876543210", "Rampur");
        let fref = PartyRef::Farmer(f.clone());

        store
            .insert(
                Obligation::new(
                    1,
                    fref.clone(),
                    None,
                    ObligationCategory::FreightRecord,
                    Decimal::from(1000),
                    Utc::now() - Duration::days(4),
                )
                .unwrap(),
            )
            .unwrap();

        apply_receipt(&mut store, &mut log, 10, fref.clone(), 900, 60);

        // Freight principal corrected down below what was already paid
        store
            .get_mut(1)
            .unwrap()
            .correct_principal(Decimal::from(600))
            .unwrap();
        let summary = ReplayRecomputer::recompute(&mut store, &mut log, &fref).unwrap();

        // The replayed payment applies what fits; the rest is parked
        let ob = store.get(1).unwrap();
        assert_eq!(ob.paid_amount, Decimal::from(600));
        assert_eq!(ob.status, ObligationStatus::Paid);
        let txn = log.get(10).unwrap();
        assert_eq!(txn.applied_amount, Decimal::from(600));
        assert_eq!(txn.unapplied_amount, Decimal::from(300));
        assert!(txn.conserves());
        assert_eq!(summary.total_due_after, Decimal::ZERO);
    }
}
