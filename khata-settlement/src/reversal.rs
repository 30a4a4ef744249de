//! Out-of-order reversal of settlement transactions
//!
//! Reversal never deletes: it flips the `active` flag, stamps the
//! reversal time, and re-derives the affected ledger through a full
//! replay. Transfers additionally restore the redirected obligation's
//! liability to its prior owner, because a transfer mutates which
//! obligation a due belongs to, not merely how much is paid, and a
//! replay of the transferee alone cannot restore that ownership.

use chrono::{DateTime, Utc};

use khata_core::{ObligationStore, PartyRef, TransactionKind, TransactionLog};

use crate::replay::{ReplayRecomputer, ReplaySummary};
use crate::{Error, Result};

/// Result of a reversal
#[derive(Debug, Clone)]
pub struct ReversalOutcome {
    /// The reversed transaction
    pub transaction_id: u64,

    /// Party whose ledger was re-derived
    pub party: PartyRef,

    /// Replay summary for the owning party
    pub replay: ReplaySummary,

    /// Replay summary for the restored owner, when reversing a transfer
    /// whose liability moved back to a different party
    pub restored_owner_replay: Option<ReplaySummary>,
}

/// Coordinates reversal, ownership restoration, and replay
#[derive(Debug)]
pub struct ReversalCoordinator;

impl ReversalCoordinator {
    /// Reverse a settlement transaction out of chronological order.
    ///
    /// Fails with `NotFound` for an unknown transaction,
    /// `AlreadyReversed` for an inactive one, and `OutOfOrderReversal`
    /// (naming the blocking transaction) when a later active transfer
    /// has re-redirected the same obligation, which would make the
    /// reversal ambiguous. All checks run before any mutation.
    pub fn reverse(
        store: &mut ObligationStore,
        log: &mut TransactionLog,
        transaction_id: u64,
        reversed_at: DateTime<Utc>,
    ) -> Result<ReversalOutcome> {
        let txn = log.get(transaction_id)?.clone();
        if !txn.active {
            return Err(Error::AlreadyReversed(transaction_id));
        }

        if let TransactionKind::Transfer { obligation_id, .. } = &txn.kind {
            if let Some(blocking) = log.blocking_transfer_after(&txn, *obligation_id) {
                return Err(Error::OutOfOrderReversal {
                    transaction: transaction_id,
                    blocking: blocking.id,
                });
            }
        }

        {
            let record = log.get_mut(transaction_id)?;
            record.active = false;
            record.reversed_at = Some(reversed_at);
        }

        // Restore transfer-specific liability redirection before the
        // replay, so the obligation is re-derived under its prior owner.
        let mut restored_owner: Option<PartyRef> = None;
        if let TransactionKind::Transfer {
            obligation_id,
            from_buyer,
            ..
        } = &txn.kind
        {
            let obligation = store.get_mut(*obligation_id)?;
            if from_buyer.key() == obligation.debtor.key() {
                obligation.transferred_to = None;
            } else {
                obligation.transferred_to = Some(from_buyer.clone());
            }
            // Settling party, not from_buyer: a restored self-sale
            // charge is re-derived by the farmer's history
            let owner = obligation.settling_party();
            if owner.key() != txn.party.key() {
                restored_owner = Some(owner);
            }
        }

        tracing::info!(
            transaction = transaction_id,
            kind = txn.kind.tag(),
            party = %txn.party.key(),
            "transaction reversed, replaying party"
        );

        let replay = ReplayRecomputer::recompute(store, log, &txn.party)?;
        let restored_owner_replay = match restored_owner {
            Some(owner) => Some(ReplayRecomputer::recompute(store, log, &owner)?),
            None => None,
        };

        Ok(ReversalOutcome {
            transaction_id,
            party: txn.party,
            replay,
            restored_owner_replay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PartySettlementEngine;
    use chrono::Duration;
    use khata_core::{
        BuyerIdentity, FarmerIdentity, Obligation, ObligationCategory, SettlementTransaction,
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

    fn apply_and_log(
        store: &mut ObligationStore,
        log: &mut TransactionLog,
        mut txn: SettlementTransaction,
    ) -> u64 {
        PartySettlementEngine::apply(store, &mut txn).unwrap();
        let id = txn.id;
        log.insert(txn).unwrap();
        id
    }

    /// Reversing the only receipt restores the pristine obligation set
    /// via a replay of zero remaining transactions.
    #[test]
    fn test_reversal_restores_pristine_state() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let buyer = setup_buyer(&mut store);

        let txn = SettlementTransaction::new(
            10,
            buyer.clone(),
            TransactionKind::Receipt,
            Decimal::from(1700),
            Utc::now() - Duration::minutes(30),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, txn);
        assert_eq!(store.get(1).unwrap().due_amount(), Decimal::ZERO);

        let outcome = ReversalCoordinator::reverse(&mut store, &mut log, 10, Utc::now()).unwrap();
        assert_eq!(outcome.replay.transactions_replayed, 0);

        assert_eq!(store.get(1).unwrap().due_amount(), Decimal::from(1000));
        assert_eq!(store.get(2).unwrap().due_amount(), Decimal::from(500));
        assert_eq!(store.get(3).unwrap().due_amount(), Decimal::from(100));

        let reversed = log.get(10).unwrap();
        assert!(!reversed.active);
        assert!(reversed.reversed_at.is_some());
    }

    #[test]
    fn test_unknown_transaction_not_found() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let result = ReversalCoordinator::reverse(&mut store, &mut log, 99, Utc::now());
        assert!(matches!(
            result,
            Err(Error::Ledger(khata_core::Error::NotFound(_)))
        ));
    }

    #[test]
    fn test_double_reversal_rejected() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let buyer = setup_buyer(&mut store);

        let txn = SettlementTransaction::new(
            10,
            buyer,
            TransactionKind::Receipt,
            Decimal::from(200),
            Utc::now() - Duration::minutes(30),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, txn);

        ReversalCoordinator::reverse(&mut store, &mut log, 10, Utc::now()).unwrap();
        let again = ReversalCoordinator::reverse(&mut store, &mut log, 10, Utc::now());
        assert!(matches!(again, Err(Error::AlreadyReversed(10))));
    }

    /// Reversing a transfer restores liability to the original buyer
    /// and re-derives both parties.
    #[test]
    fn test_transfer_reversal_restores_liability() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let original = setup_buyer(&mut store);
        let transferee = BuyerIdentity::new("Gupta & Sons");

        let transfer = SettlementTransaction::new(
            10,
            PartyRef::Buyer(transferee.clone()),
            TransactionKind::Transfer {
                obligation_id: 1,
                from_buyer: BuyerIdentity::new("Shyam Traders"),
                to_buyer: transferee.clone(),
            },
            Decimal::from(1000),
            Utc::now() - Duration::minutes(60),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, transfer);

        // Transferee pays the redirected charge
        let receipt = SettlementTransaction::new(
            11,
            PartyRef::Buyer(transferee.clone()),
            TransactionKind::Receipt,
            Decimal::from(1000),
            Utc::now() - Duration::minutes(30),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, receipt);
        assert_eq!(store.get(1).unwrap().due_amount(), Decimal::ZERO);

        let outcome = ReversalCoordinator::reverse(&mut store, &mut log, 10, Utc::now()).unwrap();
        assert!(outcome.restored_owner_replay.is_some());

        // Liability reverts to the original buyer, unpaid again; the
        // transferee's receipt is now an inert credit
        let ob = store.get(1).unwrap();
        assert!(ob.transferred_to.is_none());
        assert_eq!(ob.due_amount(), Decimal::from(1000));
        assert_eq!(ob.current_debtor_key(), original.key());

        let receipt = log.get(11).unwrap();
        assert_eq!(receipt.applied_amount, Decimal::ZERO);
        assert_eq!(receipt.unapplied_amount, Decimal::from(1000));
    }

    /// Reversing an unrelated transferee receipt replays the transferee,
    /// which must not erase the original buyer's pre-transfer payment on
    /// a transferred-in charge.
    #[test]
    fn test_reversal_replay_preserves_pre_transfer_payment() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        let original = buyer_ref("Shyam Traders");
        let transferee = BuyerIdentity::new("Gupta & Sons");
        let f = FarmerIdentity::new("Ram Kumar", "9876543210", "Rampur");

        for (id, debtor, amount, age_days) in [
            (1u64, original.clone(), 1000i64, 5i64),
            (2, PartyRef::Buyer(transferee.clone()), 200, 6),
        ] {
            store
                .insert(
                    Obligation::new(
                        id,
                        debtor,
                        Some(f.clone()),
                        ObligationCategory::SaleCharge,
                        Decimal::from(amount),
                        Utc::now() - Duration::days(age_days),
                    )
                    .unwrap(),
                )
                .unwrap();
        }

        // Original buyer pays 300 before the liability moves
        let receipt = SettlementTransaction::new(
            10,
            original,
            TransactionKind::Receipt,
            Decimal::from(300),
            Utc::now() - Duration::minutes(120),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, receipt);

        let transfer = SettlementTransaction::new(
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
        apply_and_log(&mut store, &mut log, transfer);

        // Transferee settles their own older charge
        let unrelated = SettlementTransaction::new(
            12,
            PartyRef::Buyer(transferee),
            TransactionKind::Receipt,
            Decimal::from(200),
            Utc::now() - Duration::minutes(60),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, unrelated);
        assert_eq!(store.get(2).unwrap().due_amount(), Decimal::ZERO);

        ReversalCoordinator::reverse(&mut store, &mut log, 12, Utc::now()).unwrap();

        // The replayed transfer restored the at-transfer baseline
        let charge = store.get(1).unwrap();
        assert_eq!(charge.paid_amount, Decimal::from(300));
        assert_eq!(charge.due_amount(), Decimal::from(700));
        assert_eq!(store.get(2).unwrap().due_amount(), Decimal::from(200));
        assert_eq!(log.get(10).unwrap().applied_amount, Decimal::from(300));
    }

    /// A transfer cannot be reversed once a later active transfer has
    /// re-redirected the same obligation.
    #[test]
    fn test_out_of_order_transfer_reversal_blocked() {
        let mut store = ObligationStore::new();
        let mut log = TransactionLog::new();
        setup_buyer(&mut store);
        let first = BuyerIdentity::new("Gupta & Sons");
        let second = BuyerIdentity::new("Verma Traders");

        let transfer1 = SettlementTransaction::new(
            10,
            PartyRef::Buyer(first.clone()),
            TransactionKind::Transfer {
                obligation_id: 1,
                from_buyer: BuyerIdentity::new("Shyam Traders"),
                to_buyer: first.clone(),
            },
            Decimal::from(1000),
            Utc::now() - Duration::minutes(60),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, transfer1);

        let transfer2 = SettlementTransaction::new(
            11,
            PartyRef::Buyer(second.clone()),
            TransactionKind::Transfer {
                obligation_id: 1,
                from_buyer: first,
                to_buyer: second,
            },
            Decimal::from(1000),
            Utc::now() - Duration::minutes(30),
        )
        .unwrap();
        apply_and_log(&mut store, &mut log, transfer2);

        let result = ReversalCoordinator::reverse(&mut store, &mut log, 10, Utc::now());
        assert!(matches!(
            result,
            Err(Error::OutOfOrderReversal {
                transaction: 10,
                blocking: 11,
            })
        ));

        // Nothing was mutated by the rejected reversal
        assert!(log.get(10).unwrap().active);
        assert_eq!(
            store.get(1).unwrap().current_debtor_key(),
            BuyerIdentity::new("Verma Traders").key()
        );
    }
}
