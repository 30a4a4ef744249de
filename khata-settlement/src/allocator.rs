//! FIFO allocation of an amount across ordered obligations
//!
//! Pure allocation step shared by every settlement pass: apply an amount
//! to the oldest unpaid obligations first, rounding after every
//! arithmetic step so repeated allocations cannot accumulate drift.

use rust_decimal::Decimal;

use khata_core::{round_amount, Obligation, ObligationStatus};

/// A remaining due strictly below this threshold (1 currency unit,
/// deliberately coarser than one cent) is treated as fully settled:
/// the obligation is forced to `Paid` even though its due is not
/// exactly zero, and later allocations skip it. Absorbs rounding
/// residue from historical data.
pub const PETTY_THRESHOLD: Decimal = Decimal::ONE;

/// Per-obligation result of one allocation
#[derive(Debug, Clone)]
pub struct AllocationDelta {
    /// Obligation touched
    pub obligation_id: u64,

    /// Amount applied to this obligation
    pub applied: Decimal,

    /// Remaining due after the application
    pub due_after: Decimal,

    /// Status after the application
    pub status_after: ObligationStatus,
}

/// Result of allocating an amount across one ordered pass
#[derive(Debug, Clone)]
pub struct AllocationOutcome {
    /// Total amount applied across the pass
    pub applied: Decimal,

    /// Amount left over after the pass was exhausted
    pub remainder: Decimal,

    /// Per-obligation deltas, in application order
    pub deltas: Vec<AllocationDelta>,
}

impl AllocationOutcome {
    fn untouched(amount: Decimal) -> Self {
        Self {
            applied: Decimal::ZERO,
            remainder: amount,
            deltas: Vec::new(),
        }
    }
}

/// Oldest-first allocator
#[derive(Debug)]
pub struct FifoAllocator;

impl FifoAllocator {
    /// Apply `amount` to the obligations oldest-first.
    ///
    /// Obligations are ordered by creation time with ties broken by id
    /// (a stable insertion key). Each obligation with a positive due
    /// absorbs `min(remaining, due)`; allocation stops when the amount
    /// is exhausted or the list ends. Every intermediate amount is
    /// rounded immediately after each addition/subtraction.
    pub fn allocate(amount: Decimal, obligations: &mut [&mut Obligation]) -> AllocationOutcome {
        let mut remaining = round_amount(amount);
        if remaining <= Decimal::ZERO {
            return AllocationOutcome::untouched(remaining);
        }

        obligations.sort_by_key(|o| (o.created_at, o.id));

        let mut applied_total = Decimal::ZERO;
        let mut deltas = Vec::new();

        for obligation in obligations.iter_mut() {
            if remaining <= Decimal::ZERO {
                break;
            }
            // Settled obligations are skipped, a petty residue included
            if obligation.status == ObligationStatus::Paid {
                continue;
            }
            let due = obligation.due_amount();
            if due <= Decimal::ZERO {
                continue;
            }

            let take = remaining.min(due);
            obligation.apply_payment(take);
            remaining = round_amount(remaining - take);
            applied_total = round_amount(applied_total + take);

            // Petty absorption: a residue below one unit counts as settled
            if obligation.due_amount() < PETTY_THRESHOLD {
                obligation.status = ObligationStatus::Paid;
            }

            deltas.push(AllocationDelta {
                obligation_id: obligation.id,
                applied: take,
                due_after: obligation.due_amount(),
                status_after: obligation.status,
            });
        }

        AllocationOutcome {
            applied: applied_total,
            remainder: remaining,
            deltas,
        }
    }
}
