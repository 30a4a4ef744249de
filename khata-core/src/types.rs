//! Core types for the party ledger
//!
//! All types are designed for:
//! - Exact arithmetic (Decimal for money, rounded to one decimal place)
//! - Derived dues (`due_amount` is always computed, never stored)
//! - Full audit history (nothing is ever deleted, reversal is a flag flip)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::party::{BuyerIdentity, FarmerIdentity, PartyKey, PartyRef};
use crate::{Error, Result};

/// Decimal places kept on every amount. Every intermediate amount is
/// rounded to this scale immediately after each addition/subtraction.
pub const AMOUNT_SCALE: u32 = 1;

/// Round an amount to the ledger scale
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp(AMOUNT_SCALE)
}

/// Rounding tolerance for the `paid + due == principal` invariant
/// (0.1 currency units)
pub fn rounding_tolerance() -> Decimal {
    Decimal::new(1, 1)
}

/// Obligation category
///
/// Categories interact: a single payment may cascade across several of
/// them in a fixed pass order decided by the settlement engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObligationCategory {
    /// Opening balance carried in from a prior period
    OpeningReceivable = 1,
    /// Buyer-owed charge for a finalized sale
    SaleCharge = 2,
    /// Buyer-side surcharge sub-ledger, never redirected by transfers
    ExtraMerchantDue = 3,
    /// Cash advance issued to a farmer
    AdvanceRecord = 4,
    /// Farmer-side freight due (principal may be corrected upward
    /// externally as interest accrues)
    FreightRecord = 5,
}

/// Obligation status, derived from the remaining due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObligationStatus {
    /// Nothing paid yet
    Due = 1,
    /// Partially paid
    Partial = 2,
    /// Fully settled (possibly within the petty threshold)
    Paid = 3,
}

/// A single debt owed by a party
///
/// Created by the originating business workflow; mutated only by
/// allocation or replay; never deleted. A closed obligation is
/// represented by status `Paid`, not by removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Obligation {
    /// Unique obligation ID (from the injected sequential generator)
    pub id: u64,

    /// Original owing party
    pub debtor: PartyRef,

    /// Farmer counterparty (set on sale-derived categories; used for
    /// discount pair matching and self-sale detection)
    pub counterparty: Option<FarmerIdentity>,

    /// Obligation category
    pub category: ObligationCategory,

    /// Principal amount. Immutable to the engine; retroactive external
    /// corrections go through [`Obligation::correct_principal`] and
    /// require a replay.
    pub principal: Decimal,

    /// Amount paid so far
    pub paid_amount: Decimal,

    /// Derived status
    pub status: ObligationStatus,

    /// Creation timestamp (FIFO ordering key, ties broken by `id`)
    pub created_at: DateTime<Utc>,

    /// Active flag
    pub active: bool,

    /// Active liability redirection: if set, the payable party is this
    /// buyer instead of `debtor`. Only ever set on sale charges;
    /// extra merchant dues are exempt from redirection.
    pub transferred_to: Option<BuyerIdentity>,
}

impl Obligation {
    /// Create a new obligation
    pub fn new(
        id: u64,
        debtor: PartyRef,
        counterparty: Option<FarmerIdentity>,
        category: ObligationCategory,
        principal: Decimal,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        debtor.validate()?;
        if principal < Decimal::ZERO {
            return Err(Error::Validation(format!(
                "negative principal {} for obligation {}",
                principal, id
            )));
        }

        let principal = round_amount(principal);
        let mut obligation = Self {
            id,
            debtor,
            counterparty,
            category,
            principal,
            paid_amount: Decimal::ZERO,
            status: ObligationStatus::Due,
            created_at,
            active: true,
            transferred_to: None,
        };
        obligation.recompute_status();
        Ok(obligation)
    }

    /// Remaining due, always derived from principal and paid amount
    pub fn due_amount(&self) -> Decimal {
        round_amount(self.principal - self.paid_amount)
    }

    /// Key of the party currently liable for this obligation, resolved
    /// through any active liability redirection
    pub fn current_debtor_key(&self) -> PartyKey {
        match &self.transferred_to {
            Some(buyer) => buyer.key(),
            None => self.debtor.key(),
        }
    }

    /// The party whose settlement passes cover this obligation: the
    /// transferee under an active redirection, the farmer for an
    /// unredirected self-sale charge, the debtor otherwise
    pub fn settling_party(&self) -> PartyRef {
        if let Some(buyer) = &self.transferred_to {
            return PartyRef::Buyer(buyer.clone());
        }
        if self.is_self_sale() {
            if let Some(farmer) = &self.counterparty {
                return PartyRef::Farmer(farmer.clone());
            }
        }
        self.debtor.clone()
    }

    /// True for a sale charge where the farmer bought their own produce
    pub fn is_self_sale(&self) -> bool {
        if self.category != ObligationCategory::SaleCharge {
            return false;
        }
        match (&self.debtor, &self.counterparty) {
            (PartyRef::Buyer(buyer), Some(farmer)) => {
                PartyKey::normalize(&buyer.name) == PartyKey::normalize(&farmer.name)
            }
            _ => false,
        }
    }

    /// Apply a payment delta, rounding immediately
    pub fn apply_payment(&mut self, delta: Decimal) {
        self.paid_amount = round_amount(self.paid_amount + delta);
        self.recompute_status();
    }

    /// Reset to pristine for replay: nothing paid, status from principal
    pub fn reset_to_pristine(&mut self) {
        self.paid_amount = Decimal::ZERO;
        self.recompute_status();
    }

    /// Retroactive principal correction from an external workflow.
    /// The caller must trigger a replay for the party afterwards.
    pub fn correct_principal(&mut self, new_principal: Decimal) -> Result<()> {
        if new_principal < Decimal::ZERO {
            return Err(Error::Validation(format!(
                "negative corrected principal {} for obligation {}",
                new_principal, self.id
            )));
        }
        self.principal = round_amount(new_principal);
        self.recompute_status();
        Ok(())
    }

    /// Recompute status from the derived due
    pub fn recompute_status(&mut self) {
        let due = self.due_amount();
        self.status = if due <= Decimal::ZERO {
            ObligationStatus::Paid
        } else if self.paid_amount > Decimal::ZERO {
            ObligationStatus::Partial
        } else {
            ObligationStatus::Due
        };
    }

    /// Conservation check: `paid + due == principal` within tolerance
    pub fn conserves(&self) -> bool {
        let drift = (self.paid_amount + self.due_amount() - self.principal).abs();
        drift <= rounding_tolerance()
    }
}

/// Settlement transaction kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// Cash received: a buyer receipt, or a farmer payment when the
    /// party is a farmer
    Receipt,
    /// Discount against the sale charges of one farmer+buyer pair
    Discount {
        /// Farmer whose sale charges are eligible
        farmer: FarmerIdentity,
    },
    /// Liability transfer of one sale charge to another buyer
    Transfer {
        /// The redirected sale-charge obligation
        obligation_id: u64,
        /// Owner the liability is moving away from
        from_buyer: BuyerIdentity,
        /// Transferee now liable for the due
        to_buyer: BuyerIdentity,
    },
}

impl TransactionKind {
    /// Short tag for logging
    pub fn tag(&self) -> &'static str {
        match self {
            TransactionKind::Receipt => "receipt",
            TransactionKind::Discount { .. } => "discount",
            TransactionKind::Transfer { .. } => "transfer",
        }
    }
}

/// A settlement transaction (receipt, discount, or transfer)
///
/// Created by the originating cash/discount/transfer workflow; mutated
/// only by the settlement engine (`active` flag and the
/// applied/unapplied split); never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementTransaction {
    /// Unique transaction ID (from the injected sequential generator)
    pub id: u64,

    /// Party the transaction settles against
    pub party: PartyRef,

    /// Transaction kind
    pub kind: TransactionKind,

    /// Transaction amount
    pub amount: Decimal,

    /// Business timestamp (replay ordering key, ties broken by `id`)
    pub occurred_at: DateTime<Utc>,

    /// Active flag; false once reversed
    pub active: bool,

    /// Reversal timestamp, if reversed
    pub reversed_at: Option<DateTime<Utc>>,

    /// Amount allocated to obligations
    pub applied_amount: Decimal,

    /// Amount left over after all passes (inert credit; never
    /// auto-applied to future dues)
    pub unapplied_amount: Decimal,

    /// Total remaining due for the party immediately after this
    /// transaction was applied
    pub due_balance_after: Decimal,
}

impl SettlementTransaction {
    /// Create a new transaction pending allocation
    pub fn new(
        id: u64,
        party: PartyRef,
        kind: TransactionKind,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
    ) -> Result<Self> {
        party.validate()?;
        let amount = round_amount(amount);
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "non-positive transaction amount {}",
                amount
            )));
        }

        Ok(Self {
            id,
            party,
            kind,
            amount,
            occurred_at,
            active: true,
            reversed_at: None,
            applied_amount: Decimal::ZERO,
            unapplied_amount: amount,
            due_balance_after: Decimal::ZERO,
        })
    }

    /// Record an allocation result, keeping `applied + unapplied == amount`
    pub fn record_allocation(&mut self, applied: Decimal, due_balance_after: Decimal) {
        self.applied_amount = round_amount(applied);
        self.unapplied_amount = round_amount(self.amount - self.applied_amount);
        self.due_balance_after = round_amount(due_balance_after);
    }

    /// Reset the allocation split before a replay re-applies this
    /// transaction from scratch
    pub fn reset_allocation(&mut self) {
        self.applied_amount = Decimal::ZERO;
        self.unapplied_amount = self.amount;
        self.due_balance_after = Decimal::ZERO;
    }

    /// Conservation check: `applied + unapplied == amount`
    pub fn conserves(&self) -> bool {
        self.applied_amount + self.unapplied_amount == self.amount
    }
}

/// One entry of a discount split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountEntry {
    /// Buyer receiving this share of the discount
    pub buyer: BuyerIdentity,

    /// Share amount
    pub amount: Decimal,
}

/// A discount's buyer-allocation list
///
/// Typed `(buyer, amount)` pairs validated at construction: every entry
/// positive, and the entries sum exactly to the discount total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountSplit {
    total: Decimal,
    entries: Vec<DiscountEntry>,
}

impl DiscountSplit {
    /// Build a validated split
    pub fn new(total: Decimal, entries: Vec<DiscountEntry>) -> Result<Self> {
        let total = round_amount(total);
        if total <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "non-positive discount total {}",
                total
            )));
        }
        if entries.is_empty() {
            return Err(Error::Validation("empty discount split".to_string()));
        }

        let mut sum = Decimal::ZERO;
        for entry in &entries {
            PartyRef::Buyer(entry.buyer.clone()).validate()?;
            let amount = round_amount(entry.amount);
            if amount <= Decimal::ZERO {
                return Err(Error::Validation(format!(
                    "non-positive discount share {} for buyer {}",
                    entry.amount, entry.buyer.name
                )));
            }
            sum = round_amount(sum + amount);
        }
        if sum != total {
            return Err(Error::Validation(format!(
                "discount shares sum to {} but total is {}",
                sum, total
            )));
        }

        Ok(Self { total, entries })
    }

    /// Discount total
    pub fn total(&self) -> Decimal {
        self.total
    }

    /// Validated entries
    pub fn entries(&self) -> &[DiscountEntry] {
        &self.entries
    }
}
