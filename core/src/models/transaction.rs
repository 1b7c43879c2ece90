//! Loan transaction model
//!
//! Every ledger effect on a loan is a transaction. Transactions are
//! append-only: a correction never edits an existing record, it reverses
//! the record (zeroing its ledger effect) and appends a replacement linked
//! by a [`TransactionRelation`].
//!
//! CRITICAL: All money values are i64 (minor units)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of ledger effect a transaction has
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    /// Pays principal out to the borrower; creates or extends the schedule
    Disbursement,
    /// Borrower payment against outstanding dues
    Repayment,
    /// Forgives outstanding interest
    Waiver,
    /// Claws a prior repayment back; reopens principal on the final
    /// installment
    Chargeback,
    /// Merchant-initiated refund, allocated like a repayment
    MerchantRefund,
    /// Payout reversal refund, allocated like a repayment
    PayoutRefund,
    /// Goodwill credit, allocated like a repayment
    GoodwillCredit,
    /// Writes the loan off; terminal
    ChargeOff,
}

impl TransactionType {
    /// Whether this type is allocated against dues like a repayment
    pub fn is_credit(&self) -> bool {
        matches!(
            self,
            TransactionType::Repayment
                | TransactionType::MerchantRefund
                | TransactionType::PayoutRefund
                | TransactionType::GoodwillCredit
        )
    }

    /// Rank used by the type-priority tie-break: lower settles first on a
    /// shared date. Disbursements must land before anything that consumes
    /// the schedule they create.
    fn priority(&self) -> u8 {
        match self {
            TransactionType::Disbursement => 0,
            TransactionType::Repayment
            | TransactionType::MerchantRefund
            | TransactionType::PayoutRefund
            | TransactionType::GoodwillCredit => 1,
            TransactionType::Waiver => 2,
            TransactionType::Chargeback => 3,
            TransactionType::ChargeOff => 4,
        }
    }
}

/// Tie-break rule for transactions sharing a transaction date
///
/// The chronological order of a loan's ledger is (date, tie-break). Which
/// tie-break applies is a ledger-wide configuration choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameDayOrder {
    /// Same-date transactions keep their creation order
    CreationOrder,
    /// Same-date transactions order by type priority (disbursement first),
    /// then creation order
    TypePriorityThenCreation,
}

/// How transactions relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationType {
    /// `from` is the regenerated replacement of the reversed `to`
    Replayed,
    /// `from` charges back the repayment `to`
    Chargeback,
    /// `from` replaces `to`, and `to` was itself a replay copy
    ReplayedAndReversed,
}

/// Directed, append-only link between two transactions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRelation {
    from_id: String,
    to_id: String,
    relation_type: RelationType,
}

impl TransactionRelation {
    pub fn new(from_id: impl Into<String>, to_id: impl Into<String>, relation_type: RelationType) -> Self {
        Self {
            from_id: from_id.into(),
            to_id: to_id.into(),
            relation_type,
        }
    }

    pub fn from_id(&self) -> &str {
        &self.from_id
    }

    pub fn to_id(&self) -> &str {
        &self.to_id
    }

    pub fn relation_type(&self) -> RelationType {
        self.relation_type
    }
}

/// A single ledger transaction on a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTransaction {
    /// Unique transaction identifier (UUID)
    id: String,

    /// Optional caller-supplied identifier, unique across the ledger
    external_id: Option<String>,

    transaction_type: TransactionType,

    /// Amount in minor units; 0 only for ChargeOff
    amount: i64,

    /// Value date of the transaction (business date semantics)
    date: NaiveDate,

    /// Monotonic per-loan creation sequence; the same-date tie-break
    created_seq: u64,

    /// A reversed transaction has zero ledger effect but stays on record
    reversed: bool,
}

impl LoanTransaction {
    /// Create a new live transaction
    pub fn new(transaction_type: TransactionType, amount: i64, date: NaiveDate, created_seq: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: None,
            transaction_type,
            amount,
            date,
            created_seq,
            reversed: false,
        }
    }

    /// Set the external id (builder pattern)
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Create the replay copy of this transaction: a fresh id and creation
    /// sequence, same type, amount and date. External ids stay with the
    /// original record.
    pub(crate) fn regenerate_as_replay(&self, created_seq: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: None,
            transaction_type: self.transaction_type,
            amount: self.amount,
            date: self.date,
            created_seq,
            reversed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Mark reversed (idempotent); the ledger effect of a reversed
    /// transaction is zero
    pub(crate) fn mark_reversed(&mut self) {
        self.reversed = true;
    }

    /// Chronological ordering key under the configured tie-break rule
    pub fn order_key(&self, order: SameDayOrder) -> (NaiveDate, u8, u64) {
        let priority = match order {
            SameDayOrder::CreationOrder => 0,
            SameDayOrder::TypePriorityThenCreation => self.transaction_type.priority(),
        };
        (self.date, priority, self.created_seq)
    }
}
