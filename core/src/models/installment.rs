//! Installment model
//!
//! One row of a loan's amortization schedule. The schedule is an ordered
//! sequence of installments and is regenerated wholesale whenever the loan
//! is rescheduled or reamortized.
//!
//! CRITICAL: All money values are i64 (minor units)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single scheduled installment
///
/// Due amounts are split into principal/interest/fee/penalty components,
/// each with its own paid counter. `obligations_met` flips to true the
/// moment every component is fully paid and back to false if new dues are
/// added (overdue penalty, chargeback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    /// 1-based position in the schedule
    seq: u32,

    due_date: NaiveDate,

    principal_due: i64,
    interest_due: i64,
    fee_due: i64,
    penalty_due: i64,

    principal_paid: i64,
    interest_paid: i64,
    fee_paid: i64,
    penalty_paid: i64,

    obligations_met: bool,
}

impl Installment {
    /// Create a scheduled installment with principal and interest dues
    pub fn new(seq: u32, due_date: NaiveDate, principal_due: i64, interest_due: i64) -> Self {
        Self {
            seq,
            due_date,
            principal_due,
            interest_due,
            fee_due: 0,
            penalty_due: 0,
            principal_paid: 0,
            interest_paid: 0,
            fee_paid: 0,
            penalty_paid: 0,
            obligations_met: principal_due == 0 && interest_due == 0,
        }
    }

    pub fn seq(&self) -> u32 {
        self.seq
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn principal_due(&self) -> i64 {
        self.principal_due
    }

    pub fn interest_due(&self) -> i64 {
        self.interest_due
    }

    pub fn fee_due(&self) -> i64 {
        self.fee_due
    }

    pub fn penalty_due(&self) -> i64 {
        self.penalty_due
    }

    pub fn principal_paid(&self) -> i64 {
        self.principal_paid
    }

    pub fn interest_paid(&self) -> i64 {
        self.interest_paid
    }

    pub fn fee_paid(&self) -> i64 {
        self.fee_paid
    }

    pub fn penalty_paid(&self) -> i64 {
        self.penalty_paid
    }

    pub fn obligations_met(&self) -> bool {
        self.obligations_met
    }

    /// Total amount due across all components
    pub fn total_due(&self) -> i64 {
        self.principal_due + self.interest_due + self.fee_due + self.penalty_due
    }

    /// Total amount paid across all components
    pub fn total_paid(&self) -> i64 {
        self.principal_paid + self.interest_paid + self.fee_paid + self.penalty_paid
    }

    /// Outstanding amount across all components
    pub fn total_outstanding(&self) -> i64 {
        self.total_due() - self.total_paid()
    }

    /// Outstanding interest only
    pub fn interest_outstanding(&self) -> i64 {
        self.interest_due - self.interest_paid
    }

    /// Outstanding principal only
    pub fn principal_outstanding(&self) -> i64 {
        self.principal_due - self.principal_paid
    }

    /// An installment is overdue once its due date has passed without its
    /// obligations being met. The due date itself is still on time.
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        !self.obligations_met && self.due_date < as_of
    }

    /// Allocate a credit against this installment
    ///
    /// Pays components in penalty, fee, interest, principal order and
    /// returns whatever is left of `amount` for the next installment.
    pub(crate) fn allocate(&mut self, amount: i64) -> i64 {
        let mut remaining = amount;

        let penalty = remaining.min(self.penalty_due - self.penalty_paid);
        self.penalty_paid += penalty;
        remaining -= penalty;

        let fee = remaining.min(self.fee_due - self.fee_paid);
        self.fee_paid += fee;
        remaining -= fee;

        let interest = remaining.min(self.interest_outstanding());
        self.interest_paid += interest;
        remaining -= interest;

        let principal = remaining.min(self.principal_outstanding());
        self.principal_paid += principal;
        remaining -= principal;

        self.refresh_obligations();
        remaining
    }

    /// Waive outstanding interest on this installment
    ///
    /// Waived interest counts as paid. Returns the unwaived remainder.
    pub(crate) fn waive_interest(&mut self, amount: i64) -> i64 {
        let waived = amount.min(self.interest_outstanding());
        self.interest_paid += waived;
        self.refresh_obligations();
        amount - waived
    }

    /// Add a one-off penalty due (overdue-charge business step)
    pub(crate) fn add_penalty(&mut self, amount: i64) {
        self.penalty_due += amount;
        self.refresh_obligations();
    }

    /// Add principal due (chargeback against the final installment)
    pub(crate) fn add_principal_due(&mut self, amount: i64) {
        self.principal_due += amount;
        self.refresh_obligations();
    }

    /// Replace principal and interest dues (reamortization)
    pub(crate) fn set_dues(&mut self, principal_due: i64, interest_due: i64) {
        self.principal_due = principal_due;
        self.interest_due = interest_due;
        self.refresh_obligations();
    }

    fn refresh_obligations(&mut self) {
        self.obligations_met = self.total_outstanding() == 0;
    }
}
