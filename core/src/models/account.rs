//! Loan account aggregate
//!
//! The aggregate is the single-writer unit of this ledger: one loan, its
//! installment schedule, its transaction history, its relations, its lock
//! state, and its COB step-execution records. Every mutation goes through
//! the aggregate, so holding `&mut LoanAccount` is the per-loan exclusive
//! lock the concurrency model requires.
//!
//! # Critical Invariants
//!
//! - The ledger effect of the live (non-reversed) transaction set, applied
//!   in chronological order, always equals the current schedule state; the
//!   projection can be rebuilt from the transaction list at any time
//! - Transactions and relations are append-only
//! - sum(principal_due) over the schedule equals the disbursed principal

use crate::locks::{AccountLock, Actor, LockError};
use crate::models::installment::Installment;
use crate::models::loan::{Loan, LoanError, LoanStatus};
use crate::models::transaction::{LoanTransaction, SameDayOrder, TransactionRelation, TransactionType};
use crate::schedule::{self, ScheduleError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from applying transactions to an account
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountError {
    #[error("loan has no disbursed schedule yet")]
    NotDisbursed,

    #[error("loan is charged off and accepts no further activity")]
    ChargedOff,

    #[error("waiver of {requested} exceeds waivable interest by {unwaived}")]
    WaiverExceedsInterest { requested: i64, unwaived: i64 },

    #[error(transparent)]
    Loan(#[from] LoanError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

/// Record of one business-step execution during COB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecutionRecord {
    /// Business day the step ran for
    pub date: NaiveDate,
    /// Registered step name
    pub step_name: String,
    /// Whether the step changed any account state
    pub changed: bool,
}

/// A loan plus everything the ledger knows about it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanAccount {
    loan: Loan,

    /// Ordered installment schedule; empty until first disbursement
    schedule: Vec<Installment>,

    /// Full transaction history, reversed records included (append-only)
    transactions: Vec<LoanTransaction>,

    /// Directed transaction relations (append-only)
    relations: Vec<TransactionRelation>,

    /// Current lock, if any
    lock: Option<AccountLock>,

    /// COB step-execution history
    step_executions: Vec<StepExecutionRecord>,

    /// Credit received beyond total dues (minor units)
    overpaid_amount: i64,

    /// Total live disbursed principal (minor units)
    disbursed_total: i64,

    /// Next per-loan transaction creation sequence
    next_tx_seq: u64,
}

impl LoanAccount {
    pub fn new(loan: Loan) -> Self {
        Self {
            loan,
            schedule: Vec::new(),
            transactions: Vec::new(),
            relations: Vec::new(),
            lock: None,
            step_executions: Vec::new(),
            overpaid_amount: 0,
            disbursed_total: 0,
            next_tx_seq: 1,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn loan(&self) -> &Loan {
        &self.loan
    }

    pub fn schedule(&self) -> &[Installment] {
        &self.schedule
    }

    pub fn transactions(&self) -> &[LoanTransaction] {
        &self.transactions
    }

    pub fn relations(&self) -> &[TransactionRelation] {
        &self.relations
    }

    pub fn lock(&self) -> Option<&AccountLock> {
        self.lock.as_ref()
    }

    pub fn step_executions(&self) -> &[StepExecutionRecord] {
        &self.step_executions
    }

    /// Step-execution records for one business day
    pub fn step_executions_on(&self, date: NaiveDate) -> Vec<&StepExecutionRecord> {
        self.step_executions.iter().filter(|r| r.date == date).collect()
    }

    pub fn overpaid_amount(&self) -> i64 {
        self.overpaid_amount
    }

    pub fn disbursed_total(&self) -> i64 {
        self.disbursed_total
    }

    /// Outstanding amount across the whole schedule
    pub fn total_outstanding(&self) -> i64 {
        self.schedule.iter().map(|i| i.total_outstanding()).sum()
    }

    /// Outstanding principal across the whole schedule
    pub fn principal_outstanding(&self) -> i64 {
        self.schedule.iter().map(|i| i.principal_outstanding()).sum()
    }

    /// Live (non-reversed) transactions
    pub fn live_transactions(&self) -> impl Iterator<Item = &LoanTransaction> {
        self.transactions.iter().filter(|t| !t.is_reversed())
    }

    /// Find a transaction by id
    pub fn transaction(&self, tx_id: &str) -> Option<&LoanTransaction> {
        self.transactions.iter().find(|t| t.id() == tx_id)
    }

    /// Largest chronological order key among live transactions
    pub fn latest_live_order_key(&self, order: SameDayOrder) -> Option<(NaiveDate, u8, u64)> {
        self.live_transactions().map(|t| t.order_key(order)).max()
    }

    /// Allocate the next transaction creation sequence
    pub(crate) fn next_seq(&mut self) -> u64 {
        let seq = self.next_tx_seq;
        self.next_tx_seq += 1;
        seq
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// Place a lock on the account
    ///
    /// An existing HARD lock can only be replaced by the COB system actor;
    /// an operator gets `AlreadyLocked`.
    pub fn place_lock(&mut self, lock: AccountLock, actor: Actor) -> Result<(), LockError> {
        if let Some(existing) = &self.lock {
            if existing.is_hard() && actor != Actor::CobSystem {
                return Err(LockError::AlreadyLocked {
                    loan_id: self.loan.id().to_string(),
                    reason: existing.reason().to_string(),
                });
            }
        }
        self.lock = Some(lock);
        Ok(())
    }

    /// Remove any lock (idempotent)
    pub fn clear_lock(&mut self) {
        self.lock = None;
    }

    /// Guard for mutating operations: a HARD lock rejects everything
    pub fn ensure_mutable(&self) -> Result<(), LockError> {
        match &self.lock {
            Some(lock) if lock.is_hard() => Err(LockError::LoanLocked {
                loan_id: self.loan.id().to_string(),
                reason: lock.reason().to_string(),
            }),
            _ => Ok(()),
        }
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    pub(crate) fn loan_mut(&mut self) -> &mut Loan {
        &mut self.loan
    }

    pub(crate) fn add_relation(&mut self, relation: TransactionRelation) {
        self.relations.push(relation);
    }

    pub(crate) fn record_step_execution(&mut self, record: StepExecutionRecord) {
        self.step_executions.push(record);
    }

    /// Commit one processed business day
    pub(crate) fn commit_day(&mut self, date: NaiveDate) {
        self.loan.set_last_closed_business_date(date);
    }

    /// Apply a new in-order transaction: ledger effect first, then append.
    /// A failed effect leaves the transaction list untouched.
    pub(crate) fn apply_new(&mut self, tx: LoanTransaction) -> Result<(), AccountError> {
        self.apply_effect(&tx)?;
        self.transactions.push(tx);
        Ok(())
    }

    /// Append a transaction without applying it (replay regeneration; the
    /// projection is rebuilt afterwards)
    pub(crate) fn push_transaction(&mut self, tx: LoanTransaction) {
        self.transactions.push(tx);
    }

    /// Mark a transaction reversed by index
    pub(crate) fn reverse_transaction_at(&mut self, index: usize) {
        if let Some(tx) = self.transactions.get_mut(index) {
            tx.mark_reversed();
        }
    }

    /// Rebuild the schedule projection from the live transaction set
    ///
    /// Clears all derived state and re-applies every live transaction in
    /// (date, tie-break) order. Any effect failure surfaces as-is; callers
    /// that need atomicity rebuild a detached clone.
    pub(crate) fn rebuild_projection(&mut self, order: SameDayOrder) -> Result<(), AccountError> {
        self.schedule.clear();
        self.overpaid_amount = 0;
        self.disbursed_total = 0;
        self.loan.reset_for_rebuild();

        let mut live: Vec<LoanTransaction> = self.live_transactions().cloned().collect();
        live.sort_by_key(|t| t.order_key(order));
        for tx in &live {
            self.apply_effect(tx)?;
        }
        Ok(())
    }

    /// Apply one transaction's ledger effect to the schedule
    fn apply_effect(&mut self, tx: &LoanTransaction) -> Result<(), AccountError> {
        if !self.loan.is_open() {
            return Err(AccountError::ChargedOff);
        }
        let terms = self.loan.terms().clone();

        match tx.transaction_type() {
            TransactionType::Disbursement => {
                self.loan.activate()?;
                if self.schedule.is_empty() {
                    self.schedule = schedule::generate(&terms, tx.amount(), tx.date())?;
                } else {
                    schedule::reamortize(&mut self.schedule, &terms, tx.amount(), tx.date())?;
                }
                self.disbursed_total += tx.amount();
            }

            kind if kind.is_credit() => {
                if self.schedule.is_empty() {
                    return Err(AccountError::NotDisbursed);
                }
                let mut remaining = tx.amount();
                for inst in &mut self.schedule {
                    if remaining == 0 {
                        break;
                    }
                    remaining = inst.allocate(remaining);
                }
                self.overpaid_amount += remaining;
            }

            TransactionType::Waiver => {
                if self.schedule.is_empty() {
                    return Err(AccountError::NotDisbursed);
                }
                let mut remaining = tx.amount();
                for inst in &mut self.schedule {
                    if remaining == 0 {
                        break;
                    }
                    remaining = inst.waive_interest(remaining);
                }
                if remaining > 0 {
                    return Err(AccountError::WaiverExceedsInterest {
                        requested: tx.amount(),
                        unwaived: remaining,
                    });
                }
            }

            TransactionType::Chargeback => {
                if self.schedule.is_empty() {
                    return Err(AccountError::NotDisbursed);
                }
                // Draw from held overpayment first; the rest reopens
                // principal on the final installment
                let from_overpaid = self.overpaid_amount.min(tx.amount());
                self.overpaid_amount -= from_overpaid;
                let reopened = tx.amount() - from_overpaid;
                if reopened > 0 {
                    if let Some(last) = self.schedule.last_mut() {
                        last.add_principal_due(reopened);
                    }
                }
            }

            TransactionType::ChargeOff => {
                self.loan.charge_off()?;
                return Ok(());
            }

            // is_credit() and the explicit arms above cover every variant
            _ => {}
        }

        self.refresh_derived_status()?;
        Ok(())
    }

    /// Set a lock unconditionally (COB processing paths)
    pub(crate) fn force_lock(&mut self, lock: AccountLock) {
        self.lock = Some(lock);
    }

    /// Charge the flat overdue penalty on installments past due and unmet,
    /// at most once per installment. Returns whether anything was charged.
    pub(crate) fn apply_overdue_penalties(&mut self, as_of: NaiveDate) -> bool {
        let penalty = self.loan.terms().overdue_penalty;
        if penalty <= 0 || !self.loan.is_open() {
            return false;
        }
        let mut changed = false;
        for inst in &mut self.schedule {
            if inst.is_overdue(as_of) && inst.penalty_due() == 0 {
                inst.add_penalty(penalty);
                changed = true;
            }
        }
        changed
    }

    /// Re-derive obligations/status for the refresh-obligations step.
    /// Returns whether the loan status changed.
    pub(crate) fn refresh_obligations_step(&mut self) -> Result<bool, LoanError> {
        let before = self.loan.status();
        self.refresh_derived_status()?;
        Ok(self.loan.status() != before)
    }

    /// Re-derive the loan status from schedule state
    fn refresh_derived_status(&mut self) -> Result<(), LoanError> {
        if self.schedule.is_empty() {
            return Ok(());
        }
        match self.loan.status() {
            LoanStatus::Pending | LoanStatus::Approved | LoanStatus::ChargedOff => return Ok(()),
            _ => {}
        }

        let all_met = self.schedule.iter().all(|i| i.obligations_met());
        if all_met {
            if self.overpaid_amount > 0 {
                self.loan.mark_overpaid()?;
            } else {
                self.loan.close_obligations_met()?;
            }
        } else {
            self.loan.reopen()?;
        }
        Ok(())
    }
}
