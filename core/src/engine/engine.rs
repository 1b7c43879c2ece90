//! Ledger engine
//!
//! The engine owns the business-date clock, every loan account, the step
//! registry and job configuration, and the event log. All reads and
//! mutations go through it; callers never touch an aggregate directly.
//!
//! # Critical Invariants
//!
//! - All money values are i64 (minor units)
//! - A transaction dated after the current business date is rejected
//! - External ids (loan and transaction) are unique across the ledger
//! - A backdated transaction goes through the replay engine, never a plain
//!   append

use crate::cob::{
    self, advance_to_date, loan_cob_state, BusinessStep, BusinessStepConfig, CatchUpResult,
    CatchUpState, CatchUpStatus, CobError, CobState, DayResult, StepConfigError, StepRegistry,
    COB_JOB,
};
use crate::core::money::Currency;
use crate::core::time::{BusinessDateClock, ClockError};
use crate::locks::{AccountLock, Actor, LockError, LockedAccountView, Page};
use crate::models::account::{AccountError, LoanAccount};
use crate::models::event::{Event, EventLog};
use crate::models::loan::{Loan, LoanError, LoanTerms};
use crate::models::transaction::{
    LoanTransaction, RelationType, SameDayOrder, TransactionRelation, TransactionType,
};
use crate::replay::{self, ReplayError, ReplayReport};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by engine operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("loan {0} not found")]
    LoanNotFound(String),

    #[error("transaction {0} not found")]
    TransactionNotFound(String),

    #[error("external id '{0}' is already in use")]
    DuplicateExternalId(String),

    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(i64),

    #[error("transaction date {date} is after the business date {business_date}")]
    FutureDated {
        date: NaiveDate,
        business_date: NaiveDate,
    },

    #[error("transaction {0} is not a live credit and cannot be charged back")]
    NotChargebackable(String),

    #[error("chargeback of {requested} exceeds original amount {original}")]
    ChargebackExceedsOriginal { requested: i64, original: i64 },

    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Loan(#[from] LoanError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Cob(#[from] CobError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    #[error(transparent)]
    StepConfig(#[from] StepConfigError),
}

/// Ledger-wide engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Business date the ledger opens on
    pub start_date: NaiveDate,

    /// Tie-break rule for same-date transactions
    pub same_day_order: SameDayOrder,

    /// Worker threads for catch-up processing (1 = sequential)
    pub worker_threads: usize,

    /// Ordered step names the COB job runs each day
    pub cob_steps: Vec<String>,
}

impl EngineConfig {
    /// Configuration with defaults: creation-order tie-break, sequential
    /// catch-up, the built-in COB steps
    pub fn new(start_date: NaiveDate) -> Self {
        Self {
            start_date,
            same_day_order: SameDayOrder::CreationOrder,
            worker_threads: 1,
            cob_steps: vec![
                cob::APPLY_OVERDUE_PENALTY.to_string(),
                cob::REFRESH_OBLIGATIONS.to_string(),
            ],
        }
    }

    /// Set the same-date tie-break rule (builder pattern)
    pub fn with_same_day_order(mut self, order: SameDayOrder) -> Self {
        self.same_day_order = order;
        self
    }

    /// Set the catch-up worker thread count (builder pattern)
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.worker_threads == 0 {
            return Err(LedgerError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.cob_steps.is_empty() {
            return Err(LedgerError::InvalidConfig(
                "at least one COB step must be configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// The in-memory loan ledger
pub struct LedgerEngine {
    config: EngineConfig,
    clock: BusinessDateClock,
    accounts: HashMap<String, LoanAccount>,
    /// external loan id -> loan id
    external_loan_ids: HashMap<String, String>,
    /// external transaction id -> transaction id
    external_tx_ids: HashMap<String, String>,
    registry: StepRegistry,
    step_config: BusinessStepConfig,
    event_log: EventLog,
    catch_up: Option<CatchUpStatus>,
}

impl LedgerEngine {
    /// Create an engine positioned at the configured start date
    pub fn new(config: EngineConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let registry = StepRegistry::with_builtins();
        let mut step_config = BusinessStepConfig::default_cob();
        step_config.set_job_steps(COB_JOB, config.cob_steps.clone(), &registry)?;
        let clock = BusinessDateClock::new(config.start_date);
        Ok(Self {
            config,
            clock,
            accounts: HashMap::new(),
            external_loan_ids: HashMap::new(),
            external_tx_ids: HashMap::new(),
            registry,
            step_config,
            event_log: EventLog::new(),
            catch_up: None,
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current business date
    pub fn business_date(&self) -> NaiveDate {
        self.clock.current()
    }

    /// Look up a loan account by id
    pub fn account(&self, loan_id: &str) -> Result<&LoanAccount, LedgerError> {
        self.accounts
            .get(loan_id)
            .ok_or_else(|| LedgerError::LoanNotFound(loan_id.to_string()))
    }

    /// Look up a loan account by external id
    pub fn account_by_external_id(&self, external_id: &str) -> Option<&LoanAccount> {
        self.external_loan_ids
            .get(external_id)
            .and_then(|id| self.accounts.get(id))
    }

    pub fn num_loans(&self) -> usize {
        self.accounts.len()
    }

    /// COB position of one loan relative to the business date
    pub fn cob_state(&self, loan_id: &str) -> Result<CobState, LedgerError> {
        Ok(loan_cob_state(self.account(loan_id)?, self.clock.current()))
    }

    /// Loan with the oldest last-closed business date
    pub fn oldest_cob_processed_loan(&self) -> Option<(String, NaiveDate)> {
        cob::catchup::oldest_last_closed(&self.accounts)
    }

    /// Status of the most recent catch-up run
    pub fn catch_up_status(&self) -> Option<&CatchUpStatus> {
        self.catch_up.as_ref()
    }

    /// Paginated view of locked loans, ordered by loan id
    ///
    /// `page` is zero-based.
    pub fn locked_accounts(&self, page: usize, page_size: usize) -> Page<LockedAccountView> {
        let mut locked: Vec<LockedAccountView> = self
            .accounts
            .values()
            .filter_map(|acc| {
                acc.lock().map(|lock| LockedAccountView {
                    loan_id: acc.loan().id().to_string(),
                    lock_type: lock.lock_type(),
                    reason: lock.reason().to_string(),
                    message: lock.message().map(str::to_string),
                })
            })
            .collect();
        locked.sort_by(|a, b| a.loan_id.cmp(&b.loan_id));

        let total = locked.len();
        let items = if page_size == 0 {
            Vec::new()
        } else {
            locked
                .into_iter()
                .skip(page * page_size)
                .take(page_size)
                .collect()
        };
        Page {
            items,
            page,
            page_size,
            total,
        }
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    // ========================================================================
    // Loan lifecycle
    // ========================================================================

    /// Create a pending loan; returns its id
    pub fn create_loan(
        &mut self,
        currency: Currency,
        terms: LoanTerms,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        if let Some(ext) = &external_id {
            if self.external_loan_ids.contains_key(ext) {
                return Err(LedgerError::DuplicateExternalId(ext.clone()));
            }
        }

        let mut loan = Loan::new(currency, terms, self.clock.current())?;
        if let Some(ext) = &external_id {
            loan = loan.with_external_id(ext.clone());
        }
        let loan_id = loan.id().to_string();

        self.accounts.insert(loan_id.clone(), LoanAccount::new(loan));
        if let Some(ext) = external_id {
            self.external_loan_ids.insert(ext, loan_id.clone());
        }
        Ok(loan_id)
    }

    /// Approve a pending loan
    pub fn approve_loan(&mut self, loan_id: &str) -> Result<(), LedgerError> {
        let account = self.account_mut(loan_id)?;
        account.ensure_mutable()?;
        account.loan_mut().approve()?;
        Ok(())
    }

    /// Replace a loan's contractual terms and rebuild its schedule
    ///
    /// Paid amounts on the existing schedule are preserved by the rebuild:
    /// the live transaction history re-applies against the new terms.
    pub fn reschedule(&mut self, loan_id: &str, terms: LoanTerms) -> Result<(), LedgerError> {
        let order = self.config.same_day_order;
        let account = self.account_mut(loan_id)?;
        account.ensure_mutable()?;
        account.loan_mut().set_terms(terms)?;
        account.rebuild_projection(order)?;
        Ok(())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Disburse principal to the borrower
    pub fn disburse(
        &mut self,
        loan_id: &str,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        self.submit(loan_id, TransactionType::Disbursement, amount, date, external_id)
    }

    /// Record a borrower repayment
    pub fn submit_repayment(
        &mut self,
        loan_id: &str,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        self.submit(loan_id, TransactionType::Repayment, amount, date, external_id)
    }

    /// Record a merchant-initiated refund
    pub fn submit_merchant_refund(
        &mut self,
        loan_id: &str,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        self.submit(loan_id, TransactionType::MerchantRefund, amount, date, external_id)
    }

    /// Record a payout-reversal refund
    pub fn submit_payout_refund(
        &mut self,
        loan_id: &str,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        self.submit(loan_id, TransactionType::PayoutRefund, amount, date, external_id)
    }

    /// Record a goodwill credit
    pub fn submit_goodwill_credit(
        &mut self,
        loan_id: &str,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        self.submit(loan_id, TransactionType::GoodwillCredit, amount, date, external_id)
    }

    /// Forgive outstanding interest
    pub fn submit_waiver(
        &mut self,
        loan_id: &str,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        self.submit(loan_id, TransactionType::Waiver, amount, date, external_id)
    }

    /// Claw back a prior credit
    ///
    /// The chargeback must reference a live credit transaction on the same
    /// loan and cannot exceed its amount. Held overpayment is consumed
    /// first; any remainder reopens principal on the final installment.
    pub fn submit_chargeback(
        &mut self,
        loan_id: &str,
        original_tx_id: &str,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        {
            let account = self.account(loan_id)?;
            let original = account
                .transaction(original_tx_id)
                .ok_or_else(|| LedgerError::TransactionNotFound(original_tx_id.to_string()))?;
            if original.is_reversed() || !original.transaction_type().is_credit() {
                return Err(LedgerError::NotChargebackable(original_tx_id.to_string()));
            }
            if amount > original.amount() {
                return Err(LedgerError::ChargebackExceedsOriginal {
                    requested: amount,
                    original: original.amount(),
                });
            }
        }

        let tx_id = self.submit(loan_id, TransactionType::Chargeback, amount, date, external_id)?;
        if let Some(account) = self.accounts.get_mut(loan_id) {
            account.add_relation(TransactionRelation::new(
                tx_id.clone(),
                original_tx_id,
                RelationType::Chargeback,
            ));
        }
        Ok(tx_id)
    }

    /// Write the loan off; terminal
    pub fn charge_off(&mut self, loan_id: &str, date: NaiveDate) -> Result<String, LedgerError> {
        self.submit_inner(loan_id, TransactionType::ChargeOff, 0, date, None)
    }

    fn submit(
        &mut self,
        loan_id: &str,
        transaction_type: TransactionType,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        self.submit_inner(loan_id, transaction_type, amount, date, external_id)
    }

    fn submit_inner(
        &mut self,
        loan_id: &str,
        transaction_type: TransactionType,
        amount: i64,
        date: NaiveDate,
        external_id: Option<String>,
    ) -> Result<String, LedgerError> {
        let business_date = self.clock.current();
        if date > business_date {
            return Err(LedgerError::FutureDated {
                date,
                business_date,
            });
        }
        if let Some(ext) = &external_id {
            if self.external_tx_ids.contains_key(ext) {
                return Err(LedgerError::DuplicateExternalId(ext.clone()));
            }
        }

        let order = self.config.same_day_order;
        let account = self
            .accounts
            .get_mut(loan_id)
            .ok_or_else(|| LedgerError::LoanNotFound(loan_id.to_string()))?;
        account.ensure_mutable()?;

        let mut tx = LoanTransaction::new(transaction_type, amount, date, account.next_seq());
        if let Some(ext) = &external_id {
            tx = tx.with_external_id(ext.clone());
        }
        let tx_id = tx.id().to_string();

        let report: Option<ReplayReport> = if replay::needs_replay(account, &tx, order) {
            Some(replay::insert_with_replay(account, tx, order)?)
        } else {
            account.apply_new(tx)?;
            None
        };

        self.event_log.log(Event::TransactionApplied {
            loan_id: loan_id.to_string(),
            tx_id: tx_id.clone(),
            transaction_type,
            amount,
            date,
        });
        if let Some(report) = report {
            for reversed_id in &report.reversed {
                self.event_log.log(Event::TransactionReversed {
                    loan_id: loan_id.to_string(),
                    tx_id: reversed_id.clone(),
                    date,
                });
            }
            self.event_log.log(Event::ReplayCompleted {
                loan_id: loan_id.to_string(),
                trigger_tx_id: report.trigger_tx_id.clone(),
                num_reversed: report.reversed.len(),
                num_regenerated: report.regenerated.len(),
            });
        }

        if let Some(ext) = external_id {
            self.external_tx_ids.insert(ext, tx_id.clone());
        }
        Ok(tx_id)
    }

    // ========================================================================
    // Locks
    // ========================================================================

    /// Place a lock on a loan
    pub fn lock_loan(
        &mut self,
        loan_id: &str,
        lock: AccountLock,
        actor: Actor,
    ) -> Result<(), LedgerError> {
        let lock_type = lock.lock_type();
        let reason = lock.reason().to_string();
        self.account_mut(loan_id)?.place_lock(lock, actor)?;
        self.event_log.log(Event::LoanLocked {
            loan_id: loan_id.to_string(),
            lock_type,
            reason,
        });
        Ok(())
    }

    /// Remove any lock from a loan (idempotent)
    pub fn unlock_loan(&mut self, loan_id: &str) -> Result<(), LedgerError> {
        self.account_mut(loan_id)?.clear_lock();
        self.event_log.log(Event::LoanUnlocked {
            loan_id: loan_id.to_string(),
        });
        Ok(())
    }

    // ========================================================================
    // COB and catch-up
    // ========================================================================

    /// Advance the business date by `days` calendar days
    ///
    /// Only the clock moves; loans fall behind until COB or catch-up
    /// processes them.
    pub fn advance_business_date(&mut self, days: u64) {
        self.clock.advance_days(days);
    }

    /// Advance the business date to an explicit target
    pub fn advance_business_date_to(&mut self, date: NaiveDate) -> Result<(), LedgerError> {
        self.clock.advance_to(date)?;
        Ok(())
    }

    /// Bring one loan current, day by day (inline COB)
    pub fn run_inline_cob(&mut self, loan_id: &str) -> Result<Vec<DayResult>, LedgerError> {
        let business_date = self.clock.current();
        let steps = self.resolved_cob_steps()?;
        let account = self
            .accounts
            .get_mut(loan_id)
            .ok_or_else(|| LedgerError::LoanNotFound(loan_id.to_string()))?;

        let days = advance_to_date(account, business_date, &steps)?;
        for day in &days {
            self.event_log.log(Event::DayClosed {
                loan_id: loan_id.to_string(),
                date: day.date,
                steps_executed: day.executed.len(),
            });
        }
        Ok(days)
    }

    /// Bring every behind loan current, oldest first
    ///
    /// One loan's failure does not stop the run; failed loans are left
    /// hard-locked and reported in the result.
    pub fn execute_catch_up(&mut self) -> Result<CatchUpResult, LedgerError> {
        let business_date = self.clock.current();
        let steps = self.resolved_cob_steps()?;
        let num_behind = cob::catchup::behind_loan_ids(&self.accounts, business_date).len();

        self.event_log.log(Event::CatchUpStarted {
            business_date,
            num_behind,
        });
        self.catch_up = Some(CatchUpStatus {
            state: CatchUpState::InProgress,
            cursor_date: self.oldest_cob_processed_loan().map(|(_, d)| d),
            num_processed: 0,
            num_failed: 0,
        });

        let (result, events) = cob::catchup::execute(
            &mut self.accounts,
            business_date,
            &steps,
            self.config.worker_threads,
        );
        for event in events {
            self.event_log.log(event);
        }
        self.event_log.log(Event::CatchUpCompleted {
            business_date,
            num_processed: result.processed.len(),
            num_failed: result.failures.len(),
        });

        let state = if result.failures.is_empty() {
            CatchUpState::Completed
        } else {
            CatchUpState::Failed
        };
        self.catch_up = Some(CatchUpStatus {
            state,
            cursor_date: self
                .oldest_cob_processed_loan()
                .map(|(_, d)| d)
                .filter(|d| *d < business_date),
            num_processed: result.processed.len(),
            num_failed: result.failures.len(),
        });

        Ok(result)
    }

    /// Replace the ordered step list of a job (admin API)
    pub fn set_job_steps(&mut self, job: &str, names: Vec<String>) -> Result<(), LedgerError> {
        self.step_config.set_job_steps(job, names, &self.registry)?;
        Ok(())
    }

    /// Register a custom business step
    pub fn register_step(&mut self, step: Arc<dyn BusinessStep>) -> Result<(), LedgerError> {
        self.registry.register(step)?;
        Ok(())
    }

    fn resolved_cob_steps(&self) -> Result<Vec<Arc<dyn BusinessStep>>, LedgerError> {
        self.step_config
            .steps_for(COB_JOB)
            .iter()
            .map(|configured| {
                self.registry
                    .resolve(&configured.name)
                    .ok_or_else(|| CobError::UnknownStep(configured.name.clone()).into())
            })
            .collect()
    }

    fn account_mut(&mut self, loan_id: &str) -> Result<&mut LoanAccount, LedgerError> {
        self.accounts
            .get_mut(loan_id)
            .ok_or_else(|| LedgerError::LoanNotFound(loan_id.to_string()))
    }

    // ========================================================================
    // Checkpointing (see engine::checkpoint)
    // ========================================================================

    pub(crate) fn accounts(&self) -> &HashMap<String, LoanAccount> {
        &self.accounts
    }

    pub(crate) fn catch_up(&self) -> Option<&CatchUpStatus> {
        self.catch_up.as_ref()
    }

    pub(crate) fn from_parts(
        config: EngineConfig,
        clock: BusinessDateClock,
        accounts: HashMap<String, LoanAccount>,
        catch_up: Option<CatchUpStatus>,
    ) -> Result<Self, LedgerError> {
        let mut engine = Self::new(config)?;
        engine.clock = clock;
        for account in accounts.values() {
            if let Some(ext) = account.loan().external_id() {
                engine
                    .external_loan_ids
                    .insert(ext.to_string(), account.loan().id().to_string());
            }
            for tx in account.transactions() {
                if let Some(ext) = tx.external_id() {
                    engine.external_tx_ids.insert(ext.to_string(), tx.id().to_string());
                }
            }
        }
        engine.accounts = accounts;
        engine.catch_up = catch_up;
        Ok(engine)
    }
}
