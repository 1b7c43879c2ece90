//! # Loan Ledger Core
//!
//! A deterministic, in-memory ledger for progressive loans: amortized
//! installment schedules, append-only transaction history, backdated
//! insertion via reverse-replay, and day-by-day close-of-business
//! processing driven by an explicit business date.
//!
//! ## Critical Invariants
//!
//! - All money values are i64 (minor units); floating point only appears
//!   transiently inside amortization, rounded half-up before storage
//! - Transactions and relations are append-only; corrections reverse and
//!   regenerate, never edit
//! - The schedule state is always the projection of the live transaction
//!   set applied in chronological order
//! - COB never skips a business day and never moves the clock backwards
//!
//! ## Architecture
//!
//! - [`core`]: business-date clock and money primitives
//! - [`models`]: loan, installment, transaction, event, and the
//!   [`models::account::LoanAccount`] aggregate
//! - [`schedule`]: annuity amortization and re-amortization
//! - [`replay`]: reverse-replay of backdated transactions
//! - [`cob`]: business steps, the day-stepping processor, and catch-up
//! - [`locks`]: advisory and blocking account locks
//! - [`engine`]: the facade owning the clock, accounts, and event log

pub mod cob;
pub mod core;
pub mod engine;
pub mod locks;
pub mod models;
pub mod replay;
pub mod schedule;

pub use crate::core::money::{round_half_up, Currency};
pub use crate::core::time::{BusinessDateClock, ClockError};
pub use cob::{
    advance_to_date, loan_cob_state, BusinessStep, BusinessStepConfig, CatchUpResult,
    CatchUpState, CatchUpStatus, CobError, CobState, DayResult, StepConfigError, StepError,
    StepRegistry, APPLY_OVERDUE_PENALTY, COB_JOB, REFRESH_OBLIGATIONS,
};
pub use engine::{CheckpointError, EngineConfig, LedgerEngine, LedgerError, StateSnapshot};
pub use locks::{Actor, AccountLock, LockError, LockType, LockedAccountView, Page};
pub use models::account::{AccountError, LoanAccount, StepExecutionRecord};
pub use models::event::{Event, EventLog};
pub use models::installment::Installment;
pub use models::loan::{Loan, LoanError, LoanStatus, LoanTerms};
pub use models::transaction::{
    LoanTransaction, RelationType, SameDayOrder, TransactionRelation, TransactionType,
};
pub use replay::{insert_with_replay, needs_replay, ReplayError, ReplayReport};
