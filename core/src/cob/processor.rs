//! COB day-stepping processor
//!
//! Advances a single loan's last-closed business date toward the global
//! business date, exactly one calendar day at a time, running the
//! configured business steps for each day. Each day is staged on a
//! detached copy of the account and swapped in only when every step for
//! that day succeeded; a step failure leaves the loan HARD-locked at the
//! date reached, with no trace of the failed day's partial work.
//!
//! # Critical Invariants
//!
//! - Days are never skipped: day N+1 never starts before day N commits
//! - A failed day does not commit; `last_closed_business_date` stays at the
//!   last fully processed day and no step effect or execution record from
//!   the failed day survives, so a retry re-runs the day from scratch and
//!   a committed day carries exactly one record per configured step
//! - Other loans are unaffected by one loan's failure

use crate::cob::steps::BusinessStep;
use crate::locks::AccountLock;
use crate::models::account::{LoanAccount, StepExecutionRecord};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;

/// Lock reason codes written by the processor
pub const REASON_COB_IN_PROGRESS: &str = "COB_IN_PROGRESS";
pub const REASON_COB_STEP_FAILED: &str = "COB_STEP_FAILED";

/// Errors from COB processing
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CobError {
    #[error("business step '{step}' failed for loan {loan_id} on {date}: {message}")]
    StepFailed {
        loan_id: String,
        date: NaiveDate,
        step: String,
        message: String,
    },

    #[error("unknown business step '{0}' configured")]
    UnknownStep(String),
}

/// COB position of a loan relative to the business date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CobState {
    /// last-closed == business date
    Current,
    /// last-closed < business date
    Behind,
    /// Being stepped right now (observable through the soft lock)
    Processing,
}

/// Derive a loan's COB state
pub fn loan_cob_state(account: &LoanAccount, business_date: NaiveDate) -> CobState {
    if let Some(lock) = account.lock() {
        if !lock.is_hard() && lock.reason() == REASON_COB_IN_PROGRESS {
            return CobState::Processing;
        }
    }
    if account.loan().last_closed_business_date() < business_date {
        CobState::Behind
    } else {
        CobState::Current
    }
}

/// Result of processing one business day for one loan
#[derive(Debug, Clone, PartialEq)]
pub struct DayResult {
    pub date: NaiveDate,
    /// One record per configured step, in execution order
    pub executed: Vec<StepExecutionRecord>,
}

/// Advance one loan day-by-day up to `business_date`
///
/// Already-current loans are a no-op (idempotent re-invocation). Each day
/// is staged on a detached copy of the account and swapped in atomically
/// when all of its steps succeed; a failed day is discarded wholesale, so
/// no partial step effect or execution record ever reaches the account.
///
/// On success a stale HARD lock from an earlier failure is cleared and a
/// pre-existing operator SOFT lock is put back in place. On step failure
/// the loan is left HARD-locked at the date reached and the error is
/// returned; committed days stay committed.
pub fn advance_to_date(
    account: &mut LoanAccount,
    business_date: NaiveDate,
    steps: &[Arc<dyn BusinessStep>],
) -> Result<Vec<DayResult>, CobError> {
    if account.loan().last_closed_business_date() >= business_date {
        return Ok(Vec::new());
    }

    let prior_lock = account.lock().cloned();
    // Advisory only: manual operations are not blocked by this
    if prior_lock.as_ref().map(|l| !l.is_hard()).unwrap_or(true) {
        account.force_lock(AccountLock::soft(REASON_COB_IN_PROGRESS));
    }

    let mut days = Vec::new();
    let mut day = account.loan().last_closed_business_date();
    while day < business_date {
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };

        // Stage the whole day aside; the live account only ever sees
        // fully processed days
        let mut draft = account.clone();
        let mut executed = Vec::with_capacity(steps.len());
        for step in steps {
            match step.execute(&mut draft, day) {
                Ok(changed) => {
                    let record = StepExecutionRecord {
                        date: day,
                        step_name: step.name().to_string(),
                        changed,
                    };
                    draft.record_step_execution(record.clone());
                    executed.push(record);
                }
                Err(error) => {
                    let loan_id = account.loan().id().to_string();
                    account.force_lock(
                        AccountLock::hard(REASON_COB_STEP_FAILED)
                            .with_message(format!("{} on {}: {}", step.name(), day, error)),
                    );
                    return Err(CobError::StepFailed {
                        loan_id,
                        date: day,
                        step: step.name().to_string(),
                        message: error.to_string(),
                    });
                }
            }
        }

        draft.commit_day(day);
        *account = draft;
        days.push(DayResult { date: day, executed });
    }

    // Restore an operator's advisory marker; drop our own processing lock
    // and any stale HARD lock left by a now-recovered failure
    match prior_lock {
        Some(lock) if !lock.is_hard() && lock.reason() != REASON_COB_IN_PROGRESS => {
            account.force_lock(lock)
        }
        _ => account.clear_lock(),
    }
    Ok(days)
}
