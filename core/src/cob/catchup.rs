//! Catch-up scheduling
//!
//! Finds every loan whose last-closed business date is behind the global
//! business date and drives the COB processor across them, oldest first.
//! Re-invocation is idempotent: loans already current are skipped, and a
//! previously failed loan is simply retried.
//!
//! Loans are independent aggregates, so a run may fan out over a bounded
//! worker pool; each individual loan's day-stepping stays strictly
//! sequential inside `advance_to_date`.

use crate::cob::processor::{advance_to_date, CobError, DayResult};
use crate::cob::steps::BusinessStep;
use crate::models::account::LoanAccount;
use crate::models::event::Event;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// State of the most recent catch-up run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatchUpState {
    InProgress,
    Completed,
    Failed,
}

/// Queryable status of catch-up processing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatchUpStatus {
    pub state: CatchUpState,
    /// Oldest last-closed date still outstanding (None when fully caught up)
    pub cursor_date: Option<NaiveDate>,
    pub num_processed: usize,
    pub num_failed: usize,
}

/// One loan that failed during a catch-up run
#[derive(Debug, Clone, PartialEq)]
pub struct CatchUpFailure {
    pub loan_id: String,
    pub error: CobError,
}

/// Outcome of one catch-up run
#[derive(Debug, Clone, PartialEq)]
pub struct CatchUpResult {
    /// Loan ids successfully brought current, oldest first
    pub processed: Vec<String>,
    /// Loans skipped because they were already current
    pub skipped: usize,
    pub failures: Vec<CatchUpFailure>,
}

/// Ids of loans behind the business date, oldest last-closed first
/// (loan id breaks ties deterministically)
pub fn behind_loan_ids(
    accounts: &HashMap<String, LoanAccount>,
    business_date: NaiveDate,
) -> Vec<String> {
    let mut behind: Vec<(&String, NaiveDate)> = accounts
        .iter()
        .filter(|(_, acc)| acc.loan().last_closed_business_date() < business_date)
        .map(|(id, acc)| (id, acc.loan().last_closed_business_date()))
        .collect();
    behind.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    behind.into_iter().map(|(id, _)| id.clone()).collect()
}

/// Loan with the oldest last-closed business date across the whole ledger
pub fn oldest_last_closed(accounts: &HashMap<String, LoanAccount>) -> Option<(String, NaiveDate)> {
    accounts
        .iter()
        .map(|(id, acc)| (id.clone(), acc.loan().last_closed_business_date()))
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
}

/// Run catch-up across every behind loan
///
/// With `worker_threads > 1` the behind loans are processed on a bounded
/// rayon pool; results and events are merged back in oldest-first order so
/// the outcome is identical to a sequential run.
pub fn execute(
    accounts: &mut HashMap<String, LoanAccount>,
    business_date: NaiveDate,
    steps: &[Arc<dyn BusinessStep>],
    worker_threads: usize,
) -> (CatchUpResult, Vec<Event>) {
    let behind = behind_loan_ids(accounts, business_date);
    let skipped = accounts.len() - behind.len();

    let outcomes: Vec<(String, Result<Vec<DayResult>, CobError>)> = if worker_threads > 1 {
        run_parallel(accounts, business_date, steps, worker_threads, &behind)
    } else {
        behind
            .iter()
            .filter_map(|id| {
                accounts
                    .get_mut(id)
                    .map(|acc| (id.clone(), advance_to_date(acc, business_date, steps)))
            })
            .collect()
    };

    let mut result = CatchUpResult {
        processed: Vec::new(),
        skipped,
        failures: Vec::new(),
    };
    let mut events = Vec::new();

    for (loan_id, outcome) in outcomes {
        match outcome {
            Ok(days) => {
                for day in &days {
                    events.push(Event::DayClosed {
                        loan_id: loan_id.clone(),
                        date: day.date,
                        steps_executed: day.executed.len(),
                    });
                }
                result.processed.push(loan_id);
            }
            Err(error) => {
                if let CobError::StepFailed {
                    date,
                    ref step,
                    ref message,
                    ..
                } = error
                {
                    events.push(Event::StepFailed {
                        loan_id: loan_id.clone(),
                        date,
                        step: step.clone(),
                        message: message.clone(),
                    });
                }
                result.failures.push(CatchUpFailure { loan_id, error });
            }
        }
    }

    (result, events)
}

fn run_parallel(
    accounts: &mut HashMap<String, LoanAccount>,
    business_date: NaiveDate,
    steps: &[Arc<dyn BusinessStep>],
    worker_threads: usize,
    behind: &[String],
) -> Vec<(String, Result<Vec<DayResult>, CobError>)> {
    let rank: HashMap<&str, usize> = behind
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let targets: Vec<(&String, &mut LoanAccount)> = accounts
        .iter_mut()
        .filter(|(id, _)| rank.contains_key(id.as_str()))
        .collect();

    let mut outcomes: Vec<(String, Result<Vec<DayResult>, CobError>)> =
        match rayon::ThreadPoolBuilder::new().num_threads(worker_threads).build() {
            Ok(pool) => pool.install(|| {
                targets
                    .into_par_iter()
                    .map(|(id, acc)| (id.clone(), advance_to_date(acc, business_date, steps)))
                    .collect()
            }),
            // Pool construction only fails on resource exhaustion; fall back
            // to in-place sequential processing
            Err(_) => targets
                .into_iter()
                .map(|(id, acc)| (id.clone(), advance_to_date(acc, business_date, steps)))
                .collect(),
        };

    outcomes.sort_by_key(|(id, _)| rank.get(id.as_str()).copied().unwrap_or(usize::MAX));
    outcomes
}
