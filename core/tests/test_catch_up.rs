//! Catch-up scheduling across many loans
//!
//! Oldest-first ordering, idempotent re-invocation, failure isolation,
//! status reporting, and the parallel worker path.

use chrono::NaiveDate;
use loan_ledger_core_rs::{
    BusinessStep, CatchUpState, CobState, Currency, EngineConfig, LedgerEngine, LoanAccount,
    LoanTerms, SameDayOrder, StepError, APPLY_OVERDUE_PENALTY, COB_JOB, REFRESH_OBLIGATIONS,
};
use std::sync::Arc;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn terms() -> LoanTerms {
    LoanTerms {
        principal: 100_000,
        annual_interest_rate: 0.0,
        num_installments: 4,
        period_days: 30,
        fixed_length_days: None,
        balloon_amount: None,
        overdue_penalty: 0,
    }
}

fn add_loan(engine: &mut LedgerEngine, disbursed_on: NaiveDate) -> String {
    let loan_id = engine
        .create_loan(Currency::new("USD", 2), terms(), None)
        .unwrap();
    engine.approve_loan(&loan_id).unwrap();
    engine
        .disburse(&loan_id, 100_000, disbursed_on, None)
        .unwrap();
    loan_id
}

struct FailFor {
    loan_id: String,
}

impl BusinessStep for FailFor {
    fn name(&self) -> &'static str {
        "fail-for-loan"
    }

    fn execute(&self, account: &mut LoanAccount, _date: NaiveDate) -> Result<bool, StepError> {
        if account.loan().id() == self.loan_id {
            Err(StepError::new("injected failure"))
        } else {
            Ok(false)
        }
    }
}

#[test]
fn test_catch_up_processes_oldest_first() {
    let mut engine = LedgerEngine::new(EngineConfig::new(date(2024, 6, 1))).unwrap();
    let oldest = add_loan(&mut engine, date(2024, 6, 1));
    engine.advance_business_date_to(date(2024, 6, 3)).unwrap();
    let middle = add_loan(&mut engine, date(2024, 6, 3));
    engine.advance_business_date_to(date(2024, 6, 5)).unwrap();
    let newest = add_loan(&mut engine, date(2024, 6, 5));
    engine.advance_business_date_to(date(2024, 6, 8)).unwrap();

    let result = engine.execute_catch_up().unwrap();
    assert_eq!(result.processed, vec![oldest, middle, newest]);
    assert!(result.failures.is_empty());
    assert_eq!(result.skipped, 0);
}

#[test]
fn test_catch_up_skips_current_loans_and_reruns_clean() {
    let mut engine = LedgerEngine::new(EngineConfig::new(date(2024, 6, 1))).unwrap();
    let behind = add_loan(&mut engine, date(2024, 6, 1));
    engine.advance_business_date_to(date(2024, 6, 5)).unwrap();
    let current = add_loan(&mut engine, date(2024, 6, 5));

    let first = engine.execute_catch_up().unwrap();
    assert_eq!(first.processed, vec![behind.clone()]);
    assert_eq!(first.skipped, 1);

    // Everything is current now; a rerun does nothing
    let second = engine.execute_catch_up().unwrap();
    assert!(second.processed.is_empty());
    assert_eq!(second.skipped, 2);
    assert_eq!(engine.cob_state(&behind).unwrap(), CobState::Current);
    assert_eq!(engine.cob_state(&current).unwrap(), CobState::Current);
}

#[test]
fn test_one_failure_does_not_stop_the_run() {
    let mut engine = LedgerEngine::new(EngineConfig::new(date(2024, 6, 1))).unwrap();
    let healthy_a = add_loan(&mut engine, date(2024, 6, 1));
    let doomed = add_loan(&mut engine, date(2024, 6, 1));
    let healthy_b = add_loan(&mut engine, date(2024, 6, 1));

    engine
        .register_step(Arc::new(FailFor {
            loan_id: doomed.clone(),
        }))
        .unwrap();
    engine
        .set_job_steps(
            COB_JOB,
            vec![
                APPLY_OVERDUE_PENALTY.to_string(),
                "fail-for-loan".to_string(),
                REFRESH_OBLIGATIONS.to_string(),
            ],
        )
        .unwrap();
    engine.advance_business_date_to(date(2024, 6, 4)).unwrap();

    let result = engine.execute_catch_up().unwrap();
    assert_eq!(result.processed.len(), 2);
    assert!(result.processed.contains(&healthy_a));
    assert!(result.processed.contains(&healthy_b));
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].loan_id, doomed);

    // Healthy loans are current; the failed loan is stuck and hard-locked
    assert_eq!(engine.cob_state(&healthy_a).unwrap(), CobState::Current);
    let stuck = engine.account(&doomed).unwrap();
    assert_eq!(stuck.loan().last_closed_business_date(), date(2024, 6, 1));
    assert!(stuck.lock().unwrap().is_hard());

    let status = engine.catch_up_status().unwrap();
    assert_eq!(status.state, CatchUpState::Failed);
    assert_eq!(status.num_processed, 2);
    assert_eq!(status.num_failed, 1);
    assert_eq!(status.cursor_date, Some(date(2024, 6, 1)));
}

#[test]
fn test_catch_up_status_after_clean_run() {
    let mut engine = LedgerEngine::new(EngineConfig::new(date(2024, 6, 1))).unwrap();
    add_loan(&mut engine, date(2024, 6, 1));
    add_loan(&mut engine, date(2024, 6, 1));
    engine.advance_business_date(5);

    assert!(engine.catch_up_status().is_none());
    engine.execute_catch_up().unwrap();

    let status = engine.catch_up_status().unwrap();
    assert_eq!(status.state, CatchUpState::Completed);
    assert_eq!(status.num_processed, 2);
    assert_eq!(status.num_failed, 0);
    assert_eq!(status.cursor_date, None);
}

#[test]
fn test_parallel_catch_up_matches_sequential_outcome() {
    let sequential = EngineConfig::new(date(2024, 6, 1));
    let parallel = EngineConfig::new(date(2024, 6, 1)).with_worker_threads(4);

    let mut results = Vec::new();
    for config in [sequential, parallel] {
        let mut engine = LedgerEngine::new(config).unwrap();
        let mut ids = Vec::new();
        for day in 1..=6 {
            engine.advance_business_date_to(date(2024, 6, day)).unwrap();
            ids.push(add_loan(&mut engine, date(2024, 6, day)));
        }
        engine.advance_business_date_to(date(2024, 6, 10)).unwrap();
        let result = engine.execute_catch_up().unwrap();
        assert_eq!(result.processed, ids);

        let cursors: Vec<NaiveDate> = ids
            .iter()
            .map(|id| {
                engine
                    .account(id)
                    .unwrap()
                    .loan()
                    .last_closed_business_date()
            })
            .collect();
        results.push(cursors);
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn test_catch_up_applies_overdue_penalties_day_by_day() {
    let config = EngineConfig::new(date(2024, 6, 1)).with_same_day_order(SameDayOrder::CreationOrder);
    let mut engine = LedgerEngine::new(config).unwrap();
    let loan_id = engine
        .create_loan(
            Currency::new("USD", 2),
            LoanTerms {
                overdue_penalty: 500,
                ..terms()
            },
            None,
        )
        .unwrap();
    engine.approve_loan(&loan_id).unwrap();
    engine
        .disburse(&loan_id, 100_000, date(2024, 6, 1), None)
        .unwrap();

    // First installment due 1 July falls overdue during the gap
    engine.advance_business_date_to(date(2024, 7, 3)).unwrap();
    engine.execute_catch_up().unwrap();

    assert_eq!(engine.account(&loan_id).unwrap().total_outstanding(), 100_500);
}
