//! Schedule derivation through the engine
//!
//! Amortization, balloon terms, fixed-length date spreading, and
//! re-amortization after a second tranche, all observed through the
//! public disbursement flow.

use chrono::NaiveDate;
use loan_ledger_core_rs::{Currency, EngineConfig, LedgerEngine, LoanStatus, LoanTerms};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn terms(principal: i64, rate: f64, n: u32) -> LoanTerms {
    LoanTerms {
        principal,
        annual_interest_rate: rate,
        num_installments: n,
        period_days: 30,
        fixed_length_days: None,
        balloon_amount: None,
        overdue_penalty: 0,
    }
}

fn disbursed(terms: LoanTerms, amount: i64) -> (LedgerEngine, String) {
    let mut engine = LedgerEngine::new(EngineConfig::new(date(2024, 6, 1))).unwrap();
    let loan_id = engine
        .create_loan(Currency::new("USD", 2), terms, None)
        .unwrap();
    engine.approve_loan(&loan_id).unwrap();
    engine
        .disburse(&loan_id, amount, date(2024, 6, 1), None)
        .unwrap();
    (engine, loan_id)
}

#[test]
fn test_disbursement_activates_and_generates_schedule() {
    let (engine, loan_id) = disbursed(terms(100_000, 0.0, 4), 100_000);
    let account = engine.account(&loan_id).unwrap();

    assert_eq!(account.loan().status(), LoanStatus::Active);
    assert_eq!(account.schedule().len(), 4);
    let principals: Vec<i64> = account.schedule().iter().map(|i| i.principal_due()).collect();
    assert_eq!(principals, vec![25_000, 25_000, 25_000, 25_000]);
    let dues: Vec<NaiveDate> = account.schedule().iter().map(|i| i.due_date()).collect();
    assert_eq!(
        dues,
        vec![
            date(2024, 7, 1),
            date(2024, 7, 31),
            date(2024, 8, 30),
            date(2024, 9, 29)
        ]
    );
}

#[test]
fn test_principal_sum_exact_under_interest() {
    let (engine, loan_id) = disbursed(terms(100_000, 0.12, 4), 100_000);
    let account = engine.account(&loan_id).unwrap();

    let total_principal: i64 = account.schedule().iter().map(|i| i.principal_due()).sum();
    assert_eq!(total_principal, 100_000);
    // Declining balance: first installment carries the most interest
    let interests: Vec<i64> = account.schedule().iter().map(|i| i.interest_due()).collect();
    assert!(interests[0] > interests[3]);
    assert!(interests.iter().all(|&i| i > 0));
}

#[test]
fn test_fixed_length_spreads_due_dates_evenly() {
    let mut t = terms(100_000, 0.0, 4);
    t.fixed_length_days = Some(90);
    let (engine, loan_id) = disbursed(t, 100_000);

    let dues: Vec<NaiveDate> = engine
        .account(&loan_id)
        .unwrap()
        .schedule()
        .iter()
        .map(|i| i.due_date())
        .collect();
    // 90 days over 4 installments, last lands exactly on day 90
    assert_eq!(
        dues,
        vec![
            date(2024, 6, 24),
            date(2024, 7, 16),
            date(2024, 8, 8),
            date(2024, 8, 30)
        ]
    );
}

#[test]
fn test_balloon_falls_due_with_final_installment() {
    let mut t = terms(100_000, 0.12, 4);
    t.balloon_amount = Some(40_000);
    let (engine, loan_id) = disbursed(t, 100_000);
    let account = engine.account(&loan_id).unwrap();

    let total_principal: i64 = account.schedule().iter().map(|i| i.principal_due()).sum();
    assert_eq!(total_principal, 100_000);
    assert!(account.schedule()[3].principal_due() >= 40_000);
    assert!(account.schedule()[0].principal_due() < 20_000);
}

#[test]
fn test_second_tranche_reamortizes_remaining_installments() {
    let (mut engine, loan_id) = disbursed(terms(100_000, 0.0, 4), 100_000);
    engine.advance_business_date_to(date(2024, 7, 15)).unwrap();
    engine
        .disburse(&loan_id, 30_000, date(2024, 7, 15), None)
        .unwrap();

    let account = engine.account(&loan_id).unwrap();
    assert_eq!(account.disbursed_total(), 130_000);
    let total_principal: i64 = account.schedule().iter().map(|i| i.principal_due()).sum();
    assert_eq!(total_principal, 130_000);
    // First installment (due 1 July, before the tranche) keeps its dues
    assert_eq!(account.schedule()[0].principal_due(), 25_000);
    assert_eq!(account.schedule()[1].principal_due(), 35_000);
}

#[test]
fn test_reschedule_rebuilds_against_new_terms() {
    let (mut engine, loan_id) = disbursed(terms(100_000, 0.0, 4), 100_000);
    engine.advance_business_date_to(date(2024, 6, 10)).unwrap();
    engine
        .submit_repayment(&loan_id, 10_000, date(2024, 6, 10), None)
        .unwrap();

    engine.reschedule(&loan_id, terms(100_000, 0.0, 5)).unwrap();

    let account = engine.account(&loan_id).unwrap();
    assert_eq!(account.schedule().len(), 5);
    // The repayment survives the rebuild
    assert_eq!(account.total_outstanding(), 90_000);
    let total_principal: i64 = account.schedule().iter().map(|i| i.principal_due()).sum();
    assert_eq!(total_principal, 100_000);
}

#[test]
fn test_invalid_terms_rejected_at_creation() {
    let mut engine = LedgerEngine::new(EngineConfig::new(date(2024, 6, 1))).unwrap();

    let mut bad = terms(100_000, 0.0, 4);
    bad.balloon_amount = Some(150_000);
    assert!(engine
        .create_loan(Currency::new("USD", 2), bad, None)
        .is_err());

    let mut bad = terms(100_000, 0.0, 200);
    bad.fixed_length_days = Some(90);
    assert!(engine
        .create_loan(Currency::new("USD", 2), bad, None)
        .is_err());
}
