//! Snapshot and restore
//!
//! A snapshot captures the full ledger (clock, accounts, catch-up status)
//! and restores only under the configuration it was taken with.

use chrono::NaiveDate;
use loan_ledger_core_rs::{
    CatchUpState, CheckpointError, Currency, EngineConfig, LedgerEngine, LoanTerms, RelationType,
    SameDayOrder, StateSnapshot,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn terms() -> LoanTerms {
    LoanTerms {
        principal: 100_000,
        annual_interest_rate: 0.12,
        num_installments: 4,
        period_days: 30,
        fixed_length_days: None,
        balloon_amount: None,
        overdue_penalty: 500,
    }
}

fn busy_engine(config: EngineConfig) -> (LedgerEngine, String) {
    let mut engine = LedgerEngine::new(config).unwrap();
    let loan_id = engine
        .create_loan(Currency::new("USD", 2), terms(), Some("loan-ext-1".to_string()))
        .unwrap();
    engine.approve_loan(&loan_id).unwrap();
    engine
        .disburse(&loan_id, 100_000, date(2024, 6, 1), None)
        .unwrap();
    engine.advance_business_date_to(date(2024, 6, 10)).unwrap();
    engine
        .submit_repayment(&loan_id, 10_000, date(2024, 6, 10), Some("tx-ext-1".to_string()))
        .unwrap();
    // Backdated: leaves a reversed record and a replay relation behind
    engine
        .submit_repayment(&loan_id, 25_000, date(2024, 6, 5), None)
        .unwrap();
    engine.execute_catch_up().unwrap();
    (engine, loan_id)
}

#[test]
fn test_round_trip_preserves_full_ledger_state() {
    let config = EngineConfig::new(date(2024, 6, 1));
    let (engine, loan_id) = busy_engine(config.clone());
    let snapshot = engine.snapshot().unwrap();

    let restored = LedgerEngine::restore(config, snapshot).unwrap();

    assert_eq!(restored.business_date(), date(2024, 6, 10));
    let account = restored.account(&loan_id).unwrap();
    assert_eq!(account.total_outstanding(), engine.account(&loan_id).unwrap().total_outstanding());
    assert_eq!(account.transactions().len(), 4);
    assert_eq!(account.live_transactions().count(), 3);
    assert!(account
        .relations()
        .iter()
        .any(|r| r.relation_type() == RelationType::Replayed));
    assert_eq!(
        account.loan().last_closed_business_date(),
        date(2024, 6, 10)
    );

    let status = restored.catch_up_status().unwrap();
    assert_eq!(status.state, CatchUpState::Completed);
}

#[test]
fn test_restore_rebuilds_external_id_indexes() {
    let config = EngineConfig::new(date(2024, 6, 1));
    let (engine, loan_id) = busy_engine(config.clone());
    let snapshot = engine.snapshot().unwrap();
    let mut restored = LedgerEngine::restore(config, snapshot).unwrap();

    assert_eq!(
        restored
            .account_by_external_id("loan-ext-1")
            .unwrap()
            .loan()
            .id(),
        loan_id
    );
    // Restored indexes still enforce uniqueness
    assert!(restored
        .create_loan(Currency::new("USD", 2), terms(), Some("loan-ext-1".to_string()))
        .is_err());
    assert!(restored
        .submit_repayment(&loan_id, 100, date(2024, 6, 10), Some("tx-ext-1".to_string()))
        .is_err());
}

#[test]
fn test_restored_engine_continues_processing() {
    let config = EngineConfig::new(date(2024, 6, 1));
    let (engine, loan_id) = busy_engine(config.clone());
    let snapshot = engine.snapshot().unwrap();
    let mut restored = LedgerEngine::restore(config, snapshot).unwrap();

    restored.advance_business_date_to(date(2024, 6, 15)).unwrap();
    restored
        .submit_repayment(&loan_id, 5_000, date(2024, 6, 12), None)
        .unwrap();
    restored.execute_catch_up().unwrap();

    let account = restored.account(&loan_id).unwrap();
    assert_eq!(
        account.loan().last_closed_business_date(),
        date(2024, 6, 15)
    );
}

#[test]
fn test_restore_rejects_different_configuration() {
    let config = EngineConfig::new(date(2024, 6, 1));
    let (engine, _) = busy_engine(config.clone());
    let snapshot = engine.snapshot().unwrap();

    // A different tie-break rule would re-project history differently
    let other = config.with_same_day_order(SameDayOrder::TypePriorityThenCreation);
    assert!(matches!(
        LedgerEngine::restore(other, snapshot),
        Err(CheckpointError::ConfigHashMismatch { .. })
    ));
}

#[test]
fn test_snapshot_survives_json_round_trip() {
    let config = EngineConfig::new(date(2024, 6, 1));
    let (engine, loan_id) = busy_engine(config.clone());
    let snapshot = engine.snapshot().unwrap();

    let json = serde_json::to_string(&snapshot).unwrap();
    let decoded: StateSnapshot = serde_json::from_str(&json).unwrap();
    let restored = LedgerEngine::restore(config, decoded).unwrap();

    assert_eq!(
        restored.account(&loan_id).unwrap().total_outstanding(),
        engine.account(&loan_id).unwrap().total_outstanding()
    );
}
