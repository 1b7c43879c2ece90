//! Demo driver for the loan ledger
//!
//! Walks one loan through the full flow: disbursement, an in-order
//! repayment, a backdated repayment that triggers a replay, and a
//! catch-up run that closes the outstanding business days. Prints the
//! final account state as JSON.

use chrono::NaiveDate;
use loan_ledger_core_rs::{Currency, EngineConfig, LedgerEngine, LoanTerms};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    // Literal demo dates are always valid
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::new(date(2024, 6, 1));
    let mut engine = LedgerEngine::new(config)?;

    let terms = LoanTerms {
        principal: 100_000,
        annual_interest_rate: 0.12,
        num_installments: 4,
        period_days: 30,
        fixed_length_days: None,
        balloon_amount: None,
        overdue_penalty: 500,
    };
    let loan_id = engine.create_loan(Currency::new("USD", 2), terms, Some("demo-loan".into()))?;
    engine.approve_loan(&loan_id)?;
    engine.disburse(&loan_id, 100_000, date(2024, 6, 1), None)?;
    println!("disbursed 100000 on 2024-06-01, loan {loan_id}");

    engine.advance_business_date_to(date(2024, 6, 10))?;
    engine.submit_repayment(&loan_id, 10_000, date(2024, 6, 10), None)?;
    println!("repaid 10000 on 2024-06-10");

    // Arrives late, dated five days back: the ledger reverses and replays
    // the 10 June repayment so both apply in date order
    engine.submit_repayment(&loan_id, 25_000, date(2024, 6, 5), None)?;
    println!("backdated repayment of 25000 for 2024-06-05 replayed");

    engine.advance_business_date_to(date(2024, 6, 15))?;
    let result = engine.execute_catch_up()?;
    println!(
        "catch-up processed {} loan(s), {} failure(s)",
        result.processed.len(),
        result.failures.len()
    );

    let account = engine.account(&loan_id)?;
    let currency = account.loan().currency();
    println!(
        "outstanding: {} {} | live transactions: {} | relations: {}",
        currency.format_amount(account.total_outstanding()),
        currency.code(),
        account.live_transactions().count(),
        account.relations().len()
    );
    println!("{}", serde_json::to_string_pretty(account)?);
    Ok(())
}
