//! Schedule generation and recalculation
//!
//! Derives the ordered installment sequence for a progressive loan and
//! refreshes it when principal changes mid-life (additional tranche,
//! backdated disbursement, explicit reschedule).
//!
//! # Numeric policy
//!
//! - All amounts are i64 minor units; rate-derived values are rounded
//!   half-up per installment
//! - The final installment absorbs the rounding remainder, so the principal
//!   dues of a schedule sum exactly to the disbursed principal
//! - A balloon amount is carved out of the amortized principal and falls due
//!   with the final installment; interest accrues on the balloon balance
//!   until then
//!
//! # Critical Invariants
//!
//! - sum(principal_due) == disbursed principal, always
//! - Due dates are strictly increasing

use crate::core::money::round_half_up;
use crate::models::installment::Installment;
use crate::models::loan::LoanTerms;
use chrono::{Days, NaiveDate};
use thiserror::Error;

/// Errors from schedule derivation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    #[error("cannot amortize non-positive principal {0}")]
    NonPositivePrincipal(i64),
}

/// Periodic interest rate for the given terms
///
/// The period length is `period_days`, or the even share of
/// `fixed_length_days` when a fixed total length is set.
fn periodic_rate(terms: &LoanTerms) -> f64 {
    let days_per_period = match terms.fixed_length_days {
        Some(fixed) => fixed as f64 / terms.num_installments as f64,
        None => terms.period_days as f64,
    };
    terms.annual_interest_rate * days_per_period / 365.0
}

/// Due date of installment `seq` (1-based) for a loan disbursed on `start`
fn due_date(terms: &LoanTerms, start: NaiveDate, seq: u32) -> NaiveDate {
    let offset_days = match terms.fixed_length_days {
        // Spread due dates evenly across the fixed span, rounding half-up
        // so the final installment lands exactly on the last day
        Some(fixed) => {
            let n = terms.num_installments as u64;
            (fixed as u64 * seq as u64 + n / 2) / n
        }
        None => terms.period_days as u64 * seq as u64,
    };
    start
        .checked_add_days(Days::new(offset_days))
        .unwrap_or(start)
}

/// Amortize `principal` (with `balloon` carved out) over `periods` at rate
/// `rate`, returning (principal_due, interest_due) per period.
///
/// The last entry carries the remaining balance plus the balloon, which is
/// what makes the principal sum exact.
fn amortize(principal: i64, balloon: i64, rate: f64, periods: u32) -> Vec<(i64, i64)> {
    let amortized = (principal - balloon).max(0);
    let balloon = principal - amortized;
    let n = periods as usize;
    let mut rows = Vec::with_capacity(n);

    if rate <= 0.0 {
        let base = amortized / periods as i64;
        for k in 1..=n {
            let p = if k == n {
                amortized - base * (n as i64 - 1) + balloon
            } else {
                base
            };
            rows.push((p, 0));
        }
        return rows;
    }

    let annuity = amortized as f64 * rate / (1.0 - (1.0 + rate).powi(-(periods as i32)));
    let payment = round_half_up(annuity);
    let balloon_interest = round_half_up(balloon as f64 * rate);

    let mut balance = amortized;
    for k in 1..=n {
        let interest = round_half_up(balance as f64 * rate) + balloon_interest;
        let principal_component = if k == n {
            balance + balloon
        } else {
            (payment - round_half_up(balance as f64 * rate)).clamp(0, balance)
        };
        balance -= principal_component.min(balance);
        rows.push((principal_component, interest));
    }
    rows
}

/// Generate a fresh installment schedule
///
/// `principal` is the disbursed amount (which may be the first tranche of a
/// larger commitment); `disbursed_on` anchors the due dates.
pub fn generate(
    terms: &LoanTerms,
    principal: i64,
    disbursed_on: NaiveDate,
) -> Result<Vec<Installment>, ScheduleError> {
    if principal <= 0 {
        return Err(ScheduleError::NonPositivePrincipal(principal));
    }

    let balloon = terms.balloon_amount.unwrap_or(0).min(principal - 1).max(0);
    let rate = periodic_rate(terms);
    let rows = amortize(principal, balloon, rate, terms.num_installments);

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(idx, (principal_due, interest_due))| {
            let seq = idx as u32 + 1;
            Installment::new(seq, due_date(terms, disbursed_on, seq), principal_due, interest_due)
        })
        .collect())
}

/// Reamortize the remaining installments after extra principal lands
///
/// Installments with a due date before `as_of` keep their dues; the tail is
/// redistributed over the increased outstanding. Paid amounts are always
/// preserved, and an installment's principal due never drops below what is
/// already paid on it.
pub fn reamortize(
    schedule: &mut [Installment],
    terms: &LoanTerms,
    added_principal: i64,
    as_of: NaiveDate,
) -> Result<(), ScheduleError> {
    if added_principal <= 0 {
        return Err(ScheduleError::NonPositivePrincipal(added_principal));
    }
    if schedule.is_empty() {
        return Ok(());
    }

    let n = schedule.len();
    let start = schedule
        .iter()
        .position(|inst| inst.due_date() >= as_of)
        .unwrap_or(n - 1);

    let target: i64 = schedule[start..]
        .iter()
        .map(|inst| inst.principal_due())
        .sum::<i64>()
        + added_principal;
    let balloon = terms.balloon_amount.unwrap_or(0).min(target - 1).max(0);
    let rate = periodic_rate(terms);
    let rows = amortize(target, balloon, rate, (n - start) as u32);

    let mut shortfall = 0i64;
    for (inst, (raw_principal, raw_interest)) in schedule[start..].iter_mut().zip(rows) {
        // Dues never drop below what is already paid
        let principal_due = raw_principal.max(inst.principal_paid());
        let interest_due = raw_interest.max(inst.interest_paid());
        shortfall += principal_due - raw_principal;
        inst.set_dues(principal_due, interest_due);
    }
    // Paid-floor clamps above can only add principal; take the same amount
    // back out of the final installment to keep the sum exact.
    if shortfall > 0 {
        if let Some(last) = schedule.last_mut() {
            let due = (last.principal_due() - shortfall).max(last.principal_paid());
            last.set_dues(due, last.interest_due());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn test_zero_rate_splits_evenly_with_remainder_on_last() {
        let schedule = generate(&terms(100_001, 0.0, 4), 100_001, date(2024, 6, 1)).unwrap();
        let principals: Vec<i64> = schedule.iter().map(|i| i.principal_due()).collect();
        assert_eq!(principals, vec![25_000, 25_000, 25_000, 25_001]);
        assert!(schedule.iter().all(|i| i.interest_due() == 0));
    }

    #[test]
    fn test_principal_conserved_with_interest() {
        let schedule = generate(&terms(100_000, 0.12, 4), 100_000, date(2024, 6, 1)).unwrap();
        let total_principal: i64 = schedule.iter().map(|i| i.principal_due()).sum();
        assert_eq!(total_principal, 100_000);
        assert!(schedule.iter().all(|i| i.interest_due() > 0));
        // Declining balance: interest shrinks over time
        assert!(schedule[0].interest_due() > schedule[3].interest_due());
    }

    #[test]
    fn test_due_dates_spaced_by_period() {
        let schedule = generate(&terms(100_000, 0.0, 3), 100_000, date(2024, 6, 1)).unwrap();
        let dues: Vec<NaiveDate> = schedule.iter().map(|i| i.due_date()).collect();
        assert_eq!(
            dues,
            vec![date(2024, 7, 1), date(2024, 7, 31), date(2024, 8, 30)]
        );
    }

    #[test]
    fn test_fixed_length_spreads_due_dates() {
        let mut t = terms(100_000, 0.0, 4);
        t.fixed_length_days = Some(90);
        let schedule = generate(&t, 100_000, date(2024, 6, 1)).unwrap();
        let dues: Vec<NaiveDate> = schedule.iter().map(|i| i.due_date()).collect();
        // 90 days spread over 4 installments: offsets 23, 45, 68, 90
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
    fn test_balloon_lands_on_final_installment() {
        let mut t = terms(100_000, 0.12, 4);
        t.balloon_amount = Some(40_000);
        let schedule = generate(&t, 100_000, date(2024, 6, 1)).unwrap();

        let total_principal: i64 = schedule.iter().map(|i| i.principal_due()).sum();
        assert_eq!(total_principal, 100_000);
        // Final installment carries at least the balloon
        assert!(schedule[3].principal_due() >= 40_000);
        // Earlier installments amortize only the non-balloon part
        assert!(schedule[0].principal_due() < 20_000);
    }

    #[test]
    fn test_reamortize_adds_principal_to_tail() {
        let t = terms(100_000, 0.0, 4);
        let mut schedule = generate(&t, 100_000, date(2024, 6, 1)).unwrap();

        // Second tranche of 30,000 lands mid-July: installments 2..4 absorb it
        reamortize(&mut schedule, &t, 30_000, date(2024, 7, 15)).unwrap();

        let total_principal: i64 = schedule.iter().map(|i| i.principal_due()).sum();
        assert_eq!(total_principal, 130_000);
        assert_eq!(schedule[0].principal_due(), 25_000);
        assert_eq!(schedule[1].principal_due(), 35_000);
    }

    #[test]
    fn test_generate_rejects_non_positive_principal() {
        assert_eq!(
            generate(&terms(100_000, 0.0, 4), 0, date(2024, 6, 1)),
            Err(ScheduleError::NonPositivePrincipal(0))
        );
    }
}
