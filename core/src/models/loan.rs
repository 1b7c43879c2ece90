//! Loan model
//!
//! A loan carries its contractual terms, lifecycle status, and the last
//! business date that close-of-business processing has committed for it.
//!
//! CRITICAL: All money values are i64 (minor units)

use crate::core::money::Currency;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Loan lifecycle status
///
/// Transitions are driven exclusively by the state-machine methods on
/// [`Loan`]; no caller assigns a status directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanStatus {
    /// Submitted, awaiting approval
    Pending,

    /// Approved, awaiting first disbursement
    Approved,

    /// Disbursed; obligations outstanding
    Active,

    /// Every installment's obligations are met
    ClosedObligationsMet,

    /// Paid beyond the total due; the excess is held as overpayment
    Overpaid,

    /// Written off; no further ledger activity accepted
    ChargedOff,
}

/// Errors from loan construction and status transitions
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoanError {
    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(i64),

    #[error("number of installments must be positive")]
    NoInstallments,

    #[error("installment period must be positive")]
    NoPeriodLength,

    #[error("annual interest rate must be non-negative, got {0}")]
    NegativeInterestRate(f64),

    #[error("balloon amount {balloon} must be positive and below principal {principal}")]
    InvalidBalloon { balloon: i64, principal: i64 },

    #[error("fixed length {fixed_length_days} days cannot be shorter than {num_installments} installments")]
    FixedLengthTooShort {
        fixed_length_days: u32,
        num_installments: u32,
    },

    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidStatusTransition { from: LoanStatus, to: LoanStatus },
}

/// Contractual terms of a progressive loan
///
/// `period_days` spaces installments when no fixed length is set; with
/// `fixed_length_days` the due dates are instead spread evenly across that
/// total span. `balloon_amount` is carved out of the amortized principal and
/// falls due with the final installment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanTerms {
    /// Contractual principal (minor units)
    pub principal: i64,

    /// Nominal annual interest rate as a fraction (0.12 = 12%)
    pub annual_interest_rate: f64,

    /// Number of installments in the schedule
    pub num_installments: u32,

    /// Days between installments
    pub period_days: u32,

    /// Total loan length override in days (due dates spread evenly)
    pub fixed_length_days: Option<u32>,

    /// Balloon repayment due with the final installment (minor units)
    pub balloon_amount: Option<i64>,

    /// Flat penalty applied once per installment that falls overdue
    /// (minor units; 0 disables the overdue-penalty step for this loan)
    pub overdue_penalty: i64,
}

impl LoanTerms {
    /// Validate term values
    pub fn validate(&self) -> Result<(), LoanError> {
        if self.principal <= 0 {
            return Err(LoanError::NonPositivePrincipal(self.principal));
        }
        if self.num_installments == 0 {
            return Err(LoanError::NoInstallments);
        }
        if self.period_days == 0 {
            return Err(LoanError::NoPeriodLength);
        }
        if self.annual_interest_rate < 0.0 {
            return Err(LoanError::NegativeInterestRate(self.annual_interest_rate));
        }
        if let Some(balloon) = self.balloon_amount {
            if balloon <= 0 || balloon >= self.principal {
                return Err(LoanError::InvalidBalloon {
                    balloon,
                    principal: self.principal,
                });
            }
        }
        if let Some(fixed) = self.fixed_length_days {
            if fixed < self.num_installments {
                return Err(LoanError::FixedLengthTooShort {
                    fixed_length_days: fixed,
                    num_installments: self.num_installments,
                });
            }
        }
        Ok(())
    }
}

/// A loan account's identity, terms, and lifecycle state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Loan {
    /// Unique loan identifier (UUID)
    id: String,

    /// Optional caller-supplied identifier, unique across the ledger
    external_id: Option<String>,

    status: LoanStatus,

    currency: Currency,

    terms: LoanTerms,

    /// Last business date committed by COB processing for this loan.
    /// Always <= the global business date; COB closes the gap one day at
    /// a time and never skips a day.
    last_closed_business_date: NaiveDate,
}

impl Loan {
    /// Create a new pending loan
    ///
    /// `created_on` becomes the initial last-closed business date, so a
    /// freshly created loan is current as of the day it was created.
    pub fn new(currency: Currency, terms: LoanTerms, created_on: NaiveDate) -> Result<Self, LoanError> {
        terms.validate()?;
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            external_id: None,
            status: LoanStatus::Pending,
            currency,
            terms,
            last_closed_business_date: created_on,
        })
    }

    /// Set the external id (builder pattern)
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.terms
    }

    pub fn last_closed_business_date(&self) -> NaiveDate {
        self.last_closed_business_date
    }

    /// Check whether the loan accepts ledger activity at all
    pub fn is_open(&self) -> bool {
        !matches!(self.status, LoanStatus::ChargedOff)
    }

    // ========================================================================
    // Status transitions
    // ========================================================================

    fn transition_error(&self, to: LoanStatus) -> LoanError {
        LoanError::InvalidStatusTransition {
            from: self.status,
            to,
        }
    }

    /// Pending -> Approved
    pub fn approve(&mut self) -> Result<(), LoanError> {
        match self.status {
            LoanStatus::Pending => {
                self.status = LoanStatus::Approved;
                Ok(())
            }
            _ => Err(self.transition_error(LoanStatus::Approved)),
        }
    }

    /// Approved -> Active (first disbursement); Active stays Active
    /// (additional tranche)
    pub fn activate(&mut self) -> Result<(), LoanError> {
        match self.status {
            LoanStatus::Approved | LoanStatus::Active => {
                self.status = LoanStatus::Active;
                Ok(())
            }
            _ => Err(self.transition_error(LoanStatus::Active)),
        }
    }

    /// Active/Overpaid -> ClosedObligationsMet
    pub fn close_obligations_met(&mut self) -> Result<(), LoanError> {
        match self.status {
            LoanStatus::Active | LoanStatus::Overpaid | LoanStatus::ClosedObligationsMet => {
                self.status = LoanStatus::ClosedObligationsMet;
                Ok(())
            }
            _ => Err(self.transition_error(LoanStatus::ClosedObligationsMet)),
        }
    }

    /// Active/ClosedObligationsMet -> Overpaid
    pub fn mark_overpaid(&mut self) -> Result<(), LoanError> {
        match self.status {
            LoanStatus::Active | LoanStatus::ClosedObligationsMet | LoanStatus::Overpaid => {
                self.status = LoanStatus::Overpaid;
                Ok(())
            }
            _ => Err(self.transition_error(LoanStatus::Overpaid)),
        }
    }

    /// ClosedObligationsMet/Overpaid -> Active (e.g. a chargeback reopens
    /// a settled loan)
    pub fn reopen(&mut self) -> Result<(), LoanError> {
        match self.status {
            LoanStatus::ClosedObligationsMet | LoanStatus::Overpaid | LoanStatus::Active => {
                self.status = LoanStatus::Active;
                Ok(())
            }
            _ => Err(self.transition_error(LoanStatus::Active)),
        }
    }

    /// Active/Overpaid -> ChargedOff
    pub fn charge_off(&mut self) -> Result<(), LoanError> {
        match self.status {
            LoanStatus::Active | LoanStatus::Overpaid => {
                self.status = LoanStatus::ChargedOff;
                Ok(())
            }
            _ => Err(self.transition_error(LoanStatus::ChargedOff)),
        }
    }

    // ========================================================================
    // COB bookkeeping
    // ========================================================================

    /// Commit one processed business day
    pub(crate) fn set_last_closed_business_date(&mut self, date: NaiveDate) {
        self.last_closed_business_date = date;
    }

    /// Replace the contractual terms (explicit reschedule)
    pub(crate) fn set_terms(&mut self, terms: LoanTerms) -> Result<(), LoanError> {
        terms.validate()?;
        self.terms = terms;
        Ok(())
    }

    /// Reset status ahead of a projection rebuild; the replayed transaction
    /// history re-derives Active/Closed/Overpaid from scratch.
    pub(crate) fn reset_for_rebuild(&mut self) {
        if self.status != LoanStatus::Pending {
            self.status = LoanStatus::Approved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms() -> LoanTerms {
        LoanTerms {
            principal: 100_000,
            annual_interest_rate: 0.12,
            num_installments: 4,
            period_days: 30,
            fixed_length_days: None,
            balloon_amount: None,
            overdue_penalty: 0,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_new_loan_is_pending_and_current() {
        let loan = Loan::new(Currency::new("USD", 2), terms(), date(2024, 6, 1)).unwrap();
        assert_eq!(loan.status(), LoanStatus::Pending);
        assert_eq!(loan.last_closed_business_date(), date(2024, 6, 1));
    }

    #[test]
    fn test_invalid_terms_rejected() {
        let mut bad = terms();
        bad.principal = 0;
        assert_eq!(
            Loan::new(Currency::new("USD", 2), bad, date(2024, 6, 1)).unwrap_err(),
            LoanError::NonPositivePrincipal(0)
        );

        let mut bad = terms();
        bad.balloon_amount = Some(100_000);
        assert!(matches!(
            Loan::new(Currency::new("USD", 2), bad, date(2024, 6, 1)),
            Err(LoanError::InvalidBalloon { .. })
        ));
    }

    #[test]
    fn test_lifecycle_happy_path() {
        let mut loan = Loan::new(Currency::new("USD", 2), terms(), date(2024, 6, 1)).unwrap();
        loan.approve().unwrap();
        loan.activate().unwrap();
        loan.close_obligations_met().unwrap();
        assert_eq!(loan.status(), LoanStatus::ClosedObligationsMet);
        loan.reopen().unwrap();
        assert_eq!(loan.status(), LoanStatus::Active);
    }

    #[test]
    fn test_disburse_before_approval_rejected() {
        let mut loan = Loan::new(Currency::new("USD", 2), terms(), date(2024, 6, 1)).unwrap();
        assert!(matches!(
            loan.activate(),
            Err(LoanError::InvalidStatusTransition { .. })
        ));
    }

    #[test]
    fn test_charged_off_is_terminal() {
        let mut loan = Loan::new(Currency::new("USD", 2), terms(), date(2024, 6, 1)).unwrap();
        loan.approve().unwrap();
        loan.activate().unwrap();
        loan.charge_off().unwrap();
        assert!(!loan.is_open());
        assert!(loan.reopen().is_err());
        assert!(loan.activate().is_err());
    }
}
