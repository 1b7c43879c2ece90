//! Domain models
//!
//! Loan, Installment, LoanTransaction, the LoanAccount aggregate, and the
//! ledger event log.

pub mod account;
pub mod event;
pub mod installment;
pub mod loan;
pub mod transaction;
