//! Business-date management
//!
//! The ledger operates on an explicit "business date" that is advanced by
//! configuration or batch processing, never by the wall clock. This keeps
//! every COB and replay computation deterministic and testable.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from business-date advancement
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClockError {
    #[error("business date cannot move backwards: current {current}, requested {requested}")]
    MovesBackwards {
        current: NaiveDate,
        requested: NaiveDate,
    },
}

/// Holds the current business date for the ledger
///
/// The date only ever moves forward, and only when told to.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use loan_ledger_core_rs::BusinessDateClock;
///
/// let start = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
/// let mut clock = BusinessDateClock::new(start);
/// clock.advance_days(3);
/// assert_eq!(clock.current(), NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessDateClock {
    current: NaiveDate,
}

impl BusinessDateClock {
    /// Create a clock positioned at the given start date
    pub fn new(start: NaiveDate) -> Self {
        Self { current: start }
    }

    /// Get the current business date
    pub fn current(&self) -> NaiveDate {
        self.current
    }

    /// Advance the business date by `days` calendar days
    pub fn advance_days(&mut self, days: u64) {
        // NaiveDate covers +/- ~262000 years; adding a u64 of days within
        // that range cannot fail for any realistic ledger horizon.
        if let Some(next) = self.current.checked_add_days(Days::new(days)) {
            self.current = next;
        }
    }

    /// Advance the business date to an explicit target date
    ///
    /// Advancing to the current date is a no-op. Moving backwards is
    /// rejected: closed business days are immutable.
    pub fn advance_to(&mut self, date: NaiveDate) -> Result<(), ClockError> {
        if date < self.current {
            return Err(ClockError::MovesBackwards {
                current: self.current,
                requested: date,
            });
        }
        self.current = date;
        Ok(())
    }
}
