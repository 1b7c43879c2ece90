//! Event logging for auditing and tests
//!
//! The ledger records every significant state change as a domain event.
//! Events enable:
//! - Auditing (what changed, in order, with the business date it happened on)
//! - Debugging replay and COB behavior
//! - Test assertions without poking at internals
//!
//! Events carry the loan id where one applies, so logs can be filtered
//! per loan.

use crate::locks::LockType;
use crate::models::transaction::TransactionType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ledger event capturing a state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    /// A live transaction was applied to a loan
    TransactionApplied {
        loan_id: String,
        tx_id: String,
        transaction_type: TransactionType,
        amount: i64,
        date: NaiveDate,
    },

    /// A transaction was reversed during replay
    TransactionReversed {
        loan_id: String,
        tx_id: String,
        date: NaiveDate,
    },

    /// A backdated insertion finished replaying
    ReplayCompleted {
        loan_id: String,
        trigger_tx_id: String,
        num_reversed: usize,
        num_regenerated: usize,
    },

    /// COB committed one business day for a loan
    DayClosed {
        loan_id: String,
        date: NaiveDate,
        steps_executed: usize,
    },

    /// A business step failed and the loan was hard-locked
    StepFailed {
        loan_id: String,
        date: NaiveDate,
        step: String,
        message: String,
    },

    /// A lock was placed on a loan
    LoanLocked {
        loan_id: String,
        lock_type: LockType,
        reason: String,
    },

    /// A loan was unlocked
    LoanUnlocked { loan_id: String },

    /// A catch-up run started
    CatchUpStarted {
        business_date: NaiveDate,
        num_behind: usize,
    },

    /// A catch-up run finished
    CatchUpCompleted {
        business_date: NaiveDate,
        num_processed: usize,
        num_failed: usize,
    },
}

impl Event {
    /// Loan id this event concerns, if any
    pub fn loan_id(&self) -> Option<&str> {
        match self {
            Event::TransactionApplied { loan_id, .. }
            | Event::TransactionReversed { loan_id, .. }
            | Event::ReplayCompleted { loan_id, .. }
            | Event::DayClosed { loan_id, .. }
            | Event::StepFailed { loan_id, .. }
            | Event::LoanLocked { loan_id, .. }
            | Event::LoanUnlocked { loan_id } => Some(loan_id),
            Event::CatchUpStarted { .. } | Event::CatchUpCompleted { .. } => None,
        }
    }
}

/// Append-only event log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Get the number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events for a specific loan
    pub fn events_for_loan(&self, loan_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.loan_id() == Some(loan_id))
            .collect()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_events_for_loan_filters() {
        let mut log = EventLog::new();
        log.log(Event::DayClosed {
            loan_id: "loan-1".to_string(),
            date: date(2024, 6, 2),
            steps_executed: 2,
        });
        log.log(Event::DayClosed {
            loan_id: "loan-2".to_string(),
            date: date(2024, 6, 2),
            steps_executed: 2,
        });
        log.log(Event::CatchUpStarted {
            business_date: date(2024, 6, 2),
            num_behind: 2,
        });

        assert_eq!(log.len(), 3);
        assert_eq!(log.events_for_loan("loan-1").len(), 1);
    }
}
