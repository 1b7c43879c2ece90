//! Account locks
//!
//! Per-loan advisory and blocking locks. A SOFT lock is informational (for
//! example "COB in progress") and never blocks anything; a HARD lock rejects
//! every mutating operation on the loan until an explicit unlock.
//!
//! # Critical Invariants
//!
//! - At most one lock per loan at a time
//! - A HARD lock can only be replaced by the COB system actor or removed by
//!   an explicit unlock
//! - `unlock` is idempotent

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lock severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    /// Advisory only; surfaced via queries, never blocks
    Soft,
    /// Blocks all mutating operations except unlock
    Hard,
}

/// Who is asking for a lock-guarded operation
///
/// The COB system actor may process (and re-lock) a loan that is already
/// HARD-locked; that is how a stuck loan is recovered by catch-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Operator,
    CobSystem,
}

/// Errors from lock operations and lock-guarded operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LockError {
    #[error("loan {loan_id} is already hard-locked: {reason}")]
    AlreadyLocked { loan_id: String, reason: String },

    #[error("loan {loan_id} is hard-locked: {reason}")]
    LoanLocked { loan_id: String, reason: String },
}

/// A lock held on a loan account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountLock {
    lock_type: LockType,
    /// Short machine-readable reason code, e.g. "COB_IN_PROGRESS"
    reason: String,
    /// Optional free-text detail for operators
    message: Option<String>,
}

impl AccountLock {
    pub fn soft(reason: impl Into<String>) -> Self {
        Self {
            lock_type: LockType::Soft,
            reason: reason.into(),
            message: None,
        }
    }

    pub fn hard(reason: impl Into<String>) -> Self {
        Self {
            lock_type: LockType::Hard,
            reason: reason.into(),
            message: None,
        }
    }

    /// Attach a free-text detail message (builder pattern)
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    pub fn is_hard(&self) -> bool {
        self.lock_type == LockType::Hard
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

/// One page of a paginated query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Zero-based page index
    pub page: usize,
    pub page_size: usize,
    /// Total matching items across all pages
    pub total: usize,
}

/// Queryable view of a locked loan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockedAccountView {
    pub loan_id: String,
    pub lock_type: LockType,
    pub reason: String,
    pub message: Option<String>,
}
