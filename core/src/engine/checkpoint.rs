//! State snapshots
//!
//! A snapshot captures the whole ledger at a point in time: business date,
//! every account, and the catch-up status. Restore verifies a SHA-256 hash
//! of the engine configuration so state saved under one configuration is
//! never silently replayed under another (a changed tie-break rule would
//! make the projections lie).

use crate::cob::CatchUpStatus;
use crate::engine::engine::{EngineConfig, LedgerEngine, LedgerError};
use crate::core::time::BusinessDateClock;
use crate::models::account::LoanAccount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from snapshot creation and restore
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("snapshot was taken under a different configuration (hash {snapshot}, current {current})")]
    ConfigHashMismatch { snapshot: String, current: String },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] LedgerError),
}

/// Serializable point-in-time capture of the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub business_date: NaiveDate,

    /// SHA-256 over the canonical JSON of the engine configuration
    pub config_hash: String,

    pub accounts: Vec<LoanAccount>,

    pub catch_up: Option<CatchUpStatus>,
}

/// SHA-256 hash of a configuration's canonical JSON form
pub fn config_hash(config: &EngineConfig) -> Result<String, CheckpointError> {
    let json = serde_json::to_string(config)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

impl LedgerEngine {
    /// Capture the current ledger state
    pub fn snapshot(&self) -> Result<StateSnapshot, CheckpointError> {
        let mut accounts: Vec<LoanAccount> = self.accounts().values().cloned().collect();
        accounts.sort_by(|a, b| a.loan().id().cmp(b.loan().id()));
        Ok(StateSnapshot {
            business_date: self.business_date(),
            config_hash: config_hash(self.config())?,
            accounts,
            catch_up: self.catch_up().cloned(),
        })
    }

    /// Rebuild an engine from a snapshot taken under the same configuration
    ///
    /// External-id indexes are re-derived from the restored accounts.
    pub fn restore(config: EngineConfig, snapshot: StateSnapshot) -> Result<Self, CheckpointError> {
        let current = config_hash(&config)?;
        if current != snapshot.config_hash {
            return Err(CheckpointError::ConfigHashMismatch {
                snapshot: snapshot.config_hash,
                current,
            });
        }

        let accounts = snapshot
            .accounts
            .into_iter()
            .map(|acc| (acc.loan().id().to_string(), acc))
            .collect();
        let clock = BusinessDateClock::new(snapshot.business_date);
        Ok(LedgerEngine::from_parts(
            config,
            clock,
            accounts,
            snapshot.catch_up,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::money::Currency;
    use crate::models::loan::LoanTerms;

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

    #[test]
    fn test_snapshot_round_trip_preserves_state() {
        let config = EngineConfig::new(date(2024, 6, 1));
        let mut engine = LedgerEngine::new(config.clone()).unwrap();
        let loan_id = engine
            .create_loan(Currency::new("USD", 2), terms(), Some("ext-1".to_string()))
            .unwrap();
        engine.approve_loan(&loan_id).unwrap();
        engine.disburse(&loan_id, 100_000, date(2024, 6, 1), None).unwrap();
        engine.advance_business_date(4);
        engine.execute_catch_up().unwrap();

        let snapshot = engine.snapshot().unwrap();
        let restored = LedgerEngine::restore(config, snapshot).unwrap();

        assert_eq!(restored.business_date(), date(2024, 6, 5));
        let account = restored.account(&loan_id).unwrap();
        assert_eq!(account.total_outstanding(), 100_000);
        assert_eq!(
            account.loan().last_closed_business_date(),
            date(2024, 6, 5)
        );
        assert!(restored.account_by_external_id("ext-1").is_some());
    }

    #[test]
    fn test_restore_rejects_changed_config() {
        let config = EngineConfig::new(date(2024, 6, 1));
        let engine = LedgerEngine::new(config.clone()).unwrap();
        let snapshot = engine.snapshot().unwrap();

        let other = config.with_worker_threads(8);
        assert!(matches!(
            LedgerEngine::restore(other, snapshot),
            Err(CheckpointError::ConfigHashMismatch { .. })
        ));
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let config = EngineConfig::new(date(2024, 6, 1));
        let engine = LedgerEngine::new(config).unwrap();
        let snapshot = engine.snapshot().unwrap();

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.business_date, snapshot.business_date);
        assert_eq!(back.config_hash, snapshot.config_hash);
    }
}
