//! Ledger engine facade
//!
//! - **engine**: configuration, the in-memory ledger, and every operation
//!   callers go through
//! - **checkpoint**: state snapshots with a config hash guarding restore

pub mod checkpoint;
pub mod engine;

pub use checkpoint::{CheckpointError, StateSnapshot};
pub use engine::{EngineConfig, LedgerEngine, LedgerError};
