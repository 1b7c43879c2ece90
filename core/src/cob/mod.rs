//! Close-of-business processing
//!
//! - **steps**: named business steps, their registry, and per-job ordering
//! - **processor**: day-by-day advancement of a single loan
//! - **catchup**: oldest-first processing of every loan behind the
//!   business date

pub mod catchup;
pub mod processor;
pub mod steps;

pub use catchup::{CatchUpFailure, CatchUpResult, CatchUpState, CatchUpStatus};
pub use processor::{advance_to_date, loan_cob_state, CobError, CobState, DayResult};
pub use steps::{
    ApplyOverduePenalty, BusinessStep, BusinessStepConfig, ConfiguredStep, RefreshObligations,
    StepConfigError, StepError, StepRegistry, APPLY_OVERDUE_PENALTY, COB_JOB, REFRESH_OBLIGATIONS,
};
