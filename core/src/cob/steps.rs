//! Business steps
//!
//! A business step is a named, day-scoped rule COB runs against each loan
//! (for example, charging a penalty on installments that fell overdue).
//! Steps are resolved by name from a registry at configuration time; which
//! steps run for a job, and in what order, is admin-mutable configuration.

use crate::models::account::LoanAccount;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// The COB job name
pub const COB_JOB: &str = "LOAN_CLOSE_OF_BUSINESS";

/// Built-in step names
pub const APPLY_OVERDUE_PENALTY: &str = "apply-overdue-penalty";
pub const REFRESH_OBLIGATIONS: &str = "refresh-obligations";

/// A business step failed for one loan on one day
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct StepError {
    message: String,
}

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A named, day-scoped rule applied to one loan
///
/// Implementations must be stateless with respect to the loan: everything
/// they need lives on the account or in the date. `Send + Sync` so catch-up
/// can run independent loans on a worker pool.
pub trait BusinessStep: Send + Sync {
    /// Registry name, unique per registry
    fn name(&self) -> &'static str;

    /// Run the step for `account` on business day `date`
    ///
    /// Returns whether any account state changed.
    fn execute(&self, account: &mut LoanAccount, date: NaiveDate) -> Result<bool, StepError>;
}

/// Charge the loan's flat overdue penalty on each installment that is past
/// due and unmet, at most once per installment
pub struct ApplyOverduePenalty;

impl BusinessStep for ApplyOverduePenalty {
    fn name(&self) -> &'static str {
        APPLY_OVERDUE_PENALTY
    }

    fn execute(&self, account: &mut LoanAccount, date: NaiveDate) -> Result<bool, StepError> {
        Ok(account.apply_overdue_penalties(date))
    }
}

/// Re-derive obligations-met flags and close fully repaid loans
pub struct RefreshObligations;

impl BusinessStep for RefreshObligations {
    fn name(&self) -> &'static str {
        REFRESH_OBLIGATIONS
    }

    fn execute(&self, account: &mut LoanAccount, _date: NaiveDate) -> Result<bool, StepError> {
        account
            .refresh_obligations_step()
            .map_err(|e| StepError::new(e.to_string()))
    }
}

/// Errors from step registration and job configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepConfigError {
    #[error("step '{0}' is already registered")]
    DuplicateStep(String),

    #[error("unknown business step '{0}'")]
    UnknownStep(String),

    #[error("a job needs at least one step")]
    EmptySteps,
}

/// Name-to-implementation registry of business steps
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<dyn BusinessStep>>,
}

impl StepRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in steps
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Built-in names are distinct; registration cannot fail here
        let _ = registry.register(Arc::new(ApplyOverduePenalty));
        let _ = registry.register(Arc::new(RefreshObligations));
        registry
    }

    /// Register a step under its own name
    pub fn register(&mut self, step: Arc<dyn BusinessStep>) -> Result<(), StepConfigError> {
        let name = step.name().to_string();
        if self.steps.contains_key(&name) {
            return Err(StepConfigError::DuplicateStep(name));
        }
        self.steps.insert(name, step);
        Ok(())
    }

    /// Resolve a step by name
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn BusinessStep>> {
        self.steps.get(name).cloned()
    }

    /// Registered step names (unordered)
    pub fn names(&self) -> Vec<&str> {
        self.steps.keys().map(String::as_str).collect()
    }
}

/// One configured step within a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfiguredStep {
    /// Dense 1-based execution order
    pub order: u32,
    pub name: String,
}

/// Per-job ordered step configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessStepConfig {
    jobs: HashMap<String, Vec<ConfiguredStep>>,
}

impl BusinessStepConfig {
    /// Default configuration: the COB job runs the built-in steps in order
    pub fn default_cob() -> Self {
        let mut jobs = HashMap::new();
        jobs.insert(
            COB_JOB.to_string(),
            vec![
                ConfiguredStep {
                    order: 1,
                    name: APPLY_OVERDUE_PENALTY.to_string(),
                },
                ConfiguredStep {
                    order: 2,
                    name: REFRESH_OBLIGATIONS.to_string(),
                },
            ],
        );
        Self { jobs }
    }

    /// Ordered steps configured for a job (empty if the job is unknown)
    pub fn steps_for(&self, job: &str) -> &[ConfiguredStep] {
        self.jobs.get(job).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace a job's step list (admin API)
    ///
    /// Every name must resolve in `registry`; order is re-densified to
    /// 1..=n in the given sequence.
    pub fn set_job_steps(
        &mut self,
        job: &str,
        names: Vec<String>,
        registry: &StepRegistry,
    ) -> Result<(), StepConfigError> {
        if names.is_empty() {
            return Err(StepConfigError::EmptySteps);
        }
        for name in &names {
            if registry.resolve(name).is_none() {
                return Err(StepConfigError::UnknownStep(name.clone()));
            }
        }
        let configured = names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| ConfiguredStep {
                order: idx as u32 + 1,
                name,
            })
            .collect();
        self.jobs.insert(job.to_string(), configured);
        Ok(())
    }
}
