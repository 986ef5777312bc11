//! Error taxonomy for the scheduling engine.
//!
//! Failure classes and their handling:
//! - **Interrupted**: cooperative cancellation, polled before each goal and
//!   each simulation call; aborts the whole run.
//! - **Simulation**: an oracle call failed; callers treat the candidate or
//!   window under consideration as infeasible and move on.
//! - **Plan / Invariant**: contract violations (duplicate ids, unknown
//!   activity types, impossible states); fatal, never absorbed.
//!
//! Root-finding failures have their own local error type in
//! [`crate::solver::rootfind`] because they never escape the duration
//! resolver.

use crate::models::DirectiveId;
use crate::sim::SimulationError;
use thiserror::Error;

/// Errors surfaced by plan mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// Two directives would share an id.
    #[error("duplicate directive id {0:?} in plan")]
    DuplicateDirective(DirectiveId),
    /// A directive id was expected to be present but is not.
    #[error("unknown directive id {0:?} in plan")]
    UnknownDirective(DirectiveId),
}

/// Top-level error type of a scheduling run.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// The run was cancelled at a poll point.
    #[error("scheduling interrupted while {0}")]
    Interrupted(String),

    /// A simulation oracle call failed.
    ///
    /// Only fatal when it escapes to the top level; the satisfaction loop
    /// catches this variant locally and records the goal as unsatisfied.
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// Plan bookkeeping violated an invariant.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// An activity type name was registered twice.
    #[error("duplicate activity type '{0}'")]
    DuplicateActivityType(String),

    /// An activity type name could not be resolved.
    #[error("unknown activity type '{0}'")]
    UnknownActivityType(String),

    /// A collaborator broke its contract; the run must halt.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl SchedulingError {
    /// Whether this error marks a locally recoverable simulation failure.
    pub fn is_simulation_failure(&self) -> bool {
        matches!(self, SchedulingError::Simulation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_errors_are_recoverable() {
        let err: SchedulingError = SimulationError::Failed("oops".into()).into();
        assert!(err.is_simulation_failure());
        assert!(!SchedulingError::Interrupted("goal".into()).is_simulation_failure());
    }

    #[test]
    fn test_error_display() {
        let err = SchedulingError::UnknownActivityType("Observe".into());
        assert_eq!(err.to_string(), "unknown activity type 'Observe'");
    }
}
