//! The scheduling solver.
//!
//! [`PrioritySolver`] is the entry point: a single-shot, priority-ordered
//! greedy pass over a problem's goals. Supporting modules:
//!
//! - [`rootfind`]: secant search used to place simulation-duration
//!   activities
//! - `narrow`: temporal-window narrowing against resource constraints and
//!   global conditions
//! - `resolve`: per-duration-policy instantiation of activity templates
//! - `priority`: the satisfaction loop itself

pub mod rootfind;

mod narrow;
mod priority;
mod resolve;

pub use priority::{PrioritySolver, Solution};

use crate::error::SchedulingError;
use crate::evaluation::Evaluation;
use crate::models::{Plan, Problem};
use crate::sim::{SimulationOracle, SimulationResults};
use crate::time::Duration;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Cooperative cancellation handle.
///
/// Cloned freely; `cancel()` from any thread makes the run abort with
/// [`SchedulingError::Interrupted`] at its next poll point (before each
/// goal and before each simulation call).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Poll point: errors out when cancellation was requested.
    pub fn check(&self, activity: &str) -> Result<(), SchedulingError> {
        if self.is_cancelled() {
            Err(SchedulingError::Interrupted(activity.to_string()))
        } else {
            Ok(())
        }
    }
}

/// The one cached simulation of a run, keyed by what it covers.
struct CachedResults {
    until: Duration,
    resources: BTreeSet<String>,
    results: SimulationResults,
}

/// Mutable state threaded through one scheduling run.
pub(crate) struct SolverRun<'a, S: SimulationOracle> {
    pub(crate) problem: &'a Problem,
    pub(crate) oracle: &'a mut S,
    pub(crate) cancel: CancelToken,
    pub(crate) plan: Plan,
    pub(crate) evaluation: Evaluation,
    /// Whether plan commits are gated on a full simulation check.
    pub(crate) check_sim: bool,
    cache: Option<CachedResults>,
}

impl<'a, S: SimulationOracle> SolverRun<'a, S> {
    pub(crate) fn new(
        problem: &'a Problem,
        oracle: &'a mut S,
        cancel: CancelToken,
        check_sim: bool,
    ) -> Self {
        SolverRun {
            problem,
            oracle,
            cancel,
            plan: Plan::new(),
            evaluation: Evaluation::new(),
            check_sim,
            cache: None,
        }
    }

    /// Simulation results covering at least `[epoch, until]` and all of
    /// `resources`, reusing the cached results when they already do.
    pub(crate) fn results_covering(
        &mut self,
        until: Duration,
        resources: &BTreeSet<String>,
    ) -> Result<SimulationResults, SchedulingError> {
        if let Some(cached) = &self.cache {
            if cached.until >= until && resources.is_subset(&cached.resources) {
                trace!(%until, "reusing cached simulation results");
                return Ok(cached.results.clone());
            }
        }
        self.cancel.check("simulating plan")?;
        // Widen the request with whatever the cache held so the new results
        // strictly supersede it.
        let (want_until, want_resources) = match self.cache.take() {
            Some(cached) => (
                cached.until.max(until),
                cached.resources.union(resources).cloned().collect(),
            ),
            None => (until, resources.clone()),
        };
        let results = self
            .oracle
            .simulate(&self.plan, want_until, &want_resources)?;
        self.cache = Some(CachedResults {
            until: want_until,
            resources: want_resources,
            results: results.clone(),
        });
        Ok(results)
    }

    /// Drops cached simulation results; called on every plan change.
    pub(crate) fn invalidate_results(&mut self) {
        self.cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(token.check("working").is_ok());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            token.check("working"),
            Err(SchedulingError::Interrupted(_))
        ));
    }
}
