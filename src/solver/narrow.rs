//! Temporal-window narrowing.
//!
//! Before placing an activity, a conflict's temporal context is shrunk
//! twice: first against the applicable resource constraints (goal-level
//! plus the activity type's own), then against the problem's global
//! conditions. Each pass simulates exactly the union span of the incoming
//! windows for exactly the referenced resources, and intersects
//! per-constraint with a short-circuit as soon as the windows go empty.

use crate::constraints::ConstraintExpression;
use crate::error::SchedulingError;
use crate::sim::SimulationOracle;
use crate::time::Windows;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::trace;

use super::SolverRun;

impl<S: SimulationOracle> SolverRun<'_, S> {
    /// Intersects `windows` with the holding windows of every constraint.
    pub(crate) fn narrow_by_resource_constraints(
        &mut self,
        windows: &Windows,
        constraints: &[Arc<dyn ConstraintExpression>],
    ) -> Result<Windows, SchedulingError> {
        let domain = match windows.span() {
            Some(span) if !constraints.is_empty() => span,
            _ => return Ok(windows.clone()),
        };
        let resources: BTreeSet<String> = constraints
            .iter()
            .flat_map(|c| c.resources())
            .collect();
        let results = self.results_covering(domain.end, &resources)?;

        let mut narrowed = windows.clone();
        for constraint in constraints {
            let holds = constraint.evaluate(&results, domain, self.problem.external_profiles());
            narrowed = narrowed.intersect(&holds);
            trace!(remaining = narrowed.len(), "narrowed by resource constraint");
            if narrowed.is_empty() {
                break;
            }
        }
        Ok(narrowed)
    }

    /// Applies every global condition to the candidate windows for placing
    /// an instance of `activity_type`.
    pub(crate) fn narrow_by_global_conditions(
        &mut self,
        windows: &Windows,
        activity_type: &str,
    ) -> Result<Windows, SchedulingError> {
        let conditions = self.problem.global_conditions();
        let domain = match windows.span() {
            Some(span) if !conditions.is_empty() => span,
            _ => return Ok(windows.clone()),
        };
        let resources: BTreeSet<String> = conditions
            .iter()
            .flat_map(|c| c.resources())
            .collect();
        let results = self.results_covering(domain.end, &resources)?;

        let mut narrowed = windows.clone();
        for condition in self.problem.global_conditions() {
            narrowed = condition.narrow(&self.plan, activity_type, &narrowed, &results);
            trace!(remaining = narrowed.len(), "narrowed by global condition");
            if narrowed.is_empty() {
                break;
            }
        }
        Ok(narrowed)
    }
}
