//! Problem statement: everything a scheduling run needs as input.

use crate::constraints::GlobalCondition;
use crate::models::activity_type::ActivityTypeRegistry;
use crate::models::goal::Goal;
use crate::models::plan::Plan;
use crate::sim::ExternalProfiles;
use crate::time::{Duration, Interval};
use std::fmt;
use std::sync::Arc;

/// The closed time span a run may schedule within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanningHorizon {
    start: Duration,
    end: Duration,
}

impl PlanningHorizon {
    /// Creates a horizon spanning `[start, end]`.
    ///
    /// # Panics
    /// Panics if `start > end`.
    pub fn new(start: Duration, end: Duration) -> Self {
        assert!(start <= end, "horizon start must not exceed end");
        PlanningHorizon { start, end }
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Duration {
        self.end
    }

    /// The horizon as a closed interval.
    pub fn interval(&self) -> Interval {
        Interval::between(self.start, self.end)
    }

    /// Whether an activity spanning `[start, start + duration]` fits
    /// entirely within the horizon.
    pub fn fits(&self, start: Duration, duration: Duration) -> bool {
        self.start <= start && start + duration <= self.end
    }
}

/// A complete scheduling problem: type catalog, goals, horizon, global
/// conditions, external profiles, and the initial plan.
pub struct Problem {
    registry: ActivityTypeRegistry,
    goals: Vec<Goal>,
    horizon: PlanningHorizon,
    global_conditions: Vec<Arc<dyn GlobalCondition>>,
    external_profiles: ExternalProfiles,
    initial_plan: Plan,
}

impl fmt::Debug for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Problem")
            .field("activity_types", &self.registry.len())
            .field("goals", &self.goals.len())
            .field("horizon", &self.horizon)
            .field("global_conditions", &self.global_conditions.len())
            .field("initial_plan_len", &self.initial_plan.len())
            .finish()
    }
}

impl Problem {
    /// Creates a problem over the given horizon with an empty initial plan.
    pub fn new(registry: ActivityTypeRegistry, horizon: PlanningHorizon) -> Self {
        Problem {
            registry,
            goals: Vec::new(),
            horizon,
            global_conditions: Vec::new(),
            external_profiles: ExternalProfiles::new(),
            initial_plan: Plan::new(),
        }
    }

    /// Adds a goal; queue order among equal priorities is addition order.
    pub fn with_goal(mut self, goal: Goal) -> Self {
        self.goals.push(goal);
        self
    }

    /// Adds a plan-wide condition.
    pub fn with_global_condition(mut self, condition: Arc<dyn GlobalCondition>) -> Self {
        self.global_conditions.push(condition);
        self
    }

    /// Supplies profiles the simulation does not produce.
    pub fn with_external_profiles(mut self, profiles: ExternalProfiles) -> Self {
        self.external_profiles = profiles;
        self
    }

    /// Seeds the run with an initial plan.
    pub fn with_initial_plan(mut self, plan: Plan) -> Self {
        self.initial_plan = plan;
        self
    }

    pub fn registry(&self) -> &ActivityTypeRegistry {
        &self.registry
    }

    pub fn goals(&self) -> &[Goal] {
        &self.goals
    }

    pub fn horizon(&self) -> PlanningHorizon {
        self.horizon
    }

    pub fn global_conditions(&self) -> &[Arc<dyn GlobalCondition>] {
        &self.global_conditions
    }

    pub fn external_profiles(&self) -> &ExternalProfiles {
        &self.external_profiles
    }

    pub fn initial_plan(&self) -> &Plan {
        &self.initial_plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizon_fits() {
        let h = PlanningHorizon::new(Duration::ZERO, Duration::from_secs(100));
        assert!(h.fits(Duration::from_secs(90), Duration::from_secs(10)));
        assert!(!h.fits(Duration::from_secs(95), Duration::from_secs(10)));
        assert!(!h.fits(-Duration::from_secs(1), Duration::ZERO));
    }

    #[test]
    #[should_panic(expected = "horizon start")]
    fn test_horizon_rejects_inverted_bounds() {
        let _ = PlanningHorizon::new(Duration::from_secs(1), Duration::ZERO);
    }
}
