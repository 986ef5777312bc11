//! Simulation oracle contract and result types.
//!
//! The behavioral simulation engine is an external collaborator. The
//! scheduler consumes it through the narrow [`SimulationOracle`] trait:
//! "simulate this plan up to time T for these resources and hand back
//! profiles", plus a pass/fail duration check used to gate plan commits.
//!
//! The oracle must be **deterministic** for a fixed plan: the duration
//! resolver performs numerical root-finding against it, which is only
//! well-defined if repeated evaluation at the same start time yields the
//! same simulated duration.

use crate::models::{DirectiveId, Plan};
use crate::time::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by the simulation engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    /// The simulation could not execute the plan.
    #[error("simulation failed: {0}")]
    Failed(String),
    /// An activity could not be instantiated from its arguments.
    #[error("could not instantiate activity: {0}")]
    Instantiation(String),
}

/// A named time series produced by simulation or supplied externally.
///
/// Piecewise-constant: each sample holds from its instant until the next
/// sample's instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Profile {
    /// Real-valued resource profile.
    Real(Vec<(Duration, f64)>),
    /// Discrete-valued resource profile.
    Discrete(Vec<(Duration, Value)>),
}

impl Profile {
    /// Real value holding at instant `t`, if this is a real profile with a
    /// sample at or before `t`.
    pub fn real_at(&self, t: Duration) -> Option<f64> {
        match self {
            Profile::Real(samples) => samples
                .iter()
                .take_while(|(at, _)| *at <= t)
                .last()
                .map(|(_, v)| *v),
            Profile::Discrete(_) => None,
        }
    }

    /// The sample instants of this profile.
    pub fn sample_times(&self) -> Vec<Duration> {
        match self {
            Profile::Real(samples) => samples.iter().map(|(at, _)| *at).collect(),
            Profile::Discrete(samples) => samples.iter().map(|(at, _)| *at).collect(),
        }
    }
}

/// Results of one simulation request: resource profiles valid up to a time.
///
/// Cheap to clone; the profile map is shared. One scheduling run caches at
/// most one of these at a time, keyed by `(until, resource set)`.
#[derive(Debug, Clone)]
pub struct SimulationResults {
    /// Time up to which the profiles are valid.
    pub until: Duration,
    profiles: Arc<BTreeMap<String, Profile>>,
}

impl SimulationResults {
    /// Wraps a set of profiles valid up to `until`.
    pub fn new(until: Duration, profiles: BTreeMap<String, Profile>) -> Self {
        SimulationResults {
            until,
            profiles: Arc::new(profiles),
        }
    }

    /// Looks up a resource profile by name.
    pub fn profile(&self, resource: &str) -> Option<&Profile> {
        self.profiles.get(resource)
    }

    /// Names of the resources covered by these results.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

/// Named external time series (e.g. ground-station visibility) supplied
/// alongside simulation results for constraint evaluation.
#[derive(Debug, Clone, Default)]
pub struct ExternalProfiles {
    profiles: BTreeMap<String, Profile>,
}

impl ExternalProfiles {
    /// Creates an empty profile set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named profile.
    pub fn with_profile(mut self, name: impl Into<String>, profile: Profile) -> Self {
        self.profiles.insert(name.into(), profile);
        self
    }

    /// Looks up a profile by name.
    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }
}

/// The external behavioral simulation engine, seen as a black box.
///
/// `&mut self` because real engines keep incremental state between calls;
/// the scheduler never relies on that state, only on determinism.
pub trait SimulationOracle {
    /// Simulates `plan` up to `until`, returning profiles for exactly the
    /// requested resources.
    fn simulate(
        &mut self,
        plan: &Plan,
        until: Duration,
        resources: &BTreeSet<String>,
    ) -> Result<SimulationResults, SimulationError>;

    /// Simulates the whole plan and verifies that every directive with a
    /// predicted duration matches its simulated duration.
    ///
    /// This is the commit gate: a plan only becomes authoritative after
    /// this call succeeds.
    fn simulate_and_check_durations(&mut self, plan: &Plan) -> Result<(), SimulationError>;

    /// Simulates `plan` far enough to learn the duration of one directive.
    ///
    /// Returns `Ok(None)` when the simulation ran but the activity never
    /// finished (e.g. it overruns the horizon); the duration resolver
    /// treats that as a discontinuity.
    fn simulated_duration(
        &mut self,
        plan: &Plan,
        id: DirectiveId,
    ) -> Result<Option<Duration>, SimulationError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Table-driven oracle for solver tests.

    use super::*;

    /// How the stub computes an activity's duration from its absolute start.
    pub enum DurationRule {
        /// Duration independent of start time.
        Constant(Duration),
        /// Duration as a function of absolute start; `None` marks starts
        /// where simulation yields no duration (discontinuity).
        FromStart(fn(Duration) -> Option<Duration>),
    }

    /// Deterministic oracle driven by per-type duration rules.
    pub struct TableOracle {
        rules: BTreeMap<String, DurationRule>,
        failing_types: BTreeSet<String>,
        profiles: BTreeMap<String, Profile>,
        pub simulate_calls: usize,
        pub check_calls: usize,
    }

    impl TableOracle {
        pub fn new() -> Self {
            TableOracle {
                rules: BTreeMap::new(),
                failing_types: BTreeSet::new(),
                profiles: BTreeMap::new(),
                simulate_calls: 0,
                check_calls: 0,
            }
        }

        pub fn with_rule(mut self, type_name: &str, rule: DurationRule) -> Self {
            self.rules.insert(type_name.to_string(), rule);
            self
        }

        /// Any plan containing this type fails the commit gate.
        pub fn with_failing_type(mut self, type_name: &str) -> Self {
            self.failing_types.insert(type_name.to_string());
            self
        }

        pub fn with_profile(mut self, resource: &str, profile: Profile) -> Self {
            self.profiles.insert(resource.to_string(), profile);
            self
        }

        fn rule_duration(&self, type_name: &str, start: Duration) -> Option<Duration> {
            match self.rules.get(type_name)? {
                DurationRule::Constant(d) => Some(*d),
                DurationRule::FromStart(f) => f(start),
            }
        }
    }

    impl SimulationOracle for TableOracle {
        fn simulate(
            &mut self,
            _plan: &Plan,
            until: Duration,
            resources: &BTreeSet<String>,
        ) -> Result<SimulationResults, SimulationError> {
            self.simulate_calls += 1;
            let selected: BTreeMap<String, Profile> = self
                .profiles
                .iter()
                .filter(|(name, _)| resources.contains(*name))
                .map(|(name, p)| (name.clone(), p.clone()))
                .collect();
            Ok(SimulationResults::new(until, selected))
        }

        fn simulate_and_check_durations(&mut self, plan: &Plan) -> Result<(), SimulationError> {
            self.check_calls += 1;
            for directive in plan.directives() {
                if self.failing_types.contains(directive.type_name()) {
                    return Err(SimulationError::Failed(format!(
                        "activity type '{}' fails in simulation",
                        directive.type_name()
                    )));
                }
                let start = plan.absolute_start(directive.id()).ok_or_else(|| {
                    SimulationError::Failed("unresolvable anchor in plan".into())
                })?;
                if let Some(expected) = self.rule_duration(directive.type_name(), start) {
                    if let Some(declared) = directive.duration() {
                        if declared != expected {
                            return Err(SimulationError::Failed(format!(
                                "declared duration {declared} does not match simulated {expected}"
                            )));
                        }
                    }
                }
            }
            Ok(())
        }

        fn simulated_duration(
            &mut self,
            plan: &Plan,
            id: DirectiveId,
        ) -> Result<Option<Duration>, SimulationError> {
            self.simulate_calls += 1;
            let directive = plan
                .get(id)
                .ok_or_else(|| SimulationError::Failed("directive missing from plan".into()))?;
            if self.failing_types.contains(directive.type_name()) {
                return Err(SimulationError::Failed(format!(
                    "activity type '{}' fails in simulation",
                    directive.type_name()
                )));
            }
            let start = plan
                .absolute_start(id)
                .ok_or_else(|| SimulationError::Failed("unresolvable anchor in plan".into()))?;
            Ok(self.rule_duration(directive.type_name(), start))
        }
    }
}
