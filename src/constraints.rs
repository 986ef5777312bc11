//! Resource constraints and global scheduling conditions.
//!
//! A [`ConstraintExpression`] maps simulation results over a time domain to
//! the [`Windows`] in which the constraint holds; the window-narrowing pass
//! intersects these to shrink a conflict's temporal context. A
//! [`GlobalCondition`] is a plan-wide rule, applied in a second narrowing
//! pass, that may depend on the plan itself (e.g. mutual exclusion between
//! activity types).

use crate::models::plan::Plan;
use crate::sim::{ExternalProfiles, Profile, SimulationResults};
use crate::time::{Duration, Interval, Windows};
use std::collections::BTreeSet;

/// A predicate over simulated (or external) resource profiles.
pub trait ConstraintExpression: Send + Sync {
    /// Names of the resources the expression reads.
    fn resources(&self) -> BTreeSet<String>;

    /// Evaluates the expression over `domain`, returning the windows within
    /// it where the constraint holds.
    ///
    /// `results` is guaranteed to cover `domain` and every resource named
    /// by [`resources`](Self::resources); `external` supplies profiles the
    /// simulation does not produce.
    fn evaluate(
        &self,
        results: &SimulationResults,
        domain: Interval,
        external: &ExternalProfiles,
    ) -> Windows;
}

/// A plan-wide condition applied after per-goal resource constraints.
///
/// Unlike a [`ConstraintExpression`], a global condition sees the plan and
/// the activity type being placed, so it can express rules such as mutual
/// exclusion between types.
pub trait GlobalCondition: Send + Sync {
    /// Resources the condition reads, if any.
    fn resources(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Narrows the candidate windows for placing an instance of
    /// `activity_type`; the result must be a subset of `windows`.
    fn narrow(
        &self,
        plan: &Plan,
        activity_type: &str,
        windows: &Windows,
        results: &SimulationResults,
    ) -> Windows;
}

/// Holds wherever a real-valued resource stays at or above a floor.
#[derive(Debug, Clone)]
pub struct ThresholdConstraint {
    resource: String,
    min: f64,
}

impl ThresholdConstraint {
    pub fn new(resource: impl Into<String>, min: f64) -> Self {
        ThresholdConstraint {
            resource: resource.into(),
            min,
        }
    }
}

impl ConstraintExpression for ThresholdConstraint {
    fn resources(&self) -> BTreeSet<String> {
        [self.resource.clone()].into_iter().collect()
    }

    fn evaluate(
        &self,
        results: &SimulationResults,
        domain: Interval,
        external: &ExternalProfiles,
    ) -> Windows {
        let profile = match results
            .profile(&self.resource)
            .or_else(|| external.get(&self.resource))
        {
            Some(p) => p,
            None => return Windows::empty(),
        };
        windows_above(profile, self.min, domain)
    }
}

/// Windows within `domain` where a piecewise-constant real profile is at or
/// above `min`.
fn windows_above(profile: &Profile, min: f64, domain: Interval) -> Windows {
    let sample_times = profile.sample_times();
    let mut windows = Windows::empty();
    for (i, at) in sample_times.iter().enumerate() {
        let value = match profile.real_at(*at) {
            Some(v) => v,
            None => return Windows::empty(),
        };
        if value < min {
            continue;
        }
        // The sample's value holds up to (and excluding) the next sample.
        let seg_end = sample_times
            .get(i + 1)
            .map(|next| *next - Duration::of_ticks(1))
            .unwrap_or(domain.end);
        let seg_start = (*at).max(domain.start);
        let seg_end = seg_end.min(domain.end);
        if seg_start <= seg_end {
            windows.add(Interval::between(seg_start, seg_end));
        }
    }
    windows
}

/// Mutual exclusion between two activity types: an instance of either type
/// may not start while an instance of the other is in progress.
#[derive(Debug, Clone)]
pub struct MutexCondition {
    type_a: String,
    type_b: String,
}

impl MutexCondition {
    pub fn new(type_a: impl Into<String>, type_b: impl Into<String>) -> Self {
        MutexCondition {
            type_a: type_a.into(),
            type_b: type_b.into(),
        }
    }

    fn other_type(&self, activity_type: &str) -> Option<&str> {
        if activity_type == self.type_a {
            Some(&self.type_b)
        } else if activity_type == self.type_b {
            Some(&self.type_a)
        } else {
            None
        }
    }
}

impl GlobalCondition for MutexCondition {
    fn narrow(
        &self,
        plan: &Plan,
        activity_type: &str,
        windows: &Windows,
        _results: &SimulationResults,
    ) -> Windows {
        let other = match self.other_type(activity_type) {
            Some(t) => t,
            None => return windows.clone(),
        };
        let occupied: Windows = plan
            .directives_of_type(other)
            .into_iter()
            .filter_map(|d| {
                let start = plan.absolute_start(d.id())?;
                let duration = d.duration()?;
                Some(Interval::between(start, start + duration))
            })
            .collect();
        windows.subtract(&occupied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::directive::Directive;
    use std::collections::BTreeMap;

    fn iv(a: i64, b: i64) -> Interval {
        Interval::between(Duration::of_ticks(a), Duration::of_ticks(b))
    }

    fn battery_results() -> SimulationResults {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "battery".to_string(),
            Profile::Real(vec![
                (Duration::of_ticks(0), 80.0),
                (Duration::of_ticks(10), 20.0),
                (Duration::of_ticks(30), 60.0),
            ]),
        );
        SimulationResults::new(Duration::of_ticks(100), profiles)
    }

    #[test]
    fn test_threshold_constraint() {
        let c = ThresholdConstraint::new("battery", 50.0);
        let w = c.evaluate(&battery_results(), iv(0, 100), &ExternalProfiles::new());
        let expected: Windows = [iv(0, 9), iv(30, 100)].into_iter().collect();
        assert_eq!(w, expected);
    }

    #[test]
    fn test_threshold_clips_to_domain() {
        let c = ThresholdConstraint::new("battery", 50.0);
        let w = c.evaluate(&battery_results(), iv(5, 40), &ExternalProfiles::new());
        let expected: Windows = [iv(5, 9), iv(30, 40)].into_iter().collect();
        assert_eq!(w, expected);
    }

    #[test]
    fn test_threshold_missing_resource_is_empty() {
        let c = ThresholdConstraint::new("heater", 0.0);
        let w = c.evaluate(&battery_results(), iv(0, 100), &ExternalProfiles::new());
        assert!(w.is_empty());
    }

    #[test]
    fn test_threshold_reads_external_profile() {
        let empty = SimulationResults::new(Duration::of_ticks(100), BTreeMap::new());
        let ext = ExternalProfiles::new().with_profile(
            "visibility",
            Profile::Real(vec![
                (Duration::of_ticks(0), 0.0),
                (Duration::of_ticks(40), 1.0),
            ]),
        );
        let c = ThresholdConstraint::new("visibility", 1.0);
        let w = c.evaluate(&empty, iv(0, 100), &ext);
        let expected: Windows = [iv(40, 100)].into_iter().collect();
        assert_eq!(w, expected);
    }

    #[test]
    fn test_mutex_condition_subtracts_other_type() {
        let mut plan = Plan::new();
        plan.add(
            Directive::new("Downlink", Duration::of_ticks(20))
                .with_duration(Duration::of_ticks(10)),
        )
        .unwrap();
        let cond = MutexCondition::new("Observe", "Downlink");
        let input: Windows = [iv(0, 100)].into_iter().collect();
        let results = SimulationResults::new(Duration::of_ticks(100), BTreeMap::new());

        let narrowed = cond.narrow(&plan, "Observe", &input, &results);
        let expected: Windows = [iv(0, 19), iv(31, 100)].into_iter().collect();
        assert_eq!(narrowed, expected);

        // Unrelated types pass through unchanged.
        let untouched = cond.narrow(&plan, "Slew", &input, &results);
        assert_eq!(untouched, input);
    }
}
