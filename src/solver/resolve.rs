//! Activity instantiation: from template plus narrowed windows to a
//! concrete directive.
//!
//! Each duration policy has its own placement rule. Fixed, controllable
//! and parametric durations are resolved arithmetically against the
//! candidate window and the horizon. Uncontrollable durations, known only
//! to the simulation, are resolved by secant search over candidate start
//! times (see [`super::rootfind`]): the search targets the midpoint of the
//! feasible end domain with a tolerance of its half-width, so any start
//! whose simulated end lands inside the domain is accepted.

use crate::conflicts::ActivityTemplate;
use crate::error::SchedulingError;
use crate::models::{
    duration_from_value, ActivityType, Directive, DurationPolicy, Plan,
};
use crate::sim::SimulationOracle;
use crate::time::{Duration, Interval, Windows};
use tracing::debug;

use super::rootfind::{
    secant, Discontinuity, History, Sample, SecantFunction, MAX_ITERATIONS,
};
use super::{CancelToken, SolverRun};

/// Secant function for one uncontrollable-duration placement: maps a
/// candidate start to its simulated end time against a fixed base plan.
struct DurationProbe<'p, S: SimulationOracle> {
    base: Plan,
    template: ActivityTemplate,
    oracle: &'p mut S,
    cancel: CancelToken,
    /// Set when an evaluation was aborted by cancellation rather than by a
    /// genuine discontinuity.
    cancelled: bool,
}

impl<S: SimulationOracle> SecantFunction for DurationProbe<'_, S> {
    fn value_at(
        &mut self,
        x: Duration,
        history: &mut History,
    ) -> Result<Duration, Discontinuity> {
        if self.cancel.is_cancelled() {
            self.cancelled = true;
            return Err(Discontinuity);
        }
        let candidate = Directive::new(self.template.type_name(), x)
            .with_arguments(self.template.arguments().clone());
        let mut trial = self.base.duplicate();
        if trial.add(candidate.clone()).is_err() {
            return Err(Discontinuity);
        }
        match self.oracle.simulated_duration(&trial, candidate.id()) {
            Ok(Some(duration)) => {
                let end = x + duration;
                history.push(Sample {
                    x,
                    fx: Some(end),
                    directive: Some(candidate.with_duration(duration)),
                });
                Ok(end)
            }
            Ok(None) => {
                history.push(Sample {
                    x,
                    fx: None,
                    directive: None,
                });
                Err(Discontinuity)
            }
            Err(err) => {
                debug!(%x, error = %err, "simulation failed while probing duration");
                history.push(Sample {
                    x,
                    fx: None,
                    directive: None,
                });
                Err(Discontinuity)
            }
        }
    }
}

impl<S: SimulationOracle> SolverRun<'_, S> {
    /// Instantiates `template` somewhere in `windows`, trying the windows
    /// in ascending order. `Ok(None)` means no window admits a placement.
    pub(crate) fn create_activity(
        &mut self,
        template: &ActivityTemplate,
        windows: &Windows,
    ) -> Result<Option<Directive>, SchedulingError> {
        let activity_type = self.problem.registry().lookup(template.type_name())?;
        for window in windows.iter() {
            let placed = match activity_type.duration_policy() {
                DurationPolicy::Fixed(d) => self.place_fixed(template, window, *d),
                DurationPolicy::Controllable {
                    min,
                    max,
                    parameter,
                } => self.place_controllable(template, window, *min, *max, parameter),
                DurationPolicy::Parametric(f) => {
                    let duration = match f(template.arguments()) {
                        Some(d) if !d.is_negative() => d,
                        _ => return Ok(None),
                    };
                    self.place_fixed(template, window, duration)
                }
                DurationPolicy::Uncontrollable => {
                    self.place_uncontrollable(template, &activity_type, window)?
                }
            };
            if let Some(directive) = placed {
                return Ok(Some(self.apply_template_anchor(template, directive)));
            }
        }
        Ok(None)
    }

    /// Re-times a fully specified instance into `windows`, preferring its
    /// own start when still admissible.
    pub(crate) fn place_instance(
        &self,
        instance: &Directive,
        windows: &Windows,
    ) -> Option<Directive> {
        let horizon = self.problem.horizon();
        let fits = |start: Duration| match instance.duration() {
            Some(d) => horizon.fits(start, d),
            None => horizon.interval().contains(start),
        };
        if windows.contains(instance.start_offset()) && fits(instance.start_offset()) {
            return Some(instance.clone());
        }
        windows
            .iter()
            .find(|iv| fits(iv.start))
            .map(|iv| instance.clone().with_start_offset(iv.start))
    }

    fn place_fixed(
        &self,
        template: &ActivityTemplate,
        window: Interval,
        duration: Duration,
    ) -> Option<Directive> {
        let start = window.start;
        if !self.problem.horizon().fits(start, duration) {
            return None;
        }
        Some(
            Directive::new(template.type_name(), start)
                .with_arguments(template.arguments().clone())
                .with_duration(duration),
        )
    }

    fn place_controllable(
        &self,
        template: &ActivityTemplate,
        window: Interval,
        min: Duration,
        max: Duration,
        parameter: &str,
    ) -> Option<Directive> {
        let horizon = self.problem.horizon();
        let start = window.start;
        let duration = match template.arguments().get(parameter) {
            // Explicit duration argument: honor it or fail.
            Some(value) => {
                let d = duration_from_value(value)?;
                if d < min || d > max {
                    return None;
                }
                d
            }
            // Otherwise fill as much of the window as the policy allows.
            None => {
                let available = window.duration().min(horizon.end() - start);
                let d = available.min(max);
                if d < min {
                    return None;
                }
                d
            }
        };
        if !horizon.fits(start, duration) {
            return None;
        }
        Some(
            Directive::new(template.type_name(), start)
                .with_arguments(template.arguments().clone())
                .with_argument(parameter, duration.ticks().into())
                .with_duration(duration),
        )
    }

    fn place_uncontrollable(
        &mut self,
        template: &ActivityTemplate,
        activity_type: &ActivityType,
        window: Interval,
    ) -> Result<Option<Directive>, SchedulingError> {
        let horizon = self.problem.horizon();
        if window.start > horizon.end() {
            return Ok(None);
        }
        // Any simulated end inside [window.start, horizon end] is
        // acceptable: aim at the midpoint with half the width as tolerance.
        let end_domain = Interval::between(window.start, horizon.end());
        let target = end_domain.start.midpoint(end_domain.end);
        let tolerance = target - end_domain.start;

        let mut probe = DurationProbe {
            base: self.plan.duplicate(),
            template: template.clone(),
            oracle: &mut *self.oracle,
            cancel: self.cancel.clone(),
            cancelled: false,
        };
        let mut history = History::new();
        let outcome = secant(
            &mut probe,
            &mut history,
            window.start,
            window.end,
            target,
            tolerance,
            window,
            MAX_ITERATIONS,
        );
        if probe.cancelled {
            return Err(SchedulingError::Interrupted(format!(
                "placing '{}'",
                activity_type.name()
            )));
        }
        match outcome {
            Ok(root) => {
                let directive = history
                    .last_successful()
                    .and_then(|sample| sample.directive.clone())
                    .ok_or_else(|| {
                        SchedulingError::Invariant(
                            "converged root-finding left no successful sample".to_string(),
                        )
                    })?;
                debug!(
                    activity_type = activity_type.name(),
                    start = %root,
                    evaluations = history.len(),
                    "placed uncontrollable-duration activity"
                );
                Ok(Some(directive))
            }
            Err(err) => {
                debug!(
                    activity_type = activity_type.name(),
                    window = %window,
                    evaluations = history.len(),
                    error = %err,
                    "root-finding failed in window"
                );
                Ok(None)
            }
        }
    }

    /// Rewrites an epoch-relative placement as an anchored one when the
    /// template demands an anchor.
    fn apply_template_anchor(
        &self,
        template: &ActivityTemplate,
        directive: Directive,
    ) -> Directive {
        let anchor = match template.anchor() {
            Some(a) => a,
            None => return directive,
        };
        match self.plan.anchor_base(anchor) {
            Some(base) => {
                let offset = directive.start_offset() - base;
                directive.anchored_to(anchor.target, anchor.to_start, offset)
            }
            // Unresolvable target: keep the absolute placement.
            None => directive,
        }
    }
}
