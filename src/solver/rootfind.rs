//! Secant root-finding over simulated activity end times.
//!
//! Placing an activity whose duration only the simulation knows means
//! solving `f(start) = start + sim_duration(start)` for a start whose end
//! lands inside a feasible end window. The function is expensive (each
//! evaluation is a simulation), not differentiable in closed form, and may
//! be discontinuous where the simulation fails or the activity never
//! finishes. Hence a secant iteration with an explicit evaluation history
//! and bisection-style resampling around discontinuities.

use crate::models::Directive;
use crate::time::{Duration, Interval};
use thiserror::Error;
use tracing::debug;

/// Cap on secant iterations per placement attempt.
pub const MAX_ITERATIONS: usize = 20;

/// Retries when an evaluation lands on a discontinuity.
const MAX_RESAMPLES: usize = 10;

/// One evaluation of the function under search.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Evaluation point (candidate start time).
    pub x: Duration,
    /// Function value (simulated end time), `None` at a discontinuity.
    pub fx: Option<Duration>,
    /// Candidate directive the evaluation was performed with.
    pub directive: Option<Directive>,
}

/// Append-only record of every evaluation in one root-finding attempt.
///
/// The resolver reads the last successful sample off the history after a
/// converged search: that sample carries the directive (with its simulated
/// duration) that produced the accepted end time.
#[derive(Debug, Clone, Default)]
pub struct History {
    samples: Vec<Sample>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// The most recent sample that hit a defined function value.
    pub fn last_successful(&self) -> Option<&Sample> {
        self.samples.iter().rev().find(|s| s.fx.is_some())
    }

    /// Whether `x` has already been evaluated.
    pub fn visited(&self, x: Duration) -> bool {
        self.samples.iter().any(|s| s.x == x)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}

/// Marker for an evaluation point where the function has no value (the
/// simulation failed, or the activity never finished).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discontinuity;

/// The function under search. Implementations record every evaluation,
/// including discontinuities, into the supplied history.
pub trait SecantFunction {
    fn value_at(&mut self, x: Duration, history: &mut History)
        -> Result<Duration, Discontinuity>;
}

/// Failure modes of the secant search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RootFindingError {
    /// Two successive evaluations produced the same value; the secant step
    /// is undefined.
    #[error("zero derivative between successive samples")]
    ZeroDerivative,
    /// The derivative estimate blew up, or every resample around a
    /// discontinuity failed.
    #[error("infinite derivative or unrecoverable discontinuity")]
    InfiniteDerivative,
    /// An iterate left the feasible start domain.
    #[error("iteration diverged outside the feasible domain")]
    Divergence,
    /// No convergence within the iteration cap.
    #[error("exceeded maximum iterations")]
    ExceededMaxIterations,
    /// The seeds admit no search (both equal and off-target).
    #[error("no solution from the given seeds")]
    NoSolution,
}

/// Evaluates `f` at `x`, bisecting toward `fallback` when `x` lands on a
/// discontinuity.
fn evaluate_resampling<F: SecantFunction>(
    f: &mut F,
    history: &mut History,
    mut x: Duration,
    fallback: Duration,
) -> Result<(Duration, Duration), RootFindingError> {
    for _ in 0..=MAX_RESAMPLES {
        match f.value_at(x, history) {
            Ok(fx) => return Ok((x, fx)),
            Err(Discontinuity) => {
                let next = x.midpoint(fallback);
                if next == x {
                    break;
                }
                debug!(%x, resample = %next, "discontinuity, resampling");
                x = next;
            }
        }
    }
    Err(RootFindingError::InfiniteDerivative)
}

/// Secant search for `x` in `bounds` with `f(x)` within `tolerance` of
/// `target`.
///
/// Seeds `x0` and `x1` start the iteration; either seed already within
/// tolerance is returned without iterating. Every evaluation is recorded in
/// `history`, so callers can recover the directive behind the converged
/// sample.
pub fn secant<F: SecantFunction>(
    f: &mut F,
    history: &mut History,
    x0: Duration,
    x1: Duration,
    target: Duration,
    tolerance: Duration,
    bounds: Interval,
    max_iterations: usize,
) -> Result<Duration, RootFindingError> {
    if !bounds.contains(x0) || !bounds.contains(x1) {
        return Err(RootFindingError::Divergence);
    }

    let (x0, fx0) = evaluate_resampling(f, history, x0, x1)?;
    if (fx0 - target).abs() <= tolerance {
        return Ok(x0);
    }
    if x0 == x1 {
        return Err(RootFindingError::NoSolution);
    }
    let (x1, fx1) = evaluate_resampling(f, history, x1, x0)?;
    if (fx1 - target).abs() <= tolerance {
        return Ok(x1);
    }

    let (mut xa, mut fa) = (x0, fx0);
    let (mut xb, mut fb) = (x1, fx1);
    for iteration in 0..max_iterations {
        let derivative = (fb - fa).ticks() as f64 / (xb - xa).ticks() as f64;
        if derivative == 0.0 {
            return Err(RootFindingError::ZeroDerivative);
        }
        if !derivative.is_finite() {
            return Err(RootFindingError::InfiniteDerivative);
        }
        let step = (fb - target).ticks() as f64 / derivative;
        if !step.is_finite() {
            return Err(RootFindingError::InfiniteDerivative);
        }
        let x_next = Duration::of_ticks(xb.ticks() - step.round() as i64);
        if !bounds.contains(x_next) {
            debug!(iteration, %x_next, "secant iterate left the feasible domain");
            return Err(RootFindingError::Divergence);
        }
        let (x_next, f_next) = evaluate_resampling(f, history, x_next, xb)?;
        if (f_next - target).abs() <= tolerance {
            return Ok(x_next);
        }
        if x_next == xb {
            return Err(RootFindingError::ZeroDerivative);
        }
        xa = xb;
        fa = fb;
        xb = x_next;
        fb = f_next;
    }
    Err(RootFindingError::ExceededMaxIterations)
}
