//! Priority-ordered greedy scheduling for activity plans.
//!
//! Satisfies a queue of prioritized goals against an activity plan, one
//! greedy pass, gating every plan edit on a behavioral simulation of the
//! candidate plan. Higher-priority goals never yield resources to
//! lower-priority ones; within a goal, conflicts are repaired by inserting,
//! re-timing, or claiming activity directives inside simulation-narrowed
//! temporal windows.
//!
//! # Modules
//!
//! - **`models`**: directives, plans, activity types, goals, problems
//! - **`conflicts`**: the closed taxonomy of plan/goal gaps
//! - **`constraints`**: resource constraints and plan-wide conditions
//! - **`sim`**: the simulation oracle contract and its result types
//! - **`solver`**: the greedy pass, window narrowing, duration resolution,
//!   and the secant root-finder behind simulation-known durations
//! - **`evaluation`**: per-goal scores and directive associations
//! - **`grounding`**: anchor chains to absolute start times
//!
//! # References
//!
//! - Chien et al. (2012), "Timeline-Based Space Operations Scheduling"
//! - Press et al. (2007), "Numerical Recipes", §9.2 (secant method)

pub mod conflicts;
pub mod constraints;
pub mod error;
pub mod evaluation;
pub mod grounding;
pub mod models;
pub mod sim;
pub mod solver;
pub mod time;

pub use error::{PlanError, SchedulingError};
pub use solver::{CancelToken, PrioritySolver, Solution};
