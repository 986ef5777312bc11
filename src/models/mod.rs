//! Core data model: directives, plans, activity types, goals, problems.

pub mod activity_type;
pub mod directive;
pub mod goal;
pub mod plan;
pub mod problem;

pub use activity_type::{
    duration_from_value, ActivityType, ActivityTypeRegistry, DurationFn, DurationPolicy,
    ParameterKind,
};
pub use directive::{Anchor, Directive, DirectiveId};
pub use goal::{ConflictSource, Goal, GoalId, GoalKind, Optimizer};
pub use plan::Plan;
pub use problem::{PlanningHorizon, Problem};
