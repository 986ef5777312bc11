//! Goal hierarchy.
//!
//! A goal is a node in a tree: atomic goals yield conflicts directly
//! (through a [`ConflictSource`] the goal author supplies), AND-composites
//! require all children, OR-composites succeed on the first (or, with an
//! [`Optimizer`], the best-scoring) satisfied child. The goal kinds form
//! a closed enumeration so the scheduler's dispatch stays an exhaustive
//! match.

use crate::conflicts::Conflict;
use crate::constraints::ConstraintExpression;
use crate::models::directive::{Directive, DirectiveId};
use crate::models::plan::Plan;
use crate::sim::SimulationResults;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_GOAL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GoalId(u64);

impl GoalId {
    /// Allocates a fresh id.
    pub fn fresh() -> Self {
        GoalId(NEXT_GOAL_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// The capability an atomic goal provides: deciding what the current plan
/// is missing, given up-to-date simulation results.
pub trait ConflictSource: Send + Sync {
    /// Resource names the goal's expressions reference, used to scope
    /// simulation requests.
    fn resources(&self) -> BTreeSet<String>;

    /// Computes the conflicts between the goal and the current plan.
    ///
    /// `associated` lists the directives already credited to this goal; a
    /// source must not re-report a gap those directives close, or the
    /// satisfaction loop would never drain.
    fn conflicts(
        &self,
        plan: &Plan,
        associated: &[DirectiveId],
        results: &SimulationResults,
    ) -> Vec<Conflict>;
}

/// Comparator for optimizing OR-composites: decides whether a candidate
/// activity set beats the incumbent best.
pub trait Optimizer: Send + Sync {
    /// `incumbent` is empty when no child has been kept yet.
    fn is_better(&self, candidate: &[Directive], incumbent: &[Directive]) -> bool;
}

/// The closed set of goal kinds.
pub enum GoalKind {
    /// Directly yields conflicts.
    Atomic(Arc<dyn ConflictSource>),
    /// All children must succeed.
    And { children: Vec<Goal> },
    /// First (or, with an optimizer, best-scoring) satisfied child wins.
    Or {
        children: Vec<Goal>,
        optimizer: Option<Arc<dyn Optimizer>>,
    },
}

impl fmt::Debug for GoalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalKind::Atomic(_) => write!(f, "Atomic"),
            GoalKind::And { children } => write!(f, "And({} children)", children.len()),
            GoalKind::Or {
                children,
                optimizer,
            } => write!(
                f,
                "Or({} children{})",
                children.len(),
                if optimizer.is_some() {
                    ", optimizing"
                } else {
                    ""
                }
            ),
        }
    }
}

/// A prioritized scheduling goal.
pub struct Goal {
    id: GoalId,
    name: String,
    priority: i32,
    simulate_after: bool,
    rollback_on_failure: bool,
    maximize_satisfaction: bool,
    resource_constraints: Vec<Arc<dyn ConstraintExpression>>,
    kind: GoalKind,
}

impl fmt::Debug for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Goal")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Goal {
    fn with_kind(name: impl Into<String>, kind: GoalKind) -> Self {
        Goal {
            id: GoalId::fresh(),
            name: name.into(),
            priority: 0,
            simulate_after: false,
            rollback_on_failure: false,
            maximize_satisfaction: false,
            resource_constraints: Vec::new(),
            kind,
        }
    }

    /// Creates an atomic goal around a conflict source.
    pub fn atomic(name: impl Into<String>, source: Arc<dyn ConflictSource>) -> Self {
        Self::with_kind(name, GoalKind::Atomic(source))
    }

    /// Creates an AND-composite over children, satisfied in order.
    pub fn all_of(name: impl Into<String>, children: Vec<Goal>) -> Self {
        Self::with_kind(name, GoalKind::And { children })
    }

    /// Creates an OR-composite: children are tried in order, first success
    /// wins.
    pub fn one_of(name: impl Into<String>, children: Vec<Goal>) -> Self {
        Self::with_kind(
            name,
            GoalKind::Or {
                children,
                optimizer: None,
            },
        )
    }

    /// Creates an optimizing OR-composite: every child is trialed and
    /// rolled back, then the best per the optimizer is re-committed.
    pub fn best_of(
        name: impl Into<String>,
        children: Vec<Goal>,
        optimizer: Arc<dyn Optimizer>,
    ) -> Self {
        Self::with_kind(
            name,
            GoalKind::Or {
                children,
                optimizer: Some(optimizer),
            },
        )
    }

    /// Sets the queue priority (higher first).
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Requests a fresh simulation after this goal is processed.
    pub fn with_simulate_after(mut self) -> Self {
        self.simulate_after = true;
        self
    }

    /// Rolls the goal's edits back when it ends up unsatisfied.
    pub fn with_rollback_on_failure(mut self) -> Self {
        self.rollback_on_failure = true;
        self
    }

    /// Keeps partial progress: composites continue past failed children,
    /// atomic goals keep whatever conflicts they managed to resolve.
    pub fn with_maximize_satisfaction(mut self) -> Self {
        self.maximize_satisfaction = true;
        self
    }

    /// Adds a resource constraint applied when placing activities for
    /// this goal.
    pub fn with_resource_constraint(mut self, constraint: Arc<dyn ConstraintExpression>) -> Self {
        self.resource_constraints.push(constraint);
        self
    }

    pub fn id(&self) -> GoalId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn simulate_after(&self) -> bool {
        self.simulate_after
    }

    pub fn rollback_on_failure(&self) -> bool {
        self.rollback_on_failure
    }

    pub fn maximize_satisfaction(&self) -> bool {
        self.maximize_satisfaction
    }

    pub fn resource_constraints(&self) -> &[Arc<dyn ConstraintExpression>] {
        &self.resource_constraints
    }

    pub fn kind(&self) -> &GoalKind {
        &self.kind
    }
}
