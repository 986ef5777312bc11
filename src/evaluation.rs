//! Per-goal evaluation bookkeeping.
//!
//! The evaluation is the run's audit trail: for each goal, the score
//! (zero when satisfied, minus the number of unresolved conflicts when
//! not) and the set of directives associated with the goal, split into
//! those the goal inserted itself (owned) and pre-existing directives it
//! merely claimed. Rollback uses the owned set to undo a failed goal's
//! edits.

use crate::models::{DirectiveId, GoalId};
use indexmap::IndexMap;

/// Evaluation record of one goal.
#[derive(Debug, Clone, Default)]
pub struct GoalEvaluation {
    score: i64,
    /// Directive id → whether the goal inserted it (vs. associated an
    /// existing one).
    directives: IndexMap<DirectiveId, bool>,
    /// Conflict count from the goal's first evaluation this run.
    conflicts_detected: Option<usize>,
}

impl GoalEvaluation {
    /// Associates a directive with the goal. `owned` marks directives the
    /// goal inserted itself; ownership, once recorded, is never downgraded.
    pub fn associate(&mut self, id: DirectiveId, owned: bool) {
        let entry = self.directives.entry(id).or_insert(owned);
        *entry = *entry || owned;
    }

    /// Directives the goal inserted this run.
    pub fn inserted(&self) -> Vec<DirectiveId> {
        self.directives
            .iter()
            .filter(|(_, owned)| **owned)
            .map(|(id, _)| *id)
            .collect()
    }

    /// All directives associated with the goal.
    pub fn associated(&self) -> Vec<DirectiveId> {
        self.directives.keys().copied().collect()
    }

    /// Drops every association (used by rollback).
    pub fn clear_associations(&mut self) {
        self.directives.clear();
    }

    /// Records the conflict count seen on the goal's first evaluation.
    /// Later calls are ignored so the figure reflects the original gap.
    pub fn record_conflicts_detected(&mut self, count: usize) {
        self.conflicts_detected.get_or_insert(count);
    }

    pub fn conflicts_detected(&self) -> Option<usize> {
        self.conflicts_detected
    }

    /// Zero when satisfied; `-n` when `n` conflicts remain unresolved.
    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn set_score(&mut self, score: i64) {
        self.score = score;
    }

    pub fn is_satisfied(&self) -> bool {
        self.score == 0
    }
}

/// Evaluation records for every goal touched by a run, in touch order.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    goals: IndexMap<GoalId, GoalEvaluation>,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// The goal's record, created empty on first touch.
    pub fn for_goal(&mut self, id: GoalId) -> &mut GoalEvaluation {
        self.goals.entry(id).or_default()
    }

    /// Read-only lookup.
    pub fn goal(&self, id: GoalId) -> Option<&GoalEvaluation> {
        self.goals.get(&id)
    }

    /// Iterates records in the order goals were touched.
    pub fn iter(&self) -> impl Iterator<Item = (GoalId, &GoalEvaluation)> {
        self.goals.iter().map(|(id, eval)| (*id, eval))
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_associate_and_ownership() {
        let mut eval = Evaluation::new();
        let goal = GoalId::fresh();
        let (a, b) = (DirectiveId::fresh(), DirectiveId::fresh());

        let record = eval.for_goal(goal);
        record.associate(a, true);
        record.associate(b, false);
        assert_eq!(record.inserted(), vec![a]);
        assert_eq!(record.associated(), vec![a, b]);

        // Ownership is sticky: re-associating as unowned does not demote.
        record.associate(a, false);
        assert_eq!(record.inserted(), vec![a]);
    }

    #[test]
    fn test_conflicts_detected_records_first_only() {
        let mut record = GoalEvaluation::default();
        record.record_conflicts_detected(3);
        record.record_conflicts_detected(1);
        assert_eq!(record.conflicts_detected(), Some(3));
    }

    #[test]
    fn test_score_and_satisfaction() {
        let mut record = GoalEvaluation::default();
        assert!(record.is_satisfied());
        record.set_score(-2);
        assert!(!record.is_satisfied());
        assert_eq!(record.score(), -2);
    }

    #[test]
    fn test_clear_associations() {
        let mut record = GoalEvaluation::default();
        record.associate(DirectiveId::fresh(), true);
        record.clear_associations();
        assert!(record.associated().is_empty());
        assert!(record.inserted().is_empty());
    }
}
