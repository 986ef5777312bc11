//! Priority-ordered greedy satisfaction.
//!
//! One run walks the goal queue once, highest priority first (ties in
//! declaration order), and commits repairs greedily: higher-priority goals
//! never yield resources to lower-priority ones. Every plan edit passes
//! through a single commit gate (duplicate the plan, add the candidate
//! directives, re-simulate, then either swap the duplicate in or discard
//! it whole), so the authoritative plan is only ever replaced by a
//! simulation-verified successor.

use crate::conflicts::{ActivityTemplate, Conflict};
use crate::constraints::ConstraintExpression;
use crate::error::SchedulingError;
use crate::evaluation::Evaluation;
use crate::models::{
    Anchor, ConflictSource, Directive, DirectiveId, Goal, GoalId, GoalKind, Optimizer, Plan,
    Problem,
};
use crate::sim::SimulationOracle;
use crate::time::Windows;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{CancelToken, SolverRun};

/// Output of one scheduling run.
#[derive(Debug)]
pub struct Solution {
    pub plan: Plan,
    pub evaluation: Evaluation,
}

/// Single-shot priority scheduler over a [`Problem`].
pub struct PrioritySolver<'a, S: SimulationOracle> {
    problem: &'a Problem,
    oracle: &'a mut S,
    cancel: CancelToken,
    check_sim_before_insert: bool,
    solved: bool,
}

impl<'a, S: SimulationOracle> PrioritySolver<'a, S> {
    pub fn new(problem: &'a Problem, oracle: &'a mut S) -> Self {
        PrioritySolver {
            problem,
            oracle,
            cancel: CancelToken::new(),
            check_sim_before_insert: true,
            solved: false,
        }
    }

    /// Disables the simulation commit gate. Placements are then committed
    /// on arithmetic checks alone; intended for problems whose durations
    /// are all statically known.
    pub fn without_simulation_gate(mut self) -> Self {
        self.check_sim_before_insert = false;
        self
    }

    /// Handle for cancelling the run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Runs the greedy pass. The solver is single-shot: the first call
    /// produces the solution, every later call returns `None`.
    pub fn next_solution(&mut self) -> Result<Option<Solution>, SchedulingError> {
        if self.solved {
            return Ok(None);
        }
        self.solved = true;
        let mut run = SolverRun::new(
            self.problem,
            &mut *self.oracle,
            self.cancel.clone(),
            self.check_sim_before_insert,
        );
        initialize_plan(&mut run)?;
        solve(&mut run)?;
        Ok(Some(Solution {
            plan: run.plan,
            evaluation: run.evaluation,
        }))
    }
}

/// Copies the initial plan into the run, skipping directives that lie
/// outside the horizon. Intake is not gated on simulation: the initial
/// plan is taken as given.
fn initialize_plan<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
) -> Result<(), SchedulingError> {
    let horizon = run.problem.horizon();
    for directive in run.problem.initial_plan().directives() {
        let keep = match directive.end_offset() {
            Some(end) => horizon.start() <= directive.start_offset() && end <= horizon.end(),
            None => {
                directive.anchor().is_some()
                    || horizon.interval().contains(directive.start_offset())
            }
        };
        if !keep {
            warn!(
                id = directive.id().value(),
                type_name = directive.type_name(),
                "initial-plan directive lies outside the horizon, skipping"
            );
            continue;
        }
        run.plan.add(directive.clone().pre_existing())?;
    }
    Ok(())
}

fn solve<S: SimulationOracle>(run: &mut SolverRun<'_, S>) -> Result<(), SchedulingError> {
    let mut queue: Vec<&Goal> = run.problem.goals().iter().collect();
    // Stable sort: equal priorities keep declaration order.
    queue.sort_by_key(|goal| Reverse(goal.priority()));

    for goal in queue {
        run.cancel.check(&format!("goal '{}'", goal.name()))?;
        let satisfied = satisfy_goal(run, goal)?;
        debug!(
            goal = goal.name(),
            priority = goal.priority(),
            satisfied,
            "processed goal"
        );
        if goal.simulate_after() {
            run.invalidate_results();
        }
    }
    log_summary(run);
    Ok(())
}

/// Dispatches on the goal kind, absorbing simulation failures as "goal
/// unsatisfied" instead of aborting the run.
fn satisfy_goal<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
) -> Result<bool, SchedulingError> {
    let outcome = match goal.kind() {
        GoalKind::Atomic(source) => satisfy_atomic(run, goal, source),
        GoalKind::And { children } => satisfy_and(run, goal, children),
        GoalKind::Or {
            children,
            optimizer: None,
        } => satisfy_or(run, goal, children),
        GoalKind::Or {
            children,
            optimizer: Some(optimizer),
        } => satisfy_or_optimizing(run, goal, children, optimizer),
    };
    match outcome {
        Err(err) if err.is_simulation_failure() => {
            warn!(goal = goal.name(), error = %err, "goal abandoned on simulation failure");
            if goal.rollback_on_failure() {
                rollback(run, goal.id());
            } else {
                let record = run.evaluation.for_goal(goal.id());
                let count = record.conflicts_detected().unwrap_or(1);
                record.set_score(-(count as i64));
            }
            Ok(false)
        }
        other => other,
    }
}

fn compute_conflicts<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    source: &Arc<dyn ConflictSource>,
    resources: &BTreeSet<String>,
) -> Result<Vec<Conflict>, SchedulingError> {
    let associated = run.evaluation.for_goal(goal.id()).associated();
    let results = run.results_covering(run.problem.horizon().end(), resources)?;
    Ok(source.conflicts(&run.plan, &associated, &results))
}

fn satisfy_atomic<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    source: &Arc<dyn ConflictSource>,
) -> Result<bool, SchedulingError> {
    let resources = source.resources();
    let mut conflicts = compute_conflicts(run, goal, source, &resources)?;
    run.evaluation
        .for_goal(goal.id())
        .record_conflicts_detected(conflicts.len());

    // Greedy drain: keep resolving and re-deriving conflicts until the
    // goal is satisfied or a full pass makes no progress.
    let mut made_progress = true;
    while !conflicts.is_empty() && made_progress {
        made_progress = false;
        for conflict in &conflicts {
            run.cancel
                .check(&format!("conflict of goal '{}'", goal.name()))?;
            if resolve_conflict(run, goal, conflict)? {
                made_progress = true;
            }
        }
        if made_progress {
            conflicts = compute_conflicts(run, goal, source, &resources)?;
        }
    }

    let satisfied = conflicts.is_empty();
    if satisfied {
        run.evaluation.for_goal(goal.id()).set_score(0);
    } else if goal.rollback_on_failure() {
        rollback(run, goal.id());
    } else {
        run.evaluation
            .for_goal(goal.id())
            .set_score(-(conflicts.len() as i64));
    }
    Ok(satisfied)
}

fn resolve_conflict<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    conflict: &Conflict,
) -> Result<bool, SchedulingError> {
    match conflict {
        Conflict::MissingInstance { instance, windows } => {
            let narrowed = narrow_for_type(run, goal, instance.type_name(), windows)?;
            if narrowed.is_empty() {
                return Ok(false);
            }
            let placed = match run.place_instance(instance, &narrowed) {
                Some(d) => d,
                None => return Ok(false),
            };
            if !check_and_insert(run, std::slice::from_ref(&placed))? {
                return Ok(false);
            }
            run.evaluation.for_goal(goal.id()).associate(placed.id(), true);
            Ok(true)
        }
        Conflict::MissingTemplate { template, windows } => {
            resolve_missing_template(run, goal, template, windows)
        }
        Conflict::MissingAssociation {
            candidates,
            windows,
            anchor,
        } => resolve_missing_association(run, goal, candidates, windows, *anchor),
    }
}

fn resolve_missing_template<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    template: &ActivityTemplate,
    windows: &Windows,
) -> Result<bool, SchedulingError> {
    let narrowed = narrow_for_type(run, goal, template.type_name(), windows)?;
    if narrowed.is_empty() {
        debug!(
            goal = goal.name(),
            type_name = template.type_name(),
            "no feasible windows remain after narrowing"
        );
        return Ok(false);
    }
    let directive = match run.create_activity(template, &narrowed)? {
        Some(d) => d,
        None => return Ok(false),
    };
    if !check_and_insert(run, std::slice::from_ref(&directive))? {
        return Ok(false);
    }
    run.evaluation
        .for_goal(goal.id())
        .associate(directive.id(), true);
    Ok(true)
}

fn resolve_missing_association<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    candidates: &[DirectiveId],
    windows: &Windows,
    anchor: Option<Anchor>,
) -> Result<bool, SchedulingError> {
    let constraints = goal.resource_constraints().to_vec();
    let narrowed = run.narrow_by_resource_constraints(windows, &constraints)?;
    for id in candidates {
        let absolute = match run.plan.absolute_start(*id) {
            Some(t) => t,
            None => continue,
        };
        if !narrowed.contains(absolute) {
            continue;
        }
        if let Some(anchor) = anchor {
            let existing = match run.plan.get(*id) {
                Some(d) => d.clone(),
                None => continue,
            };
            if existing.anchor() != Some(anchor) {
                let base = match run.plan.anchor_base(anchor) {
                    Some(b) => b,
                    None => continue,
                };
                let offset = absolute - base;
                // An end-anchored directive may not start before its anchor
                // ends; such a candidate cannot carry the anchor.
                if !anchor.to_start && offset.is_negative() {
                    debug!(
                        candidate = id.value(),
                        anchor_target = anchor.target.value(),
                        %offset,
                        "candidate starts before the anchor ends, skipping"
                    );
                    continue;
                }
                let replacement =
                    existing.with_anchor_retrofit(anchor.target, anchor.to_start, offset);
                run.plan.replace(*id, replacement)?;
                run.invalidate_results();
            }
        }
        run.evaluation.for_goal(goal.id()).associate(*id, false);
        return Ok(true);
    }
    Ok(false)
}

/// Goal-level constraints plus the activity type's own, when it has one.
fn narrow_for_type<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    type_name: &str,
    windows: &Windows,
) -> Result<Windows, SchedulingError> {
    let mut constraints: Vec<Arc<dyn ConstraintExpression>> =
        goal.resource_constraints().to_vec();
    if let Ok(activity_type) = run.problem.registry().lookup(type_name) {
        if let Some(constraint) = activity_type.constraint() {
            constraints.push(constraint.clone());
        }
    }
    let narrowed = run.narrow_by_resource_constraints(windows, &constraints)?;
    run.narrow_by_global_conditions(&narrowed, type_name)
}

/// The commit gate: all-or-nothing insertion of a candidate batch.
fn check_and_insert<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    directives: &[Directive],
) -> Result<bool, SchedulingError> {
    let horizon = run.problem.horizon();
    for directive in directives {
        if let Some(end) = directive.end_offset() {
            if directive.start_offset() < horizon.start() || end > horizon.end() {
                debug!(
                    type_name = directive.type_name(),
                    "candidate overruns the horizon, rejecting batch"
                );
                return Ok(false);
            }
        }
    }
    let mut trial = run.plan.duplicate();
    for directive in directives {
        trial.add(directive.clone())?;
    }
    if run.check_sim {
        run.cancel.check("verifying candidate plan")?;
        if let Err(err) = run.oracle.simulate_and_check_durations(&trial) {
            debug!(error = %err, "candidate batch rejected by simulation");
            return Ok(false);
        }
    }
    run.plan = trial;
    run.invalidate_results();
    Ok(true)
}

/// Undoes a goal's edits: removes the directives it inserted, clears its
/// associations, and scores it by the conflict count recorded at its first
/// evaluation. Idempotent.
fn rollback<S: SimulationOracle>(run: &mut SolverRun<'_, S>, goal: GoalId) {
    let inserted = run.evaluation.for_goal(goal).inserted();
    let removed = !inserted.is_empty();
    for id in inserted {
        run.plan.remove(id);
    }
    let record = run.evaluation.for_goal(goal);
    record.clear_associations();
    let count = record.conflicts_detected().unwrap_or(1);
    record.set_score(-(count as i64));
    if removed {
        run.invalidate_results();
    }
}

fn satisfy_and<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    children: &[Goal],
) -> Result<bool, SchedulingError> {
    let mut all_satisfied = true;
    let mut attempted: Vec<GoalId> = Vec::new();
    for child in children {
        run.cancel.check(&format!("subgoal '{}'", child.name()))?;
        attempted.push(child.id());
        if !satisfy_goal(run, child)? {
            all_satisfied = false;
            if !goal.maximize_satisfaction() {
                break;
            }
        }
    }

    if all_satisfied {
        let mut claimed: Vec<DirectiveId> = Vec::new();
        for child in children {
            if let Some(record) = run.evaluation.goal(child.id()) {
                claimed.extend(record.associated());
            }
        }
        let record = run.evaluation.for_goal(goal.id());
        for id in claimed {
            record.associate(id, false);
        }
        record.set_score(0);
        return Ok(true);
    }

    if goal.rollback_on_failure() {
        for child in attempted {
            rollback(run, child);
        }
    }
    rollback_score(run, goal.id());
    Ok(false)
}

fn satisfy_or<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    children: &[Goal],
) -> Result<bool, SchedulingError> {
    for child in children {
        run.cancel.check(&format!("subgoal '{}'", child.name()))?;
        if satisfy_goal(run, child)? {
            let claimed = run
                .evaluation
                .goal(child.id())
                .map(|record| record.associated())
                .unwrap_or_default();
            let record = run.evaluation.for_goal(goal.id());
            for id in claimed {
                record.associate(id, false);
            }
            record.set_score(0);
            return Ok(true);
        }
    }
    if goal.rollback_on_failure() {
        for child in children {
            rollback(run, child.id());
        }
    }
    rollback_score(run, goal.id());
    Ok(false)
}

/// Optimizing OR: trial-satisfy every child, roll each trial back, then
/// re-commit the winner under a fresh simulation check.
fn satisfy_or_optimizing<S: SimulationOracle>(
    run: &mut SolverRun<'_, S>,
    goal: &Goal,
    children: &[Goal],
    optimizer: &Arc<dyn Optimizer>,
) -> Result<bool, SchedulingError> {
    let mut best: Option<(Vec<Directive>, Vec<DirectiveId>)> = None;
    for child in children {
        run.cancel.check(&format!("subgoal '{}'", child.name()))?;
        let satisfied = satisfy_goal(run, child)?;
        if satisfied {
            let record = run.evaluation.for_goal(child.id());
            let inserted_ids = record.inserted();
            let associated = record.associated();
            let inserted: Vec<Directive> = inserted_ids
                .iter()
                .filter_map(|id| run.plan.get(*id).cloned())
                .collect();
            let better = match &best {
                Some((incumbent, _)) => optimizer.is_better(&inserted, incumbent),
                None => true,
            };
            if better {
                best = Some((inserted, associated));
            }
        }
        // Every trial is undone; only the winner is re-committed.
        rollback(run, child.id());
    }

    let (winners, associated) = match best {
        Some(b) => b,
        None => {
            rollback_score(run, goal.id());
            return Ok(false);
        }
    };
    if !check_and_insert(run, &winners)? {
        // The alternative committed cleanly during its trial; failing the
        // identical re-commit means the oracle is not deterministic.
        return Err(SchedulingError::Invariant(
            "re-committing the winning alternative failed its simulation check".to_string(),
        ));
    }
    let record = run.evaluation.for_goal(goal.id());
    for directive in &winners {
        record.associate(directive.id(), false);
    }
    for id in associated {
        record.associate(id, false);
    }
    record.set_score(0);
    Ok(true)
}

/// Scores an unsatisfied composite from its recorded conflict count.
fn rollback_score<S: SimulationOracle>(run: &mut SolverRun<'_, S>, goal: GoalId) {
    let record = run.evaluation.for_goal(goal);
    let count = record.conflicts_detected().unwrap_or(1);
    record.set_score(-(count as i64));
}

fn log_summary<S: SimulationOracle>(run: &SolverRun<'_, S>) {
    let mut names: BTreeMap<GoalId, String> = BTreeMap::new();
    collect_goal_names(run.problem.goals(), &mut names);
    let mut satisfied = 0usize;
    let mut unsatisfied = 0usize;
    for (id, record) in run.evaluation.iter() {
        let name = names.get(&id).map(String::as_str).unwrap_or("<unnamed>");
        if record.is_satisfied() {
            satisfied += 1;
        } else {
            unsatisfied += 1;
        }
        info!(
            goal = name,
            score = record.score(),
            directives = record.associated().len(),
            "goal evaluation"
        );
    }
    info!(
        satisfied,
        unsatisfied,
        plan_directives = run.plan.len(),
        "scheduling run complete"
    );
}

fn collect_goal_names(goals: &[Goal], names: &mut BTreeMap<GoalId, String>) {
    for goal in goals {
        names.insert(goal.id(), goal.name().to_string());
        match goal.kind() {
            GoalKind::And { children } | GoalKind::Or { children, .. } => {
                collect_goal_names(children, names);
            }
            GoalKind::Atomic(_) => {}
        }
    }
}
