//! Plan grounding: anchor chains to absolute start times.
//!
//! The scheduler works on directives whose starts may be relative to other
//! directives. Downstream consumers (dispatch, export, simulation drivers)
//! want absolute instants. Grounding resolves every anchor chain in
//! dependency order and fails as a whole (`None`) when any chain is
//! broken: a missing anchor target, an anchor cycle, an anchored-to-end
//! predecessor with unresolved duration, or a resolved start before the
//! horizon.

use crate::models::{DirectiveId, Plan, PlanningHorizon};
use crate::time::Duration;
use std::collections::BTreeMap;
use tracing::debug;

/// A directive with its anchor chain resolved to an absolute start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundedInstance {
    pub id: DirectiveId,
    pub type_name: String,
    /// Absolute start relative to the plan epoch.
    pub start: Duration,
    pub duration: Option<Duration>,
}

/// Resolves every directive in `plan` to an absolute start, in layers:
/// unanchored directives first, then directives whose targets are already
/// resolved, until a pass makes no progress.
///
/// Returns `None` when any chain cannot be resolved. On an all-absolute
/// plan this is the identity on starts.
pub fn ground(plan: &Plan, horizon: &PlanningHorizon) -> Option<Vec<GroundedInstance>> {
    let mut resolved: BTreeMap<DirectiveId, Duration> = BTreeMap::new();
    let mut pending: Vec<DirectiveId> = Vec::new();

    for directive in plan.directives() {
        match directive.anchor() {
            None => {
                resolved.insert(directive.id(), directive.start_offset());
            }
            Some(_) => pending.push(directive.id()),
        }
    }

    // Peel off the directives whose targets are resolved; a pass with no
    // progress means a missing target or a cycle.
    while !pending.is_empty() {
        let before = pending.len();
        pending.retain(|id| {
            let directive = match plan.get(*id) {
                Some(d) => d,
                None => return true,
            };
            let anchor = match directive.anchor() {
                Some(a) => a,
                None => return true,
            };
            let target_start = match resolved.get(&anchor.target) {
                Some(start) => *start,
                None => return true,
            };
            let base = if anchor.to_start {
                target_start
            } else {
                let target_duration = plan.get(anchor.target).and_then(|t| t.duration());
                match target_duration {
                    Some(d) => target_start + d,
                    None => {
                        debug!(
                            anchor_target = anchor.target.value(),
                            "grounding failed: end-anchored to a directive with unresolved duration"
                        );
                        return true;
                    }
                }
            };
            resolved.insert(*id, base + directive.start_offset());
            false
        });
        if pending.len() == before {
            debug!(
                unresolved = pending.len(),
                "grounding failed: unresolvable anchor chain"
            );
            return None;
        }
    }

    let mut instances: Vec<GroundedInstance> = Vec::with_capacity(resolved.len());
    for (id, start) in resolved {
        if start < horizon.start() {
            debug!(id = id.value(), %start, "grounding failed: start before horizon");
            return None;
        }
        let directive = plan.get(id)?;
        instances.push(GroundedInstance {
            id,
            type_name: directive.type_name().to_string(),
            start,
            duration: directive.duration(),
        });
    }
    instances.sort_by_key(|g| (g.start, g.id));
    Some(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Directive;

    fn horizon() -> PlanningHorizon {
        PlanningHorizon::new(Duration::ZERO, Duration::from_secs(1000))
    }

    #[test]
    fn test_ground_absolute_plan_is_identity() {
        let mut plan = Plan::new();
        let a = Directive::new("Observe", Duration::from_secs(10));
        let b = Directive::new("Downlink", Duration::from_secs(5));
        let (ia, ib) = (a.id(), b.id());
        plan.add(a).unwrap();
        plan.add(b).unwrap();

        let grounded = ground(&plan, &horizon()).unwrap();
        assert_eq!(grounded.len(), 2);
        assert_eq!(grounded[0].id, ib);
        assert_eq!(grounded[0].start, Duration::from_secs(5));
        assert_eq!(grounded[1].id, ia);
        assert_eq!(grounded[1].start, Duration::from_secs(10));
    }

    #[test]
    fn test_ground_resolves_anchor_chain() {
        let mut plan = Plan::new();
        let root = Directive::new("Observe", Duration::from_secs(100))
            .with_duration(Duration::from_secs(10));
        let root_id = root.id();
        let mid = Directive::new("Downlink", Duration::ZERO).anchored_to(
            root_id,
            false,
            Duration::from_secs(5),
        );
        let mid_id = mid.id();
        let leaf = Directive::new("Slew", Duration::ZERO).anchored_to(
            mid_id,
            true,
            Duration::from_secs(1),
        );
        let leaf_id = leaf.id();
        // Insertion order does not matter for resolution.
        plan.add(leaf).unwrap();
        plan.add(mid).unwrap();
        plan.add(root).unwrap();

        let grounded = ground(&plan, &horizon()).unwrap();
        let start_of = |id: DirectiveId| grounded.iter().find(|g| g.id == id).unwrap().start;
        assert_eq!(start_of(root_id), Duration::from_secs(100));
        assert_eq!(start_of(mid_id), Duration::from_secs(115));
        assert_eq!(start_of(leaf_id), Duration::from_secs(116));
    }

    #[test]
    fn test_ground_fails_on_missing_anchor() {
        let mut plan = Plan::new();
        let missing = DirectiveId::fresh();
        plan.add(Directive::new("Downlink", Duration::ZERO).anchored_to(
            missing,
            true,
            Duration::ZERO,
        ))
        .unwrap();
        assert!(ground(&plan, &horizon()).is_none());
    }

    #[test]
    fn test_ground_fails_on_anchor_cycle() {
        let mut plan = Plan::new();
        let a = Directive::new("Observe", Duration::ZERO);
        let a_id = a.id();
        let b = Directive::new("Downlink", Duration::ZERO).anchored_to(
            a_id,
            true,
            Duration::from_secs(1),
        );
        let b_id = b.id();
        let a = a.anchored_to(b_id, true, Duration::from_secs(1));
        plan.add(a).unwrap();
        plan.add(b).unwrap();
        assert!(ground(&plan, &horizon()).is_none());
    }

    #[test]
    fn test_ground_fails_on_unknown_end_duration() {
        let mut plan = Plan::new();
        let root = Directive::new("Observe", Duration::ZERO);
        let root_id = root.id();
        plan.add(root).unwrap();
        plan.add(Directive::new("Downlink", Duration::ZERO).anchored_to(
            root_id,
            false,
            Duration::ZERO,
        ))
        .unwrap();
        assert!(ground(&plan, &horizon()).is_none());
    }

    #[test]
    fn test_ground_fails_on_negative_start() {
        let mut plan = Plan::new();
        let root = Directive::new("Observe", Duration::from_secs(1));
        let root_id = root.id();
        plan.add(root).unwrap();
        plan.add(Directive::new("Slew", Duration::ZERO).anchored_to(
            root_id,
            true,
            -Duration::from_secs(5),
        ))
        .unwrap();
        assert!(ground(&plan, &horizon()).is_none());
    }
}
