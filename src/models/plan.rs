//! In-memory plan: the authoritative set of scheduled directives.
//!
//! The plan keeps three indices (by id, by start offset, by activity type)
//! which must always be exactly the groupings of the id-indexed set.
//! Duplication produces a structurally independent copy used for
//! speculative "simulate the edit, then swap or discard" commits; the
//! duplicate shares no mutable state with the original.

use crate::error::PlanError;
use crate::models::directive::{Anchor, Directive, DirectiveId};
use crate::time::Duration;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// The authoritative directive store with coherent secondary indices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    by_id: BTreeMap<DirectiveId, Directive>,
    by_time: BTreeMap<Duration, Vec<DirectiveId>>,
    by_type: BTreeMap<String, Vec<DirectiveId>>,
}

impl Plan {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a directive; ids must be unique across the plan.
    pub fn add(&mut self, directive: Directive) -> Result<(), PlanError> {
        let id = directive.id();
        if self.by_id.contains_key(&id) {
            return Err(PlanError::DuplicateDirective(id));
        }
        self.by_time
            .entry(directive.start_offset())
            .or_default()
            .push(id);
        self.by_type
            .entry(directive.type_name().to_string())
            .or_default()
            .push(id);
        self.by_id.insert(id, directive);
        Ok(())
    }

    /// Removes a directive, returning it if present.
    pub fn remove(&mut self, id: DirectiveId) -> Option<Directive> {
        let directive = self.by_id.remove(&id)?;
        Self::unindex(&mut self.by_time, &directive.start_offset(), id);
        let type_key = directive.type_name().to_string();
        Self::unindex(&mut self.by_type, &type_key, id);
        Some(directive)
    }

    fn unindex<K: Ord + Clone>(
        index: &mut BTreeMap<K, Vec<DirectiveId>>,
        key: &K,
        id: DirectiveId,
    ) {
        if let Some(ids) = index.get_mut(key) {
            ids.retain(|existing| *existing != id);
            if ids.is_empty() {
                index.remove(key);
            }
        }
    }

    /// Replaces a directive with a new record carrying the same id, e.g.
    /// an anchor-retrofitted copy.
    pub fn replace(&mut self, id: DirectiveId, replacement: Directive) -> Result<(), PlanError> {
        if replacement.id() != id {
            return Err(PlanError::UnknownDirective(replacement.id()));
        }
        if self.remove(id).is_none() {
            return Err(PlanError::UnknownDirective(id));
        }
        self.add(replacement)
    }

    /// Looks up a directive by id.
    pub fn get(&self, id: DirectiveId) -> Option<&Directive> {
        self.by_id.get(&id)
    }

    /// Whether the plan contains a directive with this id.
    pub fn contains(&self, id: DirectiveId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Iterates all directives in id order.
    pub fn directives(&self) -> impl Iterator<Item = &Directive> {
        self.by_id.values()
    }

    /// All directives in ascending start-offset order.
    pub fn directives_by_time(&self) -> Vec<&Directive> {
        self.by_time
            .values()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    /// All directives of one activity type.
    pub fn directives_of_type(&self, type_name: &str) -> Vec<&Directive> {
        self.by_type
            .get(type_name)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default()
    }

    /// Number of directives.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Structurally independent copy for speculative edits.
    pub fn duplicate(&self) -> Plan {
        self.clone()
    }

    /// Absolute start of a directive, resolving its anchor chain.
    ///
    /// `None` when the chain is broken: missing anchor, anchor cycle, or
    /// an anchored-to-end predecessor whose duration is unresolved.
    pub fn absolute_start(&self, id: DirectiveId) -> Option<Duration> {
        let mut visited = HashSet::new();
        self.absolute_start_inner(id, &mut visited)
    }

    fn absolute_start_inner(
        &self,
        id: DirectiveId,
        visited: &mut HashSet<DirectiveId>,
    ) -> Option<Duration> {
        if !visited.insert(id) {
            return None;
        }
        let directive = self.by_id.get(&id)?;
        match directive.anchor() {
            None => Some(directive.start_offset()),
            Some(anchor) => {
                let anchor_start = self.absolute_start_inner(anchor.target, visited)?;
                let base = if anchor.to_start {
                    anchor_start
                } else {
                    anchor_start + self.by_id.get(&anchor.target)?.duration()?
                };
                Some(base + directive.start_offset())
            }
        }
    }

    /// Absolute instant an anchor resolves to: the target's start, or its
    /// end for end-anchors. `None` when the target or its duration is
    /// unresolved.
    pub fn anchor_base(&self, anchor: Anchor) -> Option<Duration> {
        let start = self.absolute_start(anchor.target)?;
        if anchor.to_start {
            Some(start)
        } else {
            Some(start + self.by_id.get(&anchor.target)?.duration()?)
        }
    }

    /// Whether the time and type indices are exactly the groupings of the
    /// id-indexed set. Exposed so tests can assert the index invariant.
    pub fn indices_agree(&self) -> bool {
        let indexed_by_time: usize = self.by_time.values().map(Vec::len).sum();
        let indexed_by_type: usize = self.by_type.values().map(Vec::len).sum();
        if indexed_by_time != self.by_id.len() || indexed_by_type != self.by_id.len() {
            return false;
        }
        self.by_id.values().all(|d| {
            self.by_time
                .get(&d.start_offset())
                .is_some_and(|ids| ids.contains(&d.id()))
                && self
                    .by_type
                    .get(d.type_name())
                    .is_some_and(|ids| ids.contains(&d.id()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive(type_name: &str, start_secs: i64) -> Directive {
        Directive::new(type_name, Duration::from_secs(start_secs))
    }

    #[test]
    fn test_add_and_indices() {
        let mut plan = Plan::new();
        let a = directive("Observe", 10);
        let b = directive("Observe", 5);
        let c = directive("Downlink", 10);
        let (ia, ib, ic) = (a.id(), b.id(), c.id());
        plan.add(a).unwrap();
        plan.add(b).unwrap();
        plan.add(c).unwrap();

        assert_eq!(plan.len(), 3);
        assert!(plan.indices_agree());
        let by_time: Vec<DirectiveId> = plan.directives_by_time().iter().map(|d| d.id()).collect();
        assert_eq!(by_time, vec![ib, ia, ic]);
        let observes = plan.directives_of_type("Observe");
        assert_eq!(observes.len(), 2);
        assert!(plan.directives_of_type("Slew").is_empty());
        assert!(plan.contains(ia));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut plan = Plan::new();
        let a = directive("Observe", 0);
        let dup = a.clone();
        plan.add(a).unwrap();
        assert!(matches!(
            plan.add(dup),
            Err(PlanError::DuplicateDirective(_))
        ));
        assert_eq!(plan.len(), 1);
        assert!(plan.indices_agree());
    }

    #[test]
    fn test_remove_maintains_indices() {
        let mut plan = Plan::new();
        let a = directive("Observe", 10);
        let id = a.id();
        plan.add(a).unwrap();
        let removed = plan.remove(id).unwrap();
        assert_eq!(removed.id(), id);
        assert!(plan.is_empty());
        assert!(plan.indices_agree());
        assert!(plan.remove(id).is_none());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut plan = Plan::new();
        plan.add(directive("Observe", 0)).unwrap();
        let copy = plan.duplicate();
        plan.add(directive("Downlink", 5)).unwrap();
        assert_eq!(copy.len(), 1);
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_replace_keeps_id_and_indices() {
        let mut plan = Plan::new();
        let base = directive("Observe", 10);
        let id = base.id();
        let anchor_target = directive("Downlink", 0).with_duration(Duration::from_secs(2));
        let target_id = anchor_target.id();
        plan.add(anchor_target).unwrap();
        plan.add(base.clone()).unwrap();

        let retro = base.with_anchor_retrofit(target_id, true, Duration::from_secs(10));
        plan.replace(id, retro).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(plan.indices_agree());
        assert!(plan.get(id).unwrap().anchor().is_some());
    }

    #[test]
    fn test_absolute_start_resolves_chains() {
        let mut plan = Plan::new();
        let root = directive("Observe", 100).with_duration(Duration::from_secs(10));
        let root_id = root.id();
        let to_start =
            Directive::new("Downlink", Duration::ZERO).anchored_to(root_id, true, Duration::from_secs(1));
        let to_end =
            Directive::new("Downlink", Duration::ZERO).anchored_to(root_id, false, Duration::from_secs(2));
        let (s_id, e_id) = (to_start.id(), to_end.id());
        plan.add(root).unwrap();
        plan.add(to_start).unwrap();
        plan.add(to_end).unwrap();

        assert_eq!(plan.absolute_start(root_id), Some(Duration::from_secs(100)));
        assert_eq!(plan.absolute_start(s_id), Some(Duration::from_secs(101)));
        assert_eq!(plan.absolute_start(e_id), Some(Duration::from_secs(112)));
    }

    #[test]
    fn test_absolute_start_broken_chain() {
        let mut plan = Plan::new();
        let missing = DirectiveId::fresh();
        let dangling =
            Directive::new("Downlink", Duration::ZERO).anchored_to(missing, true, Duration::ZERO);
        let d_id = dangling.id();
        plan.add(dangling).unwrap();
        assert_eq!(plan.absolute_start(d_id), None);

        // Anchored to the end of a directive with unknown duration.
        let root = directive("Observe", 0);
        let root_id = root.id();
        let dependent =
            Directive::new("Downlink", Duration::ZERO).anchored_to(root_id, false, Duration::ZERO);
        let dep_id = dependent.id();
        plan.add(root).unwrap();
        plan.add(dependent).unwrap();
        assert_eq!(plan.absolute_start(dep_id), None);
    }
}
