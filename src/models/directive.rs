//! Scheduling activity directives.
//!
//! A directive is one scheduled (or candidate) activity: a start offset,
//! an optional resolved duration, and instantiated arguments. Directives
//! are immutable value objects: "modifying" one always produces a new
//! record via a `with_*` method, never in-place mutation of a committed
//! directive. Ids are process-unique monotonic counters.
//!
//! # Anchors
//!
//! A directive may be anchored to another directive instead of the plan
//! epoch: its start offset is then relative to the anchor's start or end.
//! The grounding pass (see [`crate::grounding`]) resolves anchor chains
//! into absolute starts.

use crate::time::Duration;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_DIRECTIVE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DirectiveId(u64);

impl DirectiveId {
    /// Allocates a fresh id from the process-wide monotonic counter.
    pub fn fresh() -> Self {
        DirectiveId(NEXT_DIRECTIVE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Relative-scheduling anchor: which directive, and which of its ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// The directive this one is scheduled relative to.
    pub target: DirectiveId,
    /// `true`: offset from the anchor's start; `false`: from its end.
    pub to_start: bool,
}

/// A scheduled or candidate activity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    id: DirectiveId,
    type_name: String,
    /// Offset from the plan epoch, or from the anchor when one is set.
    start_offset: Duration,
    /// `None` until resolved (by policy or by simulation).
    duration: Option<Duration>,
    /// Ordered parameter name → serialized value.
    arguments: IndexMap<String, Value>,
    /// Generating directive for decomposition products.
    parent: Option<DirectiveId>,
    anchor: Option<Anchor>,
    /// Whether this directive was created during the current run, as
    /// opposed to being part of the initial plan.
    new_this_run: bool,
}

impl Directive {
    /// Creates a new directive of the given type starting at an offset
    /// from the plan epoch.
    pub fn new(type_name: impl Into<String>, start_offset: Duration) -> Self {
        Directive {
            id: DirectiveId::fresh(),
            type_name: type_name.into(),
            start_offset,
            duration: None,
            arguments: IndexMap::new(),
            parent: None,
            anchor: None,
            new_this_run: true,
        }
    }

    /// Re-times the directive.
    pub fn with_start_offset(mut self, start_offset: Duration) -> Self {
        self.start_offset = start_offset;
        self
    }

    /// Sets the resolved duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Replaces the argument map.
    pub fn with_arguments(mut self, arguments: IndexMap<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Adds a single argument.
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Records the generating directive.
    pub fn with_parent(mut self, parent: DirectiveId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Anchors this directive to another; `start_offset` becomes relative
    /// to the anchor's start (`to_start`) or end.
    pub fn anchored_to(mut self, target: DirectiveId, to_start: bool, offset: Duration) -> Self {
        self.anchor = Some(Anchor { target, to_start });
        self.start_offset = offset;
        self
    }

    /// Marks this directive as part of the initial plan rather than
    /// created by the current run.
    pub fn pre_existing(mut self) -> Self {
        self.new_this_run = false;
        self
    }

    /// Copy with a fresh id, e.g. for re-instantiating a template match.
    pub fn copy_with_new_id(&self) -> Self {
        let mut copy = self.clone();
        copy.id = DirectiveId::fresh();
        copy
    }

    /// Copy of this directive (same id) retrofitted with an anchor, used
    /// when associating an existing directive to a goal that demands one.
    pub fn with_anchor_retrofit(
        &self,
        target: DirectiveId,
        to_start: bool,
        offset: Duration,
    ) -> Self {
        let mut copy = self.clone();
        copy.anchor = Some(Anchor { target, to_start });
        copy.start_offset = offset;
        copy
    }

    pub fn id(&self) -> DirectiveId {
        self.id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn start_offset(&self) -> Duration {
        self.start_offset
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn arguments(&self) -> &IndexMap<String, Value> {
        &self.arguments
    }

    pub fn parent(&self) -> Option<DirectiveId> {
        self.parent
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    pub fn is_new_this_run(&self) -> bool {
        self.new_this_run
    }

    /// End offset relative to the plan epoch, for unanchored directives
    /// with a resolved duration.
    pub fn end_offset(&self) -> Option<Duration> {
        match (self.anchor, self.duration) {
            (None, Some(d)) => Some(self.start_offset + d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_unique_and_monotonic() {
        let a = DirectiveId::fresh();
        let b = DirectiveId::fresh();
        assert!(b.value() > a.value());
        assert_ne!(a, b);
    }

    #[test]
    fn test_directive_builder() {
        let generator = DirectiveId::fresh();
        let d = Directive::new("Observe", Duration::from_secs(5))
            .with_duration(Duration::from_secs(10))
            .with_argument("filter", json!("green"))
            .with_argument("exposures", json!(3))
            .with_parent(generator);
        assert_eq!(d.type_name(), "Observe");
        assert_eq!(d.start_offset(), Duration::from_secs(5));
        assert_eq!(d.duration(), Some(Duration::from_secs(10)));
        assert_eq!(d.end_offset(), Some(Duration::from_secs(15)));
        assert_eq!(d.arguments().len(), 2);
        assert_eq!(d.parent(), Some(generator));
        assert!(d.is_new_this_run());
        // Argument order is preserved.
        let names: Vec<&str> = d.arguments().keys().map(String::as_str).collect();
        assert_eq!(names, ["filter", "exposures"]);
    }

    #[test]
    fn test_copy_with_new_id() {
        let d = Directive::new("Observe", Duration::ZERO);
        let copy = d.copy_with_new_id();
        assert_ne!(d.id(), copy.id());
        assert_eq!(d.type_name(), copy.type_name());
    }

    #[test]
    fn test_anchor_retrofit_keeps_id() {
        let base = Directive::new("Downlink", Duration::from_secs(100));
        let target = DirectiveId::fresh();
        let retro = base.with_anchor_retrofit(target, false, Duration::from_secs(2));
        assert_eq!(retro.id(), base.id());
        assert_eq!(
            retro.anchor(),
            Some(Anchor {
                target,
                to_start: false
            })
        );
        assert_eq!(retro.start_offset(), Duration::from_secs(2));
        // Anchored directives have no epoch-relative end.
        assert_eq!(
            retro.with_duration(Duration::from_secs(1)).end_offset(),
            None
        );
    }
}
