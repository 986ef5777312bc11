//! Conflict taxonomy.
//!
//! A conflict is the unit of work handed from goal evaluation to the
//! scheduler: one concrete reason the current plan does not satisfy a
//! goal, together with the temporal context in which a repair may be
//! placed. The taxonomy is a closed enumeration so scheduler dispatch is
//! an exhaustive match rather than downcasting.

use crate::models::directive::{Anchor, Directive, DirectiveId};
use crate::time::Windows;
use indexmap::IndexMap;
use serde_json::Value;

/// A not-yet-instantiated activity request: the type and any fixed
/// arguments are known, but the start time (and possibly the duration)
/// must still be resolved against resource constraints.
#[derive(Debug, Clone)]
pub struct ActivityTemplate {
    type_name: String,
    arguments: IndexMap<String, Value>,
    /// When set, the instantiated directive is anchored to this target
    /// rather than to the plan epoch.
    anchor: Option<Anchor>,
}

impl ActivityTemplate {
    /// Creates a template for the given activity type.
    pub fn new(type_name: impl Into<String>) -> Self {
        ActivityTemplate {
            type_name: type_name.into(),
            arguments: IndexMap::new(),
            anchor: None,
        }
    }

    /// Fixes an argument ahead of instantiation.
    pub fn with_argument(mut self, name: impl Into<String>, value: Value) -> Self {
        self.arguments.insert(name.into(), value);
        self
    }

    /// Requests that the instantiated directive be anchored to `target`.
    pub fn anchored_to(mut self, target: DirectiveId, to_start: bool) -> Self {
        self.anchor = Some(Anchor { target, to_start });
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn arguments(&self) -> &IndexMap<String, Value> {
        &self.arguments
    }

    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }
}

/// One concrete gap between a goal and the current plan.
#[derive(Debug, Clone)]
pub enum Conflict {
    /// A fully specified directive is missing; resolution re-times it
    /// within the conflict's windows and inserts it.
    MissingInstance {
        instance: Directive,
        windows: Windows,
    },
    /// An activity matching a template is missing; resolution instantiates
    /// the template somewhere in the conflict's windows.
    MissingTemplate {
        template: ActivityTemplate,
        windows: Windows,
    },
    /// Matching directives already exist but none is associated with the
    /// goal; resolution picks a candidate whose placement still satisfies
    /// the goal, optionally retrofitting an anchor onto it.
    MissingAssociation {
        candidates: Vec<DirectiveId>,
        windows: Windows,
        /// When set, the chosen candidate is rewritten to be anchored to
        /// this target.
        anchor: Option<Anchor>,
    },
}

impl Conflict {
    /// The temporal context: instants at which a repair for this conflict
    /// may legally be placed.
    pub fn temporal_context(&self) -> &Windows {
        match self {
            Conflict::MissingInstance { windows, .. }
            | Conflict::MissingTemplate { windows, .. }
            | Conflict::MissingAssociation { windows, .. } => windows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{Duration, Interval};
    use serde_json::json;

    #[test]
    fn test_template_builder() {
        let target = DirectiveId::fresh();
        let t = ActivityTemplate::new("Downlink")
            .with_argument("rate", json!(2.5))
            .anchored_to(target, false);
        assert_eq!(t.type_name(), "Downlink");
        assert_eq!(t.arguments().len(), 1);
        assert_eq!(
            t.anchor(),
            Some(Anchor {
                target,
                to_start: false
            })
        );
    }

    #[test]
    fn test_temporal_context() {
        let windows = Windows::from_interval(Interval::between(
            Duration::ZERO,
            Duration::from_secs(10),
        ));
        let c = Conflict::MissingTemplate {
            template: ActivityTemplate::new("Observe"),
            windows: windows.clone(),
        };
        assert_eq!(c.temporal_context(), &windows);
    }
}
