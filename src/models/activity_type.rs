//! Activity type catalog.
//!
//! An activity type pairs a name with a duration policy, a parameter
//! schema, and an optional associated resource constraint. Types are
//! immutable after registration and looked up by name; duplicate names
//! are rejected at registration time.
//!
//! # Duration Policies
//!
//! - **Fixed**: constant duration
//! - **Controllable**: duration is itself a parameter within a feasible
//!   range
//! - **Parametric**: duration is a pure function of the instantiated
//!   arguments
//! - **Uncontrollable**: duration is only known by simulating, which makes
//!   placement a root-finding problem (see [`crate::solver::rootfind`])

use crate::constraints::ConstraintExpression;
use crate::error::SchedulingError;
use crate::time::Duration;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Pure function from instantiated arguments to a duration.
pub type DurationFn = Arc<dyn Fn(&IndexMap<String, Value>) -> Option<Duration> + Send + Sync>;

/// How an activity type's duration is determined.
#[derive(Clone)]
pub enum DurationPolicy {
    /// Only the simulation knows the duration.
    Uncontrollable,
    /// The duration is a parameter, constrained to `[min, max]`; when the
    /// named argument is absent the scheduler picks a duration that fills
    /// the candidate window.
    Controllable {
        min: Duration,
        max: Duration,
        parameter: String,
    },
    /// Constant duration.
    Fixed(Duration),
    /// Duration computed from the instantiated arguments without
    /// simulating.
    Parametric(DurationFn),
}

impl fmt::Debug for DurationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationPolicy::Uncontrollable => write!(f, "Uncontrollable"),
            DurationPolicy::Controllable {
                min,
                max,
                parameter,
            } => write!(f, "Controllable[{min}, {max}] via '{parameter}'"),
            DurationPolicy::Fixed(d) => write!(f, "Fixed({d})"),
            DurationPolicy::Parametric(_) => write!(f, "Parametric(..)"),
        }
    }
}

/// Value kinds accepted in a parameter schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    Int,
    Real,
    Boolean,
    Text,
    /// Integer microsecond count interpreted as a [`Duration`].
    Duration,
}

/// An immutable activity type.
#[derive(Clone)]
pub struct ActivityType {
    name: String,
    duration_policy: DurationPolicy,
    parameters: IndexMap<String, ParameterKind>,
    constraint: Option<Arc<dyn ConstraintExpression>>,
}

impl fmt::Debug for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityType")
            .field("name", &self.name)
            .field("duration_policy", &self.duration_policy)
            .field("parameters", &self.parameters)
            .field("has_constraint", &self.constraint.is_some())
            .finish()
    }
}

impl ActivityType {
    /// Creates an activity type with the given duration policy.
    pub fn new(name: impl Into<String>, duration_policy: DurationPolicy) -> Self {
        ActivityType {
            name: name.into(),
            duration_policy,
            parameters: IndexMap::new(),
            constraint: None,
        }
    }

    /// Declares a parameter in the schema.
    pub fn with_parameter(mut self, name: impl Into<String>, kind: ParameterKind) -> Self {
        self.parameters.insert(name.into(), kind);
        self
    }

    /// Attaches the type's associated resource constraint, applied
    /// whenever an instance of this type is being placed.
    pub fn with_constraint(mut self, constraint: Arc<dyn ConstraintExpression>) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn duration_policy(&self) -> &DurationPolicy {
        &self.duration_policy
    }

    pub fn parameters(&self) -> &IndexMap<String, ParameterKind> {
        &self.parameters
    }

    pub fn constraint(&self) -> Option<&Arc<dyn ConstraintExpression>> {
        self.constraint.as_ref()
    }
}

/// Decodes a serialized argument value as a duration (integer ticks).
pub fn duration_from_value(value: &Value) -> Option<Duration> {
    value.as_i64().map(Duration::of_ticks)
}

/// Name-indexed catalog of activity types, fully formed at problem
/// construction.
#[derive(Debug, Clone, Default)]
pub struct ActivityTypeRegistry {
    types: IndexMap<String, Arc<ActivityType>>,
}

impl ActivityTypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type; rejects duplicate names.
    pub fn register(&mut self, activity_type: ActivityType) -> Result<(), SchedulingError> {
        let name = activity_type.name().to_string();
        if self.types.contains_key(&name) {
            return Err(SchedulingError::DuplicateActivityType(name));
        }
        self.types.insert(name, Arc::new(activity_type));
        Ok(())
    }

    /// Looks up a type by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<ActivityType>, SchedulingError> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulingError::UnknownActivityType(name.to_string()))
    }

    /// Iterates the registered types in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ActivityType>> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_register_and_lookup() {
        let mut registry = ActivityTypeRegistry::new();
        registry
            .register(ActivityType::new(
                "Observe",
                DurationPolicy::Fixed(Duration::from_secs(10)),
            ))
            .unwrap();
        let t = registry.lookup("Observe").unwrap();
        assert_eq!(t.name(), "Observe");
        assert!(matches!(
            registry.lookup("Missing"),
            Err(SchedulingError::UnknownActivityType(_))
        ));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = ActivityTypeRegistry::new();
        registry
            .register(ActivityType::new("Observe", DurationPolicy::Uncontrollable))
            .unwrap();
        let err = registry
            .register(ActivityType::new(
                "Observe",
                DurationPolicy::Fixed(Duration::ZERO),
            ))
            .unwrap_err();
        assert!(matches!(err, SchedulingError::DuplicateActivityType(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_parametric_policy() {
        let policy = DurationPolicy::Parametric(Arc::new(|args: &IndexMap<String, Value>| {
            args.get("exposures")
                .and_then(Value::as_i64)
                .map(|n| Duration::from_secs(n * 2))
        }));
        let t = ActivityType::new("Image", policy).with_parameter("exposures", ParameterKind::Int);
        let mut args = IndexMap::new();
        args.insert("exposures".to_string(), json!(3));
        match t.duration_policy() {
            DurationPolicy::Parametric(f) => {
                assert_eq!(f(&args), Some(Duration::from_secs(6)));
            }
            other => panic!("unexpected policy: {other:?}"),
        }
    }

    #[test]
    fn test_duration_from_value() {
        assert_eq!(
            duration_from_value(&json!(1_000_000)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(duration_from_value(&json!("ten")), None);
    }
}
