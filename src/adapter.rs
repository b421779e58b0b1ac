//! Runtime shape classification and the adapters that unwrap and iterate values.

use std::fmt;
use std::sync::Arc;

use crate::extract::ExtractionError;
use crate::{InstanceKey, Value};

/// The closed set of runtime shapes extraction distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Sequence,
    Associative,
    Wrapped,
}

impl Shape {
    #[must_use]
    pub fn of(value: &Value) -> Shape {
        match value {
            Value::List(_) => Shape::Sequence,
            Value::Map(_) => Shape::Associative,
            Value::Optional(_) => Shape::Wrapped,
            _ => Shape::Scalar,
        }
    }

    #[must_use]
    pub fn is_iterable(self) -> bool {
        matches!(self, Shape::Sequence | Shape::Associative)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Scalar => write!(f, "scalar"),
            Shape::Sequence => write!(f, "sequence"),
            Shape::Associative => write!(f, "associative"),
            Shape::Wrapped => write!(f, "wrapped"),
        }
    }
}

/// Unwraps one layer of an optional-like wrapper.
pub trait WrapperAdapter: Send + Sync + fmt::Debug {
    fn applies_to(&self, value: &Value) -> bool;

    /// The wrapped value, or `None` when the wrapper is empty.
    fn unwrap<'a>(&self, value: &'a Value) -> Option<&'a Value>;
}

/// Iterates the elements of a collection shape.
pub trait IterableAdapter: Send + Sync + fmt::Debug {
    fn shape(&self) -> Shape;

    fn iter<'a>(&self, value: &'a Value) -> Box<dyn Iterator<Item = (InstanceKey, &'a Value)> + 'a>;
}

/// Unwraps [`Value::Optional`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OptionalAdapter;

impl WrapperAdapter for OptionalAdapter {
    fn applies_to(&self, value: &Value) -> bool {
        matches!(value, Value::Optional(_))
    }

    fn unwrap<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        match value {
            Value::Optional(inner) => inner.as_deref(),
            other => Some(other),
        }
    }
}

/// Iterates [`Value::List`] with integer keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListAdapter;

impl IterableAdapter for ListAdapter {
    fn shape(&self) -> Shape {
        Shape::Sequence
    }

    fn iter<'a>(&self, value: &'a Value) -> Box<dyn Iterator<Item = (InstanceKey, &'a Value)> + 'a> {
        match value {
            Value::List(items) => Box::new(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (InstanceKey::Index(i), v)),
            ),
            _ => Box::new(std::iter::empty()),
        }
    }
}

/// Iterates the values of [`Value::Map`] in insertion order, keyed by map key.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapAdapter;

impl IterableAdapter for MapAdapter {
    fn shape(&self) -> Shape {
        Shape::Associative
    }

    fn iter<'a>(&self, value: &'a Value) -> Box<dyn Iterator<Item = (InstanceKey, &'a Value)> + 'a> {
        match value {
            Value::Map(entries) => Box::new(
                entries
                    .iter()
                    .map(|(k, v)| (InstanceKey::Key(k.clone()), v)),
            ),
            _ => Box::new(std::iter::empty()),
        }
    }
}

#[derive(Debug, Clone)]
struct RegisteredWrapper {
    priority: i32,
    adapter: Arc<dyn WrapperAdapter>,
}

/// Frozen set of adapters consulted by extraction and by collection operators.
///
/// Wrapper adapters are consulted in ascending priority; equal priorities keep
/// registration order. Iterable adapters are selected by [`Shape`].
#[derive(Debug, Clone)]
pub struct TypeAdapterRegistry {
    wrappers: Vec<RegisteredWrapper>,
    iterables: Vec<Arc<dyn IterableAdapter>>,
}

impl Default for TypeAdapterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl TypeAdapterRegistry {
    /// Registry with the built-in optional, list, and map adapters.
    #[must_use]
    pub fn standard() -> Self {
        Self::builder().with_standard_adapters().build()
    }

    #[must_use]
    pub fn builder() -> TypeAdapterRegistryBuilder {
        TypeAdapterRegistryBuilder::default()
    }

    /// Apply the first applicable wrapper adapter, one layer only.
    ///
    /// Returns `None` for `null` and for empty wrappers.
    #[must_use]
    pub fn unwrap<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let unwrapped = match self.wrappers.iter().find(|w| w.adapter.applies_to(value)) {
            Some(wrapper) => wrapper.adapter.unwrap(value)?,
            None => value,
        };
        (!unwrapped.is_null()).then_some(unwrapped)
    }

    #[must_use]
    pub fn is_iterable(&self, value: &Value) -> bool {
        Shape::of(value).is_iterable()
    }

    /// Iterate a sequence or associative value.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::MissingIterableAdapter`] when no adapter
    /// handles the value's shape. This is a registry misconfiguration.
    pub fn iterate<'a>(
        &self,
        value: &'a Value,
    ) -> Result<Box<dyn Iterator<Item = (InstanceKey, &'a Value)> + 'a>, ExtractionError> {
        let shape = Shape::of(value);
        self.iterables
            .iter()
            .find(|a| a.shape() == shape)
            .map(|a| a.iter(value))
            .ok_or_else(|| ExtractionError::MissingIterableAdapter {
                shape,
                type_name: value.type_name().to_owned(),
            })
    }
}

/// Accumulates adapters and freezes them into a [`TypeAdapterRegistry`].
#[derive(Debug, Default)]
pub struct TypeAdapterRegistryBuilder {
    wrappers: Vec<RegisteredWrapper>,
    iterables: Vec<Arc<dyn IterableAdapter>>,
}

impl TypeAdapterRegistryBuilder {
    /// Register the optional wrapper at priority 0 and the list and map iterables.
    #[must_use]
    pub fn with_standard_adapters(self) -> Self {
        self.wrapper(0, OptionalAdapter)
            .iterable(ListAdapter)
            .iterable(MapAdapter)
    }

    /// Register a wrapper adapter. Lower priorities are consulted first.
    #[must_use]
    pub fn wrapper(mut self, priority: i32, adapter: impl WrapperAdapter + 'static) -> Self {
        self.wrappers.push(RegisteredWrapper {
            priority,
            adapter: Arc::new(adapter),
        });
        self
    }

    /// Register an iterable adapter. A later adapter for the same shape is ignored.
    #[must_use]
    pub fn iterable(mut self, adapter: impl IterableAdapter + 'static) -> Self {
        self.iterables.push(Arc::new(adapter));
        self
    }

    #[must_use]
    pub fn build(mut self) -> TypeAdapterRegistry {
        // Stable sort keeps registration order among equal priorities.
        self.wrappers.sort_by_key(|w| w.priority);
        TypeAdapterRegistry {
            wrappers: self.wrappers,
            iterables: self.iterables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Entity;

    /// Treats `Holder` entities as wrappers around their `value` field.
    #[derive(Debug)]
    struct HolderAdapter;

    impl WrapperAdapter for HolderAdapter {
        fn applies_to(&self, value: &Value) -> bool {
            matches!(value, Value::Entity(e) if e.type_name() == "Holder")
        }

        fn unwrap<'a>(&self, value: &'a Value) -> Option<&'a Value> {
            match value {
                Value::Entity(e) => e.get("value"),
                _ => None,
            }
        }
    }

    #[derive(Debug)]
    struct AlwaysNone;

    impl WrapperAdapter for AlwaysNone {
        fn applies_to(&self, _value: &Value) -> bool {
            true
        }

        fn unwrap<'a>(&self, _value: &'a Value) -> Option<&'a Value> {
            None
        }
    }

    #[test]
    fn shape_classification() {
        assert_eq!(Shape::of(&Value::list([])), Shape::Sequence);
        assert_eq!(Shape::of(&Value::map::<&str>([])), Shape::Associative);
        assert_eq!(Shape::of(&Value::none()), Shape::Wrapped);
        assert_eq!(Shape::of(&Value::from(1_i64)), Shape::Scalar);
        assert_eq!(Shape::of(&Value::from(Entity::new("Policy"))), Shape::Scalar);
    }

    #[test]
    fn standard_unwraps_optional_once() {
        let registry = TypeAdapterRegistry::standard();
        let nested = Value::some(Value::some(5_i64));
        assert_eq!(registry.unwrap(&nested), Some(&Value::some(5_i64)));
        assert_eq!(registry.unwrap(&Value::none()), None);
        assert_eq!(registry.unwrap(&Value::Null), None);
        assert_eq!(registry.unwrap(&Value::from(1_i64)), Some(&Value::from(1_i64)));
    }

    #[test]
    fn custom_wrapper_is_consulted() {
        let registry = TypeAdapterRegistry::builder()
            .with_standard_adapters()
            .wrapper(10, HolderAdapter)
            .build();
        let holder = Value::from(Entity::new("Holder").field("value", "inner"));
        assert_eq!(registry.unwrap(&holder), Some(&Value::from("inner")));
    }

    #[test]
    fn lower_priority_wins() {
        let registry = TypeAdapterRegistry::builder()
            .wrapper(5, OptionalAdapter)
            .wrapper(1, AlwaysNone)
            .build();
        assert_eq!(registry.unwrap(&Value::some(1_i64)), None);
    }

    #[test]
    fn equal_priority_keeps_registration_order() {
        let registry = TypeAdapterRegistry::builder()
            .wrapper(0, OptionalAdapter)
            .wrapper(0, AlwaysNone)
            .build();
        assert_eq!(registry.unwrap(&Value::some(1_i64)), Some(&Value::from(1_i64)));
    }

    #[test]
    fn iterate_map_in_insertion_order() {
        let registry = TypeAdapterRegistry::standard();
        let map = Value::map([("b", Value::from(2_i64)), ("a", Value::from(1_i64))]);
        let keys: Vec<InstanceKey> = registry.iterate(&map).unwrap().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![InstanceKey::Key("b".into()), InstanceKey::Key("a".into())]
        );
    }

    #[test]
    fn missing_iterable_adapter_is_reported() {
        let registry = TypeAdapterRegistry::builder().iterable(ListAdapter).build();
        let err = registry.iterate(&Value::map::<&str>([])).err().unwrap();
        assert!(matches!(
            err,
            ExtractionError::MissingIterableAdapter {
                shape: Shape::Associative,
                ..
            }
        ));
    }
}
