use std::fmt;

use super::Value;

/// Position of an instance inside the collection it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstanceKey {
    Index(usize),
    Key(String),
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKey::Index(i) => write!(f, "[{i}]"),
            InstanceKey::Key(k) => write!(f, "['{k}']"),
        }
    }
}

/// One data object a rule is evaluated against.
///
/// Borrows the underlying value; extraction never copies domain objects.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedInstance<'a> {
    value: &'a Value,
    id: String,
    context_name: String,
    key: Option<InstanceKey>,
}

impl<'a> ExtractedInstance<'a> {
    pub(crate) fn new(value: &'a Value, origin: &str, key: Option<InstanceKey>) -> Self {
        let id = match value {
            Value::Entity(entity) => match entity.id() {
                Some(id) => format!("{}:{id}", entity.type_name()),
                None => origin.to_owned(),
            },
            _ => origin.to_owned(),
        };
        Self {
            value,
            id,
            context_name: value.type_name().to_owned(),
            key,
        }
    }

    #[must_use]
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Identity used to correlate events: `Type:id` for identified entities,
    /// otherwise the navigation origin with collection keys appended.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    #[must_use]
    pub fn key(&self) -> Option<&InstanceKey> {
        self.key.as_ref()
    }
}
