use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use rust_decimal::Decimal;

use super::entity::Entity;
use crate::numeric::{self, ArithmeticError};

/// A monetary amount. Arithmetic and rendering use the numeric component.
#[derive(Debug, Clone, PartialEq)]
pub struct Money {
    pub amount: Decimal,
    pub currency: String,
}

impl Money {
    #[must_use]
    pub fn new(amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            amount: numeric::normalize(amount),
            currency: currency.into(),
        }
    }
}

/// A node of the dynamically typed object graph rules evaluate over.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    Bool(bool),
    /// A decimal normalized to the kernel precision.
    Number(Decimal),
    String(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Money(Money),
    /// An ordered sequence.
    List(Vec<Value>),
    /// A string-keyed associative container. Missing keys read as [`Value::Null`].
    Map(IndexMap<String, Value>),
    /// An optional-like wrapper around a single value.
    Optional(Option<Box<Value>>),
    /// A strongly typed object. Reading an undeclared field is an error.
    Entity(Entity),
}

impl Value {
    /// A number, normalized to the kernel precision.
    #[must_use]
    pub fn number(n: Decimal) -> Self {
        Value::Number(numeric::normalize(n))
    }

    /// Parse a decimal literal into a normalized number.
    ///
    /// # Errors
    ///
    /// Returns [`ArithmeticError::InvalidNumber`] if `literal` is not a decimal.
    pub fn parse_number(literal: &str) -> Result<Self, ArithmeticError> {
        numeric::parse(literal).map(Value::Number)
    }

    #[must_use]
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    #[must_use]
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    #[must_use]
    pub fn some(inner: impl Into<Value>) -> Self {
        Value::Optional(Some(Box::new(inner.into())))
    }

    #[must_use]
    pub fn none() -> Self {
        Value::Optional(None)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The numeric component of a number or a monetary amount.
    #[must_use]
    pub fn as_number(&self) -> Option<Decimal> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Money(m) => Some(m.amount),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Type name used in diagnostics, type guards, and instance context names.
    /// Entities report their declared type.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Money(_) => "Money",
            Value::List(_) => "List",
            Value::Map(_) => "Map",
            Value::Optional(_) => "Optional",
            Value::Entity(e) => e.type_name(),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Number(Decimal::from(v))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(Decimal::from(v))
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::number(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<Money> for Value {
    fn from(v: Money) -> Self {
        Value::Money(v)
    }
}

impl From<Entity> for Value {
    fn from(v: Entity) -> Self {
        Value::Entity(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Number(v) => write!(f, "{}", numeric::to_plain_string(*v)),
            Value::String(v) => write!(f, "\"{v}\""),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%dT%H:%M:%S")),
            Value::Money(m) => write!(f, "{} {}", numeric::to_plain_string(m.amount), m.currency),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::Optional(Some(inner)) => write!(f, "Some({inner})"),
            Value::Optional(None) => write!(f, "None"),
            Value::Entity(e) => write!(f, "{e}"),
        }
    }
}
