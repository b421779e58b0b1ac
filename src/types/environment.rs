use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

use super::Value;

/// Per-call evaluation settings, passed explicitly to every evaluation.
///
/// Holds the timezone date functions observe and an optional fixed clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    zone: Tz,
    clock: Option<DateTime<Utc>>,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self {
            zone: Tz::UTC,
            clock: None,
        }
    }
}

impl EvaluationContext {
    #[must_use]
    pub fn new(zone: Tz) -> Self {
        Self { zone, clock: None }
    }

    /// Pin the current instant, e.g. for reproducible `Today()`.
    #[must_use]
    pub fn with_clock(mut self, instant: DateTime<Utc>) -> Self {
        self.clock = Some(instant);
        self
    }

    #[must_use]
    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Local wall-clock time in the context's zone.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.clock
            .unwrap_or_else(Utc::now)
            .with_timezone(&self.zone)
            .naive_local()
    }

    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// The variables an expression is evaluated against: the primary data object,
/// named variables, and cross-context references supplied by the caller.
#[derive(Debug, Clone)]
pub struct Environment<'a> {
    data: &'a Value,
    variables: HashMap<String, Value>,
    cross_context: HashMap<String, &'a Value>,
}

impl<'a> Environment<'a> {
    #[must_use]
    pub fn new(data: &'a Value) -> Self {
        Self {
            data,
            variables: HashMap::new(),
            cross_context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_variable(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.variables.insert(name.to_owned(), value.into());
        self
    }

    /// Supply the data context a cross-context reference named `name` resolves to.
    #[must_use]
    pub fn with_cross_context(mut self, name: &str, context: &'a Value) -> Self {
        self.cross_context.insert(name.to_owned(), context);
        self
    }

    #[must_use]
    pub fn data(&self) -> &'a Value {
        self.data
    }

    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    #[must_use]
    pub fn cross_context(&self, name: &str) -> Option<&'a Value> {
        self.cross_context.get(name).copied()
    }
}
