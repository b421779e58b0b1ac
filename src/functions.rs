//! Function registry and the built-in function library.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use tracing::debug;

use crate::numeric::{self, ArithmeticError};
use crate::{EvaluationContext, Value};

/// Signature every registered function implements.
pub type FunctionBody =
    dyn Fn(&[Value], &EvaluationContext) -> Result<Value, FunctionError> + Send + Sync;

/// Failures a function body reports.
///
/// [`FunctionError::BusinessSkip`] is the intentional "cannot evaluate, treat
/// the rule as not applicable" signal. Every other variant is a technical
/// failure.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("{reason}")]
    BusinessSkip { reason: String },

    #[error("expected {expected} argument(s), got {actual}")]
    Arity { expected: &'static str, actual: usize },

    #[error("argument {position} must be {expected}, found {found}")]
    Argument {
        position: usize,
        expected: &'static str,
        found: String,
    },

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error("{0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl FunctionError {
    #[must_use]
    pub fn business(reason: impl Into<String>) -> Self {
        FunctionError::BusinessSkip {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        FunctionError::Failed(error.into())
    }
}

/// Named functions callable from expressions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<FunctionBody>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in library.
    #[must_use]
    pub fn with_builtins() -> Self {
        let builtins: [(&str, fn(&[Value], &EvaluationContext) -> Result<Value, FunctionError>); 23] = [
            ("Count", count),
            ("Sum", sum),
            ("Avg", avg),
            ("Min", min),
            ("Max", max),
            ("Round", round),
            ("RoundEven", round_even),
            ("Floor", floor),
            ("Ceil", ceil),
            ("Abs", abs),
            ("InNumberSet", in_number_set),
            ("Today", today),
            ("Now", now),
            ("Date", date),
            ("DateTime", date_time),
            ("PlusDays", plus_days),
            ("Year", year),
            ("IsEmpty", is_empty),
            ("Concat", concat),
            ("Upper", upper),
            ("Lower", lower),
            ("Length", length),
            ("Flat", flat),
        ];
        let mut registry = Self::new();
        for (name, body) in builtins {
            registry.functions.insert(name.to_owned(), Arc::new(body));
        }
        registry
    }

    /// Register `body` under `name`, replacing any existing function.
    #[must_use]
    pub fn register<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&[Value], &EvaluationContext) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        if self.functions.insert(name.to_owned(), Arc::new(body)).is_some() {
            debug!(function = name, "replaced registered function");
        }
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<FunctionBody>> {
        self.functions.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

// -- Argument helpers -------------------------------------------------------

fn expect_arity(args: &[Value], range: std::ops::RangeInclusive<usize>, expected: &'static str) -> Result<(), FunctionError> {
    if range.contains(&args.len()) {
        Ok(())
    } else {
        Err(FunctionError::Arity {
            expected,
            actual: args.len(),
        })
    }
}

fn argument_error(position: usize, expected: &'static str, found: &Value) -> FunctionError {
    FunctionError::Argument {
        position,
        expected,
        found: found.type_name().to_owned(),
    }
}

fn number_arg(args: &[Value], position: usize) -> Result<Option<Decimal>, FunctionError> {
    match args.get(position) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_number()
            .map(Some)
            .ok_or_else(|| argument_error(position, "a number", v)),
    }
}

fn scale_arg(args: &[Value], position: usize) -> Result<Option<u32>, FunctionError> {
    let Some(scale) = number_arg(args, position)? else {
        return Ok(None);
    };
    scale
        .to_u32()
        .filter(|_| scale.fract().is_zero())
        .map(Some)
        .ok_or_else(|| argument_error(position, "a non-negative integer", &Value::Number(scale)))
}

fn string_arg(args: &[Value], position: usize) -> Result<Option<&str>, FunctionError> {
    match args.get(position) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(argument_error(position, "a string", other)),
    }
}

fn items(args: &[Value], position: usize) -> Result<Vec<&Value>, FunctionError> {
    match args.get(position) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::List(items)) => Ok(items.iter().filter(|v| !v.is_null()).collect()),
        Some(Value::Map(entries)) => Ok(entries.values().filter(|v| !v.is_null()).collect()),
        Some(other) => Err(argument_error(position, "a collection", other)),
    }
}

fn numbers(args: &[Value]) -> Result<Vec<Decimal>, FunctionError> {
    items(args, 0)?
        .into_iter()
        .map(|v| v.as_number().ok_or_else(|| argument_error(0, "a collection of numbers", v)))
        .collect()
}

// -- Aggregates -------------------------------------------------------------

fn count(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    Ok(Value::from(Decimal::from(items(args, 0)?.len())))
}

fn sum(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    let total = numbers(args)?
        .into_iter()
        .try_fold(Decimal::ZERO, numeric::add)?;
    Ok(Value::Number(total))
}

fn avg(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    let values = numbers(args)?;
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let total = values.iter().copied().try_fold(Decimal::ZERO, numeric::add)?;
    Ok(Value::Number(numeric::divide(total, Decimal::from(values.len()))?))
}

fn extreme(args: &[Value], pick_greater: bool) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    let mut best: Option<&Value> = None;
    for candidate in items(args, 0)? {
        let replace = match (best, candidate) {
            (None, Value::Number(_) | Value::Money(_) | Value::Date(_) | Value::DateTime(_)) => true,
            (None, other) => return Err(argument_error(0, "a collection of numbers or dates", other)),
            (Some(current), _) => {
                let ordering = match (current, candidate) {
                    (Value::Date(a), Value::Date(b)) => b.cmp(a),
                    (Value::DateTime(a), Value::DateTime(b)) => b.cmp(a),
                    (a, b) => match (a.as_number(), b.as_number()) {
                        (Some(a), Some(b)) => numeric::compare(b, a),
                        _ => return Err(argument_error(0, "a homogeneous collection", candidate)),
                    },
                };
                if pick_greater {
                    ordering.is_gt()
                } else {
                    ordering.is_lt()
                }
            }
        };
        if replace {
            best = Some(candidate);
        }
    }
    Ok(best.cloned().unwrap_or(Value::Null))
}

fn min(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    extreme(args, false)
}

fn max(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    extreme(args, true)
}

fn flat(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    fn push_flat(value: &Value, out: &mut Vec<Value>) {
        match value {
            Value::List(items) => items.iter().for_each(|v| push_flat(v, out)),
            Value::Null => {}
            other => out.push(other.clone()),
        }
    }
    expect_arity(args, 1..=1, "1")?;
    let mut out = Vec::new();
    push_flat(&args[0], &mut out);
    Ok(Value::List(out))
}

// -- Numeric ----------------------------------------------------------------

fn rounding(
    args: &[Value],
    whole: fn(Decimal) -> Decimal,
    scaled: fn(Decimal, u32) -> Decimal,
) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=2, "1 or 2")?;
    let Some(n) = number_arg(args, 0)? else {
        return Ok(Value::Null);
    };
    Ok(Value::Number(match scale_arg(args, 1)? {
        Some(scale) => scaled(n, scale),
        None => whole(n),
    }))
}

fn round(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    rounding(args, numeric::round, numeric::round_to)
}

fn round_even(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    rounding(args, numeric::round_even, numeric::round_even_to)
}

fn unary_numeric(args: &[Value], f: fn(Decimal) -> Decimal) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    Ok(number_arg(args, 0)?.map_or(Value::Null, |n| Value::Number(f(n))))
}

fn floor(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    unary_numeric(args, numeric::floor)
}

fn ceil(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    unary_numeric(args, numeric::ceil)
}

fn abs(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    unary_numeric(args, numeric::abs)
}

fn in_number_set(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 4..=4, "4")?;
    let Some(value) = number_arg(args, 0)? else {
        return Ok(Value::Bool(false));
    };
    let member = numeric::is_value_in_number_set(
        value,
        number_arg(args, 1)?,
        number_arg(args, 2)?,
        number_arg(args, 3)?,
    )?;
    Ok(Value::Bool(member))
}

// -- Dates ------------------------------------------------------------------

fn today(args: &[Value], ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 0..=0, "0")?;
    Ok(Value::Date(ctx.today()))
}

fn now(args: &[Value], ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 0..=0, "0")?;
    Ok(Value::DateTime(ctx.now()))
}

fn date(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Date(d) => Ok(Value::Date(*d)),
        Value::DateTime(dt) => Ok(Value::Date(dt.date())),
        Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Value::Date)
            .map_err(FunctionError::failed),
        other => Err(argument_error(0, "a date string", other)),
    }
}

fn date_time(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
        Value::Date(d) => Ok(Value::DateTime(d.and_time(chrono::NaiveTime::MIN))),
        Value::String(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
            .map(Value::DateTime)
            .map_err(FunctionError::failed),
        other => Err(argument_error(0, "a datetime string", other)),
    }
}

fn plus_days(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 2..=2, "2")?;
    let Some(days) = number_arg(args, 1)? else {
        return Ok(Value::Null);
    };
    let days = days
        .to_i64()
        .filter(|_| days.fract().is_zero())
        .ok_or_else(|| argument_error(1, "an integer", &args[1]))?;
    let delta = Days::new(days.unsigned_abs());
    let shifted = match &args[0] {
        Value::Null => return Ok(Value::Null),
        Value::Date(d) if days >= 0 => d.checked_add_days(delta).map(Value::Date),
        Value::Date(d) => d.checked_sub_days(delta).map(Value::Date),
        Value::DateTime(dt) if days >= 0 => dt.checked_add_days(delta).map(Value::DateTime),
        Value::DateTime(dt) => dt.checked_sub_days(delta).map(Value::DateTime),
        other => return Err(argument_error(0, "a date", other)),
    };
    shifted.ok_or_else(|| FunctionError::failed("date out of range"))
}

fn year(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    match &args[0] {
        Value::Null => Ok(Value::Null),
        Value::Date(d) => Ok(Value::from(i64::from(d.year()))),
        Value::DateTime(dt) => Ok(Value::from(i64::from(dt.year()))),
        other => Err(argument_error(0, "a date", other)),
    }
}

// -- Strings & misc ---------------------------------------------------------

fn is_empty(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    let empty = match &args[0] {
        Value::Null | Value::Optional(None) => true,
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(entries) => entries.is_empty(),
        _ => false,
    };
    Ok(Value::Bool(empty))
}

fn concat(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    let parts: Vec<&Value> = match args {
        [Value::List(items)] => items.iter().collect(),
        _ => args.iter().collect(),
    };
    let mut out = String::new();
    for (position, part) in parts.into_iter().enumerate() {
        match part {
            Value::Null => {}
            Value::String(s) => out.push_str(s),
            other => return Err(argument_error(position, "a string", other)),
        }
    }
    Ok(Value::String(out))
}

fn upper(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    Ok(string_arg(args, 0)?.map_or(Value::Null, |s| Value::String(s.to_uppercase())))
}

fn lower(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    Ok(string_arg(args, 0)?.map_or(Value::Null, |s| Value::String(s.to_lowercase())))
}

fn length(args: &[Value], _ctx: &EvaluationContext) -> Result<Value, FunctionError> {
    expect_arity(args, 1..=1, "1")?;
    Ok(string_arg(args, 0)?
        .map_or(Value::Null, |s| Value::from(Decimal::from(s.chars().count()))))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn call(name: &str, args: &[Value]) -> Result<Value, FunctionError> {
        let registry = FunctionRegistry::with_builtins();
        let ctx = EvaluationContext::default()
            .with_clock(Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap());
        registry.get(name).unwrap()(args, &ctx)
    }

    fn n(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    fn list(items: &[&str]) -> Value {
        Value::list(items.iter().map(|s| n(s)))
    }

    #[test]
    fn aggregates() {
        let values = list(&["1.5", "2.25", "3"]);
        assert_eq!(call("Count", &[values.clone()]).unwrap(), n("3"));
        assert_eq!(call("Sum", &[values.clone()]).unwrap(), n("6.75"));
        assert_eq!(call("Avg", &[values.clone()]).unwrap(), n("2.25"));
        assert_eq!(call("Min", &[values.clone()]).unwrap(), n("1.5"));
        assert_eq!(call("Max", &[values]).unwrap(), n("3"));
    }

    #[test]
    fn aggregates_skip_nulls_and_handle_empty() {
        let values = Value::list([Value::Null, n("2")]);
        assert_eq!(call("Count", &[values.clone()]).unwrap(), n("1"));
        assert_eq!(call("Sum", &[Value::list([])]).unwrap(), n("0"));
        assert_eq!(call("Avg", &[Value::list([])]).unwrap(), Value::Null);
        assert_eq!(call("Max", &[Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn min_max_dates() {
        let early = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let late = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let dates = Value::list([Value::Date(late), Value::Date(early)]);
        assert_eq!(call("Min", &[dates.clone()]).unwrap(), Value::Date(early));
        assert_eq!(call("Max", &[dates]).unwrap(), Value::Date(late));
    }

    #[test]
    fn rounding_functions() {
        assert_eq!(call("Round", &[n("2.5")]).unwrap(), n("3"));
        assert_eq!(call("RoundEven", &[n("2.5")]).unwrap(), n("2"));
        assert_eq!(call("Round", &[n("1.2345"), n("2")]).unwrap(), n("1.23"));
        assert_eq!(call("Floor", &[n("1.9")]).unwrap(), n("1"));
        assert_eq!(call("Ceil", &[n("1.1")]).unwrap(), n("2"));
        assert_eq!(call("Abs", &[n("-4")]).unwrap(), n("4"));
        assert_eq!(call("Round", &[Value::Null]).unwrap(), Value::Null);
        assert!(matches!(
            call("Round", &[n("1"), n("-1")]),
            Err(FunctionError::Argument { position: 1, .. })
        ));
    }

    #[test]
    fn number_set() {
        let args = [n("2"), n("-4"), n("4"), n("3")];
        assert_eq!(call("InNumberSet", &args).unwrap(), Value::Bool(true));
        let args = [n("0"), n("-4"), n("4"), n("3")];
        assert_eq!(call("InNumberSet", &args).unwrap(), Value::Bool(false));
        let args = [n("11"), Value::Null, n("10"), Value::Null];
        assert_eq!(call("InNumberSet", &args).unwrap(), Value::Bool(false));
    }

    #[test]
    fn dates() {
        assert_eq!(
            call("Today", &[]).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
        );
        let parsed = call("Date", &[Value::from("2024-02-28")]).unwrap();
        assert_eq!(
            call("PlusDays", &[parsed.clone(), n("2")]).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(
            call("PlusDays", &[parsed.clone(), n("-28")]).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap())
        );
        assert_eq!(call("Year", &[parsed]).unwrap(), n("2024"));
        assert!(matches!(
            call("Date", &[Value::from("28/02/2024")]),
            Err(FunctionError::Failed(_))
        ));
        assert!(matches!(
            call("DateTime", &[Value::from("2024-02-28 10:00:00")]),
            Ok(Value::DateTime(_))
        ));
    }

    #[test]
    fn strings() {
        assert_eq!(
            call("Concat", &[Value::from("a"), Value::Null, Value::from("b")]).unwrap(),
            Value::from("ab")
        );
        assert_eq!(
            call("Concat", &[Value::list([Value::from("x"), Value::from("y")])]).unwrap(),
            Value::from("xy")
        );
        assert_eq!(call("Upper", &[Value::from("ca")]).unwrap(), Value::from("CA"));
        assert_eq!(call("Lower", &[Value::from("CA")]).unwrap(), Value::from("ca"));
        assert_eq!(call("Length", &[Value::from("héllo")]).unwrap(), n("5"));
        assert_eq!(call("IsEmpty", &[Value::from("")]).unwrap(), Value::Bool(true));
        assert_eq!(call("IsEmpty", &[n("0")]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn flat_flattens_deeply() {
        let nested = Value::list([list(&["1"]), Value::list([list(&["2", "3"]), Value::Null])]);
        assert_eq!(call("Flat", &[nested]).unwrap(), list(&["1", "2", "3"]));
    }

    #[test]
    fn arity_is_checked() {
        assert!(matches!(
            call("Count", &[]),
            Err(FunctionError::Arity { actual: 0, .. })
        ));
    }

    #[test]
    fn register_replaces_and_reports() {
        let registry = FunctionRegistry::with_builtins()
            .register("Count", |_, _| Ok(Value::from(42_i64)));
        let ctx = EvaluationContext::default();
        assert_eq!(
            registry.get("Count").unwrap()(&[], &ctx).unwrap(),
            Value::from(42_i64)
        );
        assert!(registry.contains("Sum"));
        assert!(format!("{registry:?}").contains("Count"));
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            FunctionError::business("no rating available").to_string(),
            "no rating available"
        );
        assert_eq!(
            FunctionError::Arity {
                expected: "1",
                actual: 3
            }
            .to_string(),
            "expected 1 argument(s), got 3"
        );
    }
}
