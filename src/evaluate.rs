//! Interprets compiled expressions over a data object.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::adapter::TypeAdapterRegistry;
use crate::extract::ExtractionError;
use crate::functions::{FunctionError, FunctionRegistry};
use crate::numeric::{self, ArithmeticError};
use crate::parse::{parse_path, PathParseError, PathSegment};
use crate::template::{render_value, TemplateMessage};
use crate::types::{
    BinaryOp, CompiledExpression, Diagnostic, Environment, EvaluationContext, EvaluationReport,
    Expr, Quantifier, UnaryOp, Value,
};

/// Nesting limit applied when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 256;

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PropertyResolutionError {
    #[error("property '{property}' is not defined on {type_name}")]
    Undefined { property: String, type_name: String },

    #[error("cannot access property '{property}' of {type_name}")]
    NotAnObject { property: String, type_name: String },
}

/// The technical cause of a failed evaluation.
#[derive(Debug, Error)]
pub enum EvaluationFailure {
    #[error(transparent)]
    PropertyResolution(#[from] PropertyResolutionError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    InvalidPath(#[from] PathParseError),

    #[error("operator '{operator}' expected {expected}, found {found}")]
    TypeMismatch {
        operator: String,
        expected: &'static str,
        found: String,
    },

    #[error("cannot index {target} with {index}")]
    InvalidIndex { target: String, index: String },

    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("function '{name}' failed: {source}")]
    Function {
        name: String,
        #[source]
        source: FunctionError,
    },

    #[error("expression nesting exceeds {limit} levels")]
    RecursionLimit { limit: usize },

    #[error("cannot assign through '{segment}': {reason}")]
    Assignment { segment: String, reason: String },
}

/// Failure of a single expression evaluation.
///
/// Exactly two outcomes exist besides success: a technical failure the caller
/// may abort on, and an intentional business skip that excludes the containing
/// rule while sibling rules continue.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to evaluate '{expression}': {source}")]
    Technical {
        expression: String,
        #[source]
        source: EvaluationFailure,
    },

    #[error("evaluation of '{expression}' skipped: {reason}")]
    BusinessSkip { expression: String, reason: String },
}

impl EvaluationError {
    #[must_use]
    pub fn is_business_skip(&self) -> bool {
        matches!(self, EvaluationError::BusinessSkip { .. })
    }

    /// Text of the expression (or assignment path) that failed.
    #[must_use]
    pub fn expression(&self) -> &str {
        match self {
            EvaluationError::Technical { expression, .. }
            | EvaluationError::BusinessSkip { expression, .. } => expression,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&EvaluationFailure> {
        match self {
            EvaluationError::Technical { source, .. } => Some(source),
            EvaluationError::BusinessSkip { .. } => None,
        }
    }
}

/// Strategy for reading and writing named properties of values.
pub trait PropertyAccessor: Send + Sync + fmt::Debug {
    /// Read `property` of `object`.
    ///
    /// # Errors
    ///
    /// Fails when the property cannot exist on `object`.
    fn get(&self, object: &Value, property: &str) -> Result<Value, PropertyResolutionError>;

    /// Write `property` of `object`.
    ///
    /// # Errors
    ///
    /// Fails when the property cannot be set on `object`.
    fn set(&self, object: &mut Value, property: &str, value: Value) -> Result<(), PropertyResolutionError>;
}

/// Entities must declare the property; maps yield `null` for missing keys;
/// lists project the property over their elements, flattening and dropping
/// nulls; `null` propagates.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPropertyAccessor;

impl PropertyAccessor for DefaultPropertyAccessor {
    fn get(&self, object: &Value, property: &str) -> Result<Value, PropertyResolutionError> {
        match object {
            Value::Null | Value::Optional(None) => Ok(Value::Null),
            Value::Optional(Some(inner)) => self.get(inner, property),
            Value::Map(entries) => Ok(entries.get(property).cloned().unwrap_or_default()),
            Value::Entity(entity) => {
                entity
                    .get(property)
                    .cloned()
                    .ok_or_else(|| PropertyResolutionError::Undefined {
                        property: property.to_owned(),
                        type_name: entity.type_name().to_owned(),
                    })
            }
            Value::List(items) => {
                let mut projected = Vec::with_capacity(items.len());
                for item in items {
                    match self.get(item, property)? {
                        Value::Null => {}
                        Value::List(nested) => projected.extend(nested),
                        other => projected.push(other),
                    }
                }
                Ok(Value::List(projected))
            }
            Value::Money(money) => match property {
                "amount" => Ok(Value::Number(money.amount)),
                "currency" => Ok(Value::String(money.currency.clone())),
                _ => Err(PropertyResolutionError::Undefined {
                    property: property.to_owned(),
                    type_name: "Money".to_owned(),
                }),
            },
            other => Err(PropertyResolutionError::NotAnObject {
                property: property.to_owned(),
                type_name: other.type_name().to_owned(),
            }),
        }
    }

    fn set(&self, object: &mut Value, property: &str, value: Value) -> Result<(), PropertyResolutionError> {
        match object {
            Value::Optional(Some(inner)) => self.set(inner, property, value),
            Value::Map(entries) => {
                entries.insert(property.to_owned(), value);
                Ok(())
            }
            Value::Entity(entity) => {
                let type_name = entity.type_name().to_owned();
                match entity.get_mut(property) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(PropertyResolutionError::Undefined {
                        property: property.to_owned(),
                        type_name,
                    }),
                }
            }
            other => Err(PropertyResolutionError::NotAnObject {
                property: property.to_owned(),
                type_name: other.type_name().to_owned(),
            }),
        }
    }
}

/// Configured, immutable expression interpreter. Cheap to clone and safe to
/// share across threads; all per-call state lives in the call.
#[derive(Debug, Clone)]
pub struct Evaluator {
    functions: Arc<FunctionRegistry>,
    accessor: Arc<dyn PropertyAccessor>,
    adapters: Arc<TypeAdapterRegistry>,
    max_depth: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Builder for an [`Evaluator`].
#[derive(Debug)]
pub struct EvaluatorBuilder {
    functions: FunctionRegistry,
    accessor: Arc<dyn PropertyAccessor>,
    adapters: Arc<TypeAdapterRegistry>,
    max_depth: usize,
}

impl Default for EvaluatorBuilder {
    fn default() -> Self {
        Self {
            functions: FunctionRegistry::with_builtins(),
            accessor: Arc::new(DefaultPropertyAccessor),
            adapters: Arc::new(TypeAdapterRegistry::standard()),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl EvaluatorBuilder {
    /// Register a function, replacing any built-in or earlier registration of
    /// the same name.
    ///
    /// Returned errors become [`EvaluationError`]s: [`FunctionError::BusinessSkip`]
    /// a business skip, anything else a technical failure with the original
    /// error kept as its source.
    ///
    /// # Panics
    ///
    /// A panic inside `body` is not caught. It unwinds through the
    /// `evaluate*` call that invoked the function. Report failures through
    /// [`FunctionError::failed`] instead.
    #[must_use]
    pub fn function<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&[Value], &EvaluationContext) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.functions = self.functions.register(name, body);
        self
    }

    /// Replace the whole function registry, built-ins included.
    #[must_use]
    pub fn functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    #[must_use]
    pub fn property_accessor(mut self, accessor: impl PropertyAccessor + 'static) -> Self {
        self.accessor = Arc::new(accessor);
        self
    }

    #[must_use]
    pub fn adapters(mut self, adapters: Arc<TypeAdapterRegistry>) -> Self {
        self.adapters = adapters;
        self
    }

    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn build(self) -> Evaluator {
        Evaluator {
            functions: Arc::new(self.functions),
            accessor: self.accessor,
            adapters: self.adapters,
            max_depth: self.max_depth,
        }
    }
}

impl Evaluator {
    #[must_use]
    pub fn builder() -> EvaluatorBuilder {
        EvaluatorBuilder::default()
    }

    #[must_use]
    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Evaluate `expression` against `env`.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::Technical`] on any evaluation failure and
    /// [`EvaluationError::BusinessSkip`] when a function signals that the
    /// containing rule does not apply.
    pub fn evaluate(
        &self,
        expression: &CompiledExpression,
        env: &Environment<'_>,
        ctx: &EvaluationContext,
    ) -> Result<Value, EvaluationError> {
        self.run(expression, env, ctx).0
    }

    /// Evaluate with diagnostics and timing.
    pub fn evaluate_detailed(
        &self,
        expression: &CompiledExpression,
        env: &Environment<'_>,
        ctx: &EvaluationContext,
    ) -> EvaluationReport {
        let started = Instant::now();
        let (result, diagnostics) = self.run(expression, env, ctx);
        EvaluationReport::new(result, diagnostics, started.elapsed())
    }

    /// Evaluate a condition. `null` counts as `false`.
    ///
    /// # Errors
    ///
    /// As [`evaluate`](Self::evaluate), plus a technical error when the
    /// result is neither boolean nor `null`.
    pub fn evaluate_condition(
        &self,
        expression: &CompiledExpression,
        env: &Environment<'_>,
        ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError> {
        let value = self.evaluate(expression, env, ctx)?;
        truth(&value, "condition").map_err(|fault| fault.into_error(expression))
    }

    /// Assign `value` into `target` along the attribute `path`.
    ///
    /// Intermediate segments must exist and be non-null. Entities only accept
    /// declared fields; maps accept any key; list indices must be in bounds.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluationError::Technical`] naming `path` when the path is
    /// malformed or cannot be followed or assigned.
    pub fn evaluate_set_expression(
        &self,
        value: Value,
        path: &str,
        target: &mut Value,
    ) -> Result<(), EvaluationError> {
        let wrap = |source: EvaluationFailure| EvaluationError::Technical {
            expression: path.to_owned(),
            source,
        };
        let segments = parse_path(path).map_err(|e| wrap(e.into()))?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(wrap(EvaluationFailure::Assignment {
                segment: path.to_owned(),
                reason: "empty path".to_owned(),
            }));
        };
        let mut cursor = target;
        for segment in parents {
            cursor = step_mut(cursor, segment).map_err(wrap)?;
        }
        assign(self.accessor.as_ref(), cursor, last, value).map_err(wrap)
    }

    /// Render each expression of `message` for display.
    ///
    /// # Errors
    ///
    /// Propagates the first evaluation error.
    pub fn evaluate_template_variables(
        &self,
        message: &TemplateMessage,
        env: &Environment<'_>,
        ctx: &EvaluationContext,
    ) -> Result<Vec<String>, EvaluationError> {
        message
            .expressions()
            .iter()
            .map(|expression| {
                self.evaluate(expression, env, ctx)
                    .map(|value| render_value(&value))
            })
            .collect()
    }

    fn run(
        &self,
        expression: &CompiledExpression,
        env: &Environment<'_>,
        ctx: &EvaluationContext,
    ) -> (Result<Value, EvaluationError>, Vec<Diagnostic>) {
        if let Some(literal) = expression.literal() {
            return (Ok(literal.clone()), Vec::new());
        }
        let mut interpreter = Interpreter {
            evaluator: self,
            env,
            ctx,
            cross_context: expression.cross_context_names().collect(),
            scopes: Vec::new(),
            this_stack: Vec::new(),
            depth: 0,
            diagnostics: Vec::new(),
        };
        let result = interpreter
            .eval(expression.ast())
            .map_err(|fault| fault.into_error(expression));
        (result, interpreter.diagnostics)
    }
}

enum Fault {
    Technical(EvaluationFailure),
    Business(String),
}

impl Fault {
    fn into_error(self, expression: &impl fmt::Display) -> EvaluationError {
        match self {
            Fault::Technical(source) => EvaluationError::Technical {
                expression: expression.to_string(),
                source,
            },
            Fault::Business(reason) => EvaluationError::BusinessSkip {
                expression: expression.to_string(),
                reason,
            },
        }
    }
}

impl From<EvaluationFailure> for Fault {
    fn from(failure: EvaluationFailure) -> Self {
        Fault::Technical(failure)
    }
}

impl From<ArithmeticError> for Fault {
    fn from(error: ArithmeticError) -> Self {
        Fault::Technical(error.into())
    }
}

impl From<PropertyResolutionError> for Fault {
    fn from(error: PropertyResolutionError) -> Self {
        Fault::Technical(error.into())
    }
}

impl From<ExtractionError> for Fault {
    fn from(error: ExtractionError) -> Self {
        Fault::Technical(error.into())
    }
}

struct Interpreter<'e, 'a> {
    evaluator: &'e Evaluator,
    env: &'e Environment<'a>,
    ctx: &'e EvaluationContext,
    cross_context: HashSet<&'e str>,
    scopes: Vec<(String, Value)>,
    this_stack: Vec<Value>,
    depth: usize,
    diagnostics: Vec<Diagnostic>,
}

impl Interpreter<'_, '_> {
    fn eval(&mut self, expr: &Expr) -> Result<Value, Fault> {
        if self.depth >= self.evaluator.max_depth {
            return Err(EvaluationFailure::RecursionLimit {
                limit: self.evaluator.max_depth,
            }
            .into());
        }
        self.depth += 1;
        let result = self.eval_node(expr);
        self.depth -= 1;
        result
    }

    fn eval_node(&mut self, expr: &Expr) -> Result<Value, Fault> {
        match expr {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::This => Ok(self.this().clone()),
            Expr::Ident(name) => self.resolve(name),
            Expr::Property(base, name) => {
                let base = self.eval(base)?;
                Ok(self.evaluator.accessor.get(&base, name)?)
            }
            Expr::Index(base, index) => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                self.index(&base, &index)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, &value)
            }
            Expr::Binary(BinaryOp::And, left, right) => {
                Ok(Value::Bool(self.truthy(left, "and")? && self.truthy(right, "and")?))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                Ok(Value::Bool(self.truthy(left, "or")? || self.truthy(right, "or")?))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, &left, &right)
            }
            Expr::Call(name, args) => self.call(name, args),
            Expr::Collection(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Filter {
                collection,
                predicate,
            } => {
                let source = self.eval(collection)?;
                let mut kept = Vec::new();
                for element in self.elements(&source)? {
                    self.this_stack.push(element);
                    let keep = self.truthy(predicate, "filter");
                    let element = self.this_stack.pop();
                    if keep? {
                        kept.extend(element);
                    }
                }
                Ok(Value::List(kept))
            }
            Expr::ForEach {
                var,
                collection,
                body,
            } => {
                let source = self.eval(collection)?;
                let mut mapped = Vec::new();
                for element in self.elements(&source)? {
                    self.scopes.push((var.clone(), element));
                    let value = self.eval(body);
                    self.scopes.pop();
                    mapped.push(value?);
                }
                Ok(Value::List(mapped))
            }
            Expr::Quantified {
                quantifier,
                var,
                collection,
                predicate,
            } => {
                let source = self.eval(collection)?;
                let looking_for = matches!(quantifier, Quantifier::Some);
                for element in self.elements(&source)? {
                    self.scopes.push((var.clone(), element));
                    let holds = self.truthy(predicate, "satisfies");
                    self.scopes.pop();
                    if holds? == looking_for {
                        return Ok(Value::Bool(looking_for));
                    }
                }
                Ok(Value::Bool(!looking_for))
            }
            Expr::If {
                condition,
                then,
                otherwise,
            } => {
                if self.truthy(condition, "if")? {
                    self.eval(then)
                } else {
                    otherwise
                        .as_deref()
                        .map_or(Ok(Value::Null), |otherwise| self.eval(otherwise))
                }
            }
            Expr::InstanceOf(value, type_name) => {
                let value = self.eval(value)?;
                Ok(Value::Bool(plain(&value).type_name() == type_name))
            }
            Expr::Cast(type_name, value) => {
                let value = self.eval(value)?;
                let inner = plain(&value);
                Ok(if inner.type_name() == type_name {
                    inner.clone()
                } else {
                    Value::Null
                })
            }
        }
    }

    fn this(&self) -> &Value {
        self.this_stack.last().unwrap_or(self.env.data())
    }

    /// Bound variables, then cross-context references, then named variables,
    /// then properties of the object in scope.
    fn resolve(&mut self, name: &str) -> Result<Value, Fault> {
        if let Some((_, value)) = self.scopes.iter().rev().find(|(bound, _)| bound == name) {
            return Ok(value.clone());
        }
        if self.cross_context.contains(name) {
            return Ok(match self.env.cross_context(name) {
                Some(context) => context.clone(),
                None => {
                    warn!(reference = name, "unresolved cross-context reference");
                    self.diagnostics.push(Diagnostic::UnresolvedReference {
                        name: name.to_owned(),
                    });
                    Value::Null
                }
            });
        }
        if let Some(value) = self.env.variable(name) {
            return Ok(value.clone());
        }
        Ok(self.evaluator.accessor.get(self.this(), name)?)
    }

    fn truthy(&mut self, expr: &Expr, operator: &str) -> Result<bool, Fault> {
        let value = self.eval(expr)?;
        truth(&value, operator)
    }

    /// Elements of a collection with nulls dropped; a scalar is a collection of one.
    fn elements(&self, value: &Value) -> Result<Vec<Value>, Fault> {
        let adapters = &self.evaluator.adapters;
        let Some(value) = adapters.unwrap(value) else {
            return Ok(Vec::new());
        };
        if !adapters.is_iterable(value) {
            return Ok(vec![value.clone()]);
        }
        Ok(adapters
            .iterate(value)?
            .filter(|(_, element)| !element.is_null())
            .map(|(_, element)| element.clone())
            .collect())
    }

    fn index(&self, base: &Value, index: &Value) -> Result<Value, Fault> {
        let Some(base) = self.evaluator.adapters.unwrap(base) else {
            return Ok(Value::Null);
        };
        match (base, plain(index)) {
            (_, Value::Null) => Ok(Value::Null),
            (Value::List(items), Value::Number(n)) if n.fract().is_zero() && *n >= Decimal::ZERO => {
                Ok(n.to_usize()
                    .and_then(|i| items.get(i))
                    .cloned()
                    .unwrap_or_default())
            }
            (Value::Map(entries), Value::String(key)) => {
                Ok(entries.get(key).cloned().unwrap_or_default())
            }
            (Value::Entity(_), Value::String(key)) => Ok(self.evaluator.accessor.get(base, key)?),
            (target, index) => Err(EvaluationFailure::InvalidIndex {
                target: target.type_name().to_owned(),
                index: index.to_string(),
            }
            .into()),
        }
    }

    fn binary(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Fault> {
        match op {
            BinaryOp::Add => arithmetic(op, left, right, numeric::add),
            BinaryOp::Sub => arithmetic(op, left, right, numeric::subtract),
            BinaryOp::Mul => arithmetic(op, left, right, numeric::multiply),
            BinaryOp::Div => arithmetic(op, left, right, numeric::divide),
            BinaryOp::Mod => arithmetic(op, left, right, numeric::modulus),
            BinaryOp::Pow => arithmetic(op, left, right, numeric::power),
            BinaryOp::Eq => Ok(Value::Bool(values_equal(left, right))),
            BinaryOp::Neq => Ok(Value::Bool(!values_equal(left, right))),
            BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
                let ordering = compare_values(op, left, right)?;
                Ok(Value::Bool(ordering.is_some_and(|o| match op {
                    BinaryOp::Lt => o.is_lt(),
                    BinaryOp::Lte => o.is_le(),
                    BinaryOp::Gt => o.is_gt(),
                    _ => o.is_ge(),
                })))
            }
            BinaryOp::And => Ok(Value::Bool(truth(left, "and")? && truth(right, "and")?)),
            BinaryOp::Or => Ok(Value::Bool(truth(left, "or")? || truth(right, "or")?)),
            BinaryOp::In => {
                let members = self.elements(right)?;
                Ok(Value::Bool(members.iter().any(|m| values_equal(left, m))))
            }
        }
    }

    fn call(&mut self, name: &str, args: &[Expr]) -> Result<Value, Fault> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(function) = self.evaluator.functions.get(name) else {
            return Err(EvaluationFailure::UnknownFunction {
                name: name.to_owned(),
            }
            .into());
        };
        function(&values, self.ctx).map_err(|error| match error {
            FunctionError::BusinessSkip { reason } => {
                debug!(function = name, %reason, "function signalled business skip");
                Fault::Business(reason)
            }
            source => Fault::Technical(EvaluationFailure::Function {
                name: name.to_owned(),
                source,
            }),
        })
    }
}

/// Look through optional wrappers.
fn plain(value: &Value) -> &Value {
    match value {
        Value::Optional(Some(inner)) => plain(inner),
        Value::Optional(None) => &NULL,
        other => other,
    }
}

fn truth(value: &Value, operator: &str) -> Result<bool, Fault> {
    match plain(value) {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(EvaluationFailure::TypeMismatch {
            operator: operator.to_owned(),
            expected: "a boolean",
            found: other.type_name().to_owned(),
        }
        .into()),
    }
}

fn unary(op: UnaryOp, value: &Value) -> Result<Value, Fault> {
    match (op, plain(value)) {
        (UnaryOp::Neg, Value::Null) => Ok(Value::Null),
        (UnaryOp::Neg, other) => match other.as_number() {
            Some(n) => Ok(Value::Number(numeric::subtract(Decimal::ZERO, n)?)),
            None => Err(EvaluationFailure::TypeMismatch {
                operator: op.to_string(),
                expected: "a number",
                found: other.type_name().to_owned(),
            }
            .into()),
        },
        (UnaryOp::Not, other) => Ok(Value::Bool(!truth(other, "!")?)),
    }
}

fn arithmetic(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    apply: fn(Decimal, Decimal) -> Result<Decimal, ArithmeticError>,
) -> Result<Value, Fault> {
    let operand = |value: &Value| {
        value.as_number().ok_or_else(|| EvaluationFailure::TypeMismatch {
            operator: op.to_string(),
            expected: "a number",
            found: value.type_name().to_owned(),
        })
    };
    match (plain(left), plain(right)) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            Ok(Value::String(format!("{a}{b}")))
        }
        (a, b) => Ok(Value::Number(apply(operand(a)?, operand(b)?)?)),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (plain(left), plain(right)) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Money(a), Value::Money(b)) => {
            a.currency == b.currency && numeric::are_equal(a.amount, b.amount)
        }
        (Value::Date(d), Value::DateTime(dt)) | (Value::DateTime(dt), Value::Date(d)) => {
            d.and_time(NaiveTime::MIN) == *dt
        }
        (a, b) => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => numeric::are_equal(x, y),
            _ => a == b,
        },
    }
}

fn compare_values(op: BinaryOp, left: &Value, right: &Value) -> Result<Option<Ordering>, Fault> {
    let ordering = match (plain(left), plain(right)) {
        (Value::Null, _) | (_, Value::Null) => None,
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        (Value::Date(a), Value::DateTime(b)) => Some(a.and_time(NaiveTime::MIN).cmp(b)),
        (Value::DateTime(a), Value::Date(b)) => Some(a.cmp(&b.and_time(NaiveTime::MIN))),
        (a, b) => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => Some(numeric::compare(x, y)),
            _ => {
                return Err(EvaluationFailure::TypeMismatch {
                    operator: op.to_string(),
                    expected: "comparable operands",
                    found: format!("{} and {}", a.type_name(), b.type_name()),
                }
                .into())
            }
        },
    };
    Ok(ordering)
}

/// Step into `segment` of `cursor` for assignment; the next value must exist.
fn step_mut<'v>(cursor: &'v mut Value, segment: &PathSegment) -> Result<&'v mut Value, EvaluationFailure> {
    let next = match (unwrap_mut(cursor), segment) {
        (Value::Entity(entity), PathSegment::Property(name) | PathSegment::Key(name)) => {
            if !entity.declares(name) {
                return Err(PropertyResolutionError::Undefined {
                    property: name.clone(),
                    type_name: entity.type_name().to_owned(),
                }
                .into());
            }
            entity.get_mut(name)
        }
        (Value::Map(entries), PathSegment::Property(name) | PathSegment::Key(name)) => {
            entries.get_mut(name.as_str())
        }
        (Value::List(items), PathSegment::Index(i)) => items.get_mut(*i),
        (other, segment) => {
            return Err(EvaluationFailure::Assignment {
                segment: segment.to_string(),
                reason: format!("{} cannot be navigated", other.type_name()),
            })
        }
    };
    match next {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(EvaluationFailure::Assignment {
            segment: segment.to_string(),
            reason: "intermediate value is absent".to_owned(),
        }),
    }
}

fn assign(
    accessor: &dyn PropertyAccessor,
    cursor: &mut Value,
    segment: &PathSegment,
    value: Value,
) -> Result<(), EvaluationFailure> {
    match (unwrap_mut(cursor), segment) {
        (object, PathSegment::Property(name) | PathSegment::Key(name)) => {
            Ok(accessor.set(object, name, value)?)
        }
        (Value::List(items), PathSegment::Index(i)) => {
            let len = items.len();
            match items.get_mut(*i) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(EvaluationFailure::Assignment {
                    segment: segment.to_string(),
                    reason: format!("index out of bounds for length {len}"),
                }),
            }
        }
        (other, PathSegment::Index(_)) => Err(EvaluationFailure::Assignment {
            segment: segment.to_string(),
            reason: format!("{} cannot be indexed", other.type_name()),
        }),
    }
}

fn unwrap_mut(value: &mut Value) -> &mut Value {
    match value {
        Value::Optional(Some(inner)) => unwrap_mut(inner),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::types::expr::{call, every, for_each, ident, if_then, lit, num, some, this};
    use crate::Entity;

    fn eval(expr: Expr, data: &Value) -> Result<Value, EvaluationError> {
        Evaluator::default().evaluate(
            &CompiledExpression::new(expr),
            &Environment::new(data),
            &EvaluationContext::default(),
        )
    }

    fn n(s: &str) -> Value {
        Value::Number(Decimal::from_str(s).unwrap())
    }

    fn policy() -> Value {
        Value::from(
            Entity::new("Policy")
                .with_id("P-1")
                .field("premium", n("120.50"))
                .field("state", "CA")
                .field("limit", Value::Null)
                .field(
                    "coverages",
                    Value::list([
                        Value::from(Entity::new("Coverage").field("limit", n("100"))),
                        Value::from(Entity::new("Coverage").field("limit", n("250"))),
                    ]),
                )
                .field("attributes", Value::map([("usage", Value::from("commute"))])),
        )
    }

    #[test]
    fn arithmetic_uses_numeric_kernel() {
        let data = Value::Null;
        assert_eq!(eval(num("840.7") + num("0.11"), &data).unwrap(), n("840.81"));
        assert_eq!(
            eval(num("2") / num("3"), &data).unwrap(),
            n("0.6666666666666667")
        );
        assert_eq!(eval(num("2.22").pow(num("2")), &data).unwrap(), n("4.9284"));
        assert_eq!(eval(-num("3"), &data).unwrap(), n("-3"));
    }

    #[test]
    fn division_by_zero_is_technical() {
        let err = eval(num("1") / num("0"), &Value::Null).unwrap_err();
        assert!(!err.is_business_skip());
        assert!(matches!(
            err.failure(),
            Some(EvaluationFailure::Arithmetic(ArithmeticError::DivisionByZero))
        ));
        assert_eq!(err.expression(), "(1 / 0)");
    }

    #[test]
    fn null_propagates_through_arithmetic() {
        let data = policy();
        assert_eq!(eval(ident("limit") * num("2"), &data).unwrap(), Value::Null);
    }

    #[test]
    fn property_semantics() {
        let data = policy();
        assert_eq!(eval(ident("premium"), &data).unwrap(), n("120.5"));
        assert_eq!(
            eval(ident("coverages").prop("limit"), &data).unwrap(),
            Value::list([n("100"), n("250")])
        );
        assert_eq!(
            eval(ident("attributes").prop("missing"), &data).unwrap(),
            Value::Null
        );
        let err = eval(ident("unknown"), &data).unwrap_err();
        assert!(matches!(
            err.failure(),
            Some(EvaluationFailure::PropertyResolution(
                PropertyResolutionError::Undefined { .. }
            ))
        ));
    }

    #[test]
    fn indexing() {
        let data = policy();
        let limits = ident("coverages").prop("limit");
        assert_eq!(eval(limits.clone().at(lit(1_i64)), &data).unwrap(), n("250"));
        assert_eq!(eval(limits.clone().at(lit(9_i64)), &data).unwrap(), Value::Null);
        assert!(eval(limits.at(lit("x")), &data).is_err());
        assert_eq!(
            eval(ident("attributes").at(lit("usage")), &data).unwrap(),
            Value::from("commute")
        );
    }

    #[test]
    fn comparisons_and_logic() {
        let data = policy();
        assert_eq!(eval(num("1").eq(num("1.00")), &data).unwrap(), Value::Bool(true));
        assert_eq!(eval(ident("premium").gt(num("100")), &data).unwrap(), Value::Bool(true));
        assert_eq!(eval(ident("limit").lt(num("1")), &data).unwrap(), Value::Bool(false));
        assert_eq!(eval(ident("limit").eq(lit(Value::Null)), &data).unwrap(), Value::Bool(true));
        assert_eq!(
            eval(ident("state").eq(lit("CA")).and(ident("limit").eq(lit(Value::Null))), &data)
                .unwrap(),
            Value::Bool(true)
        );
        assert!(eval(lit("a").lt(num("1")), &data).is_err());
        assert!(eval(num("1").and(lit(true)), &data).is_err());
    }

    #[test]
    fn or_short_circuits() {
        let data = policy();
        let guarded = lit(true).or(ident("does_not_exist"));
        assert_eq!(eval(guarded, &data).unwrap(), Value::Bool(true));
    }

    #[test]
    fn membership() {
        let data = policy();
        let states = crate::types::expr::collection(vec![lit("CA"), lit("NY")]);
        assert_eq!(eval(ident("state").is_in(states), &data).unwrap(), Value::Bool(true));
        assert_eq!(
            eval(num("3").is_in(lit(Value::Null)), &data).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn comprehensions() {
        let data = policy();
        let high = ident("coverages").filter(ident("limit").gt(num("150")));
        assert_eq!(eval(high.prop("limit"), &data).unwrap(), Value::list([n("250")]));

        let doubled = for_each("c", ident("coverages"), ident("c").prop("limit") * num("2"));
        assert_eq!(eval(doubled, &data).unwrap(), Value::list([n("200"), n("500")]));

        let any = some("c", ident("coverages"), ident("c").prop("limit").gt(num("200")));
        assert_eq!(eval(any, &data).unwrap(), Value::Bool(true));

        let all = every("c", ident("coverages"), ident("c").prop("limit").gt(num("200")));
        assert_eq!(eval(all, &data).unwrap(), Value::Bool(false));

        let vacuous = every("c", lit(Value::Null), lit(false));
        assert_eq!(eval(vacuous, &data).unwrap(), Value::Bool(true));
    }

    #[test]
    fn filter_predicate_sees_element_as_this() {
        let data = Value::list([n("1"), n("5"), n("10")]);
        let big = this().filter(this().gt(num("3")));
        assert_eq!(eval(big, &data).unwrap(), Value::list([n("5"), n("10")]));
    }

    #[test]
    fn type_guards() {
        let data = policy();
        assert_eq!(eval(this().instance_of("Policy"), &data).unwrap(), Value::Bool(true));
        assert_eq!(
            eval(crate::types::expr::cast("Coverage", this()), &data).unwrap(),
            Value::Null
        );
        let guarded = if_then(
            ident("premium").instance_of("Number"),
            ident("premium") * num("2"),
            Some(num("0")),
        );
        assert_eq!(eval(guarded, &data).unwrap(), n("241"));
        assert_eq!(
            eval(if_then(lit(false), num("1"), None), &data).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn builtin_calls() {
        let data = policy();
        let total = call("Sum", vec![ident("coverages").prop("limit")]);
        assert_eq!(eval(total, &data).unwrap(), n("350"));
        let err = eval(call("Nope", vec![]), &data).unwrap_err();
        assert!(matches!(
            err.failure(),
            Some(EvaluationFailure::UnknownFunction { .. })
        ));
    }

    #[test]
    fn function_errors_are_rewrapped() {
        let evaluator = Evaluator::builder()
            .function("Rating", |_, _| Err(FunctionError::business("no rating on file")))
            .function("Broken", |_, _| Err(FunctionError::failed("backend down")))
            .build();
        let data = Value::Null;
        let env = Environment::new(&data);
        let ctx = EvaluationContext::default();

        let skip = evaluator
            .evaluate(&call("Rating", vec![]).into(), &env, &ctx)
            .unwrap_err();
        assert!(skip.is_business_skip());
        assert_eq!(skip.to_string(), "evaluation of 'Rating()' skipped: no rating on file");

        let broken = evaluator
            .evaluate(&call("Broken", vec![]).into(), &env, &ctx)
            .unwrap_err();
        assert!(!broken.is_business_skip());
        let source = std::error::Error::source(&broken).unwrap();
        assert_eq!(source.to_string(), "function 'Broken' failed: backend down");
    }

    #[test]
    fn variables_shadow_properties() {
        let data = policy();
        let env = Environment::new(&data).with_variable("premium", 1_i64);
        let value = Evaluator::default()
            .evaluate(
                &CompiledExpression::new(ident("premium")),
                &env,
                &EvaluationContext::default(),
            )
            .unwrap();
        assert_eq!(value, Value::from(1_i64));
    }

    #[test]
    fn cross_context_resolution_and_diagnostics() {
        let data = policy();
        let vehicle = Value::from(Entity::new("Vehicle").field("value", n("9000")));
        let expr = CompiledExpression::new(ident("Vehicle").prop("value")).cross_context("Vehicle");
        let ctx = EvaluationContext::default();
        let evaluator = Evaluator::default();

        let env = Environment::new(&data).with_cross_context("Vehicle", &vehicle);
        assert_eq!(evaluator.evaluate(&expr, &env, &ctx).unwrap(), n("9000"));

        let report = evaluator.evaluate_detailed(&expr, &Environment::new(&data), &ctx);
        assert_eq!(report.value(), Some(&Value::Null));
        assert_eq!(
            report.diagnostics(),
            [Diagnostic::UnresolvedReference {
                name: "Vehicle".into()
            }]
        );
    }

    #[test]
    fn recursion_limit() {
        let mut expr = num("1");
        for _ in 0..20 {
            expr = expr + num("1");
        }
        let evaluator = Evaluator::builder().max_depth(8).build();
        let data = Value::Null;
        let err = evaluator
            .evaluate(
                &expr.into(),
                &Environment::new(&data),
                &EvaluationContext::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err.failure(),
            Some(EvaluationFailure::RecursionLimit { limit: 8 })
        ));
    }

    #[test]
    fn set_expression_assigns_along_path() {
        let evaluator = Evaluator::default();
        let mut target = policy();
        evaluator
            .evaluate_set_expression(n("99"), "coverages[1].limit", &mut target)
            .unwrap();
        evaluator
            .evaluate_set_expression(Value::from("pleasure"), "attributes['usage']", &mut target)
            .unwrap();
        evaluator
            .evaluate_set_expression(n("5"), "limit", &mut target)
            .unwrap();
        assert_eq!(eval(ident("coverages").prop("limit"), &target).unwrap(), Value::list([n("100"), n("99")]));
        assert_eq!(eval(ident("attributes").prop("usage"), &target).unwrap(), Value::from("pleasure"));
        assert_eq!(eval(ident("limit"), &target).unwrap(), n("5"));
    }

    #[test]
    fn set_expression_failures() {
        let evaluator = Evaluator::default();
        let mut target = policy();
        for path in ["undeclared", "limit.amount", "coverages[7].limit", "coverages[9]", "a..b"] {
            let err = evaluator
                .evaluate_set_expression(n("1"), path, &mut target)
                .unwrap_err();
            assert_eq!(err.expression(), path);
        }
    }

    #[test]
    fn condition_treats_null_as_false() {
        let data = policy();
        let evaluator = Evaluator::default();
        let env = Environment::new(&data);
        let ctx = EvaluationContext::default();
        assert!(!evaluator
            .evaluate_condition(&ident("limit").into(), &env, &ctx)
            .unwrap());
        assert!(evaluator
            .evaluate_condition(&ident("premium").into(), &env, &ctx)
            .is_err());
    }

    #[test]
    fn template_variables_render() {
        let data = policy();
        let message = TemplateMessage::parse("Premium ${premium} in ${state} for ${coverages.limit}").unwrap();
        let rendered = Evaluator::default()
            .evaluate_template_variables(&message, &Environment::new(&data), &EvaluationContext::default())
            .unwrap();
        assert_eq!(rendered, ["120.5", "CA", "[100, 250]"]);
        assert_eq!(message.format(&rendered), "Premium 120.5 in CA for [100, 250]");
    }
}
