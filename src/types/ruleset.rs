use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rust_decimal::Decimal;

use super::context::{ContextRepository, RuntimeContextDefinition};
use super::error::OrderError;
use super::expr::{CompiledExpression, Expr};
use super::value::Value;
use super::rule::{Dependency, Payload, RuntimeRule};
use crate::template::TemplateMessage;

/// Builder for constructing a [`RuleSet`].
///
/// Rules are defined via closures and frozen into an immutable, versioned
/// rule set.
///
/// # Example
///
/// ```
/// use ruleweave::{RuleSetBuilder, RuntimeContextDefinition, Expr, num};
///
/// let ruleset = RuleSetBuilder::new()
///     .context(RuntimeContextDefinition::new("Policy"))
///     .rule("base_premium", "Policy", "premium", |r| r.default_value(num("100")))
///     .rule("tax", "Policy", "tax", |r| {
///         r.depends_on("Policy", "premium")
///             .default_value(Expr::path("premium").unwrap() * num("0.2"))
///     })
///     .entry_point("Quote", ["base_premium", "tax"])
///     .build()
///     .unwrap();
/// assert_eq!(ruleset.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct RuleSetBuilder {
    rules: Vec<RuntimeRule>,
    missing_payload: Vec<String>,
    contexts: IndexMap<String, RuntimeContextDefinition>,
    entry_points: Vec<(String, Vec<String>)>,
}

/// Intermediate builder passed to the rule definition closure.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    dependencies: Vec<Dependency>,
    condition: Option<CompiledExpression>,
    payload: Option<Payload>,
    message: Option<TemplateMessage>,
}

impl RuleSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a rule targeting `target_path` on `context_name`. The closure must
    /// set a payload, otherwise [`build`](Self::build) fails with
    /// [`OrderError::MissingPayload`].
    #[must_use]
    pub fn rule(
        mut self,
        name: &str,
        context_name: &str,
        target_path: &str,
        f: impl FnOnce(RuleBuilder) -> RuleBuilder,
    ) -> Self {
        let builder = f(RuleBuilder::default());
        match builder.payload {
            Some(payload) => self.rules.push(RuntimeRule::new(
                name.to_owned(),
                context_name.to_owned(),
                target_path.to_owned(),
                builder.dependencies,
                builder.condition,
                payload,
                builder.message,
            )),
            None => self.missing_payload.push(name.to_owned()),
        }
        self
    }

    /// Register a context definition. A later definition with the same name
    /// replaces the earlier one.
    #[must_use]
    pub fn context(mut self, definition: RuntimeContextDefinition) -> Self {
        self.contexts
            .insert(definition.name().to_owned(), definition);
        self
    }

    /// Declare a named group of rules triggered together.
    #[must_use]
    pub fn entry_point<I, S>(mut self, name: &str, rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entry_points
            .push((name.to_owned(), rules.into_iter().map(Into::into).collect()));
        self
    }

    /// Validate and freeze the rules into an immutable `RuleSet`.
    ///
    /// Dependency ordering is not computed here; see
    /// [`RuleOrderingEngine`](crate::RuleOrderingEngine).
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] on duplicate rule or entry point names, rules
    /// without a payload or target path, and entry points naming unknown rules.
    pub fn build(self) -> Result<RuleSet, OrderError> {
        if let Some(rule) = self.missing_payload.into_iter().next() {
            return Err(OrderError::MissingPayload { rule });
        }

        let mut names = HashSet::new();
        for rule in &self.rules {
            if !names.insert(rule.name()) {
                return Err(OrderError::DuplicateRule {
                    name: rule.name().to_owned(),
                });
            }
            if rule.target_path().trim().is_empty() {
                return Err(OrderError::EmptyTargetPath {
                    rule: rule.name().to_owned(),
                });
            }
        }

        let mut entry_points = IndexMap::new();
        for (name, members) in self.entry_points {
            if let Some(rule) = members.iter().find(|m| !names.contains(m.as_str())) {
                return Err(OrderError::UndefinedEntryPointRule {
                    entry_point: name,
                    rule: rule.clone(),
                });
            }
            if entry_points.contains_key(&name) {
                return Err(OrderError::DuplicateEntryPoint { name });
            }
            entry_points.insert(name, members);
        }

        let checksum = RuleSetChecksum::compute(&self.rules, &self.contexts);
        Ok(RuleSet {
            rules: self.rules.into_iter().map(Arc::new).collect(),
            contexts: self.contexts,
            entry_points,
            checksum,
        })
    }
}

impl RuleBuilder {
    /// Declare that the rule reads `target_path` on `context_name`.
    #[must_use]
    pub fn depends_on(mut self, context_name: &str, target_path: &str) -> Self {
        self.dependencies
            .push(Dependency::new(context_name, target_path));
        self
    }

    /// Only apply the rule when `condition` evaluates to `true`.
    #[must_use]
    pub fn when(mut self, condition: impl Into<CompiledExpression>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    #[must_use]
    pub fn assert(mut self, expression: impl Into<CompiledExpression>) -> Self {
        self.payload = Some(Payload::Assertion(expression.into()));
        self
    }

    #[must_use]
    pub fn default_value(mut self, expression: impl Into<CompiledExpression>) -> Self {
        self.payload = Some(Payload::Default(expression.into()));
        self
    }

    #[must_use]
    pub fn reset(mut self, expression: impl Into<CompiledExpression>) -> Self {
        self.payload = Some(Payload::Reset(expression.into()));
        self
    }

    #[must_use]
    pub fn number_set(
        mut self,
        min: Option<Decimal>,
        max: Option<Decimal>,
        step: Option<Decimal>,
    ) -> Self {
        self.payload = Some(Payload::NumberSet { min, max, step });
        self
    }

    #[must_use]
    pub fn message(mut self, message: TemplateMessage) -> Self {
        self.message = Some(message);
        self
    }
}

/// Opaque version token of a rule set: a BLAKE3 digest over its rules and
/// context definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleSetChecksum(blake3::Hash);

impl RuleSetChecksum {
    fn compute(rules: &[RuntimeRule], contexts: &IndexMap<String, RuntimeContextDefinition>) -> Self {
        let mut w = CanonicalWriter::default();
        w.len(rules.len());
        for rule in rules {
            w.str(rule.name());
            w.str(rule.context_name());
            w.str(rule.target_path());
            w.len(rule.dependencies().len());
            for dep in rule.dependencies() {
                w.str(&dep.context_name);
                w.str(&dep.target_path);
            }
            w.optional(rule.condition(), CanonicalWriter::expression);
            match rule.payload() {
                Payload::Assertion(e) => {
                    w.tag(0);
                    w.expression(e);
                }
                Payload::Default(e) => {
                    w.tag(1);
                    w.expression(e);
                }
                Payload::Reset(e) => {
                    w.tag(2);
                    w.expression(e);
                }
                Payload::NumberSet { min, max, step } => {
                    w.tag(3);
                    for bound in [min, max, step] {
                        w.optional(bound.as_ref(), |w, d| w.decimal(*d));
                    }
                }
            }
            w.optional(rule.message(), |w, message| {
                w.len(message.parts().len());
                for part in message.parts() {
                    w.str(part);
                }
                w.len(message.expressions().len());
                for e in message.expressions() {
                    w.expression(e);
                }
            });
        }
        w.len(contexts.len());
        for definition in contexts.values() {
            w.str(definition.name());
            w.len(definition.inherited_contexts().len());
            for ancestor in definition.inherited_contexts() {
                w.str(ancestor);
            }
            for map in [definition.children(), definition.fields()] {
                w.len(map.len());
                for (key, value) in map {
                    w.str(key);
                    w.str(value);
                }
            }
        }
        Self(w.hasher.finalize())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for RuleSetChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Unambiguous byte encoding of rule content: every string is length
/// prefixed, every enum variant tagged.
#[derive(Default)]
struct CanonicalWriter {
    hasher: blake3::Hasher,
}

impl CanonicalWriter {
    fn tag(&mut self, tag: u8) {
        self.hasher.update(&[tag]);
    }

    fn len(&mut self, len: usize) {
        self.hasher.update(&(len as u64).to_le_bytes());
    }

    fn str(&mut self, text: &str) {
        self.len(text.len());
        self.hasher.update(text.as_bytes());
    }

    fn decimal(&mut self, d: Decimal) {
        self.hasher.update(&d.normalize().serialize());
    }

    fn optional<T>(&mut self, value: Option<T>, f: impl FnOnce(&mut Self, T)) {
        match value {
            None => self.tag(0),
            Some(v) => {
                self.tag(1);
                f(self, v);
            }
        }
    }

    fn expression(&mut self, expression: &CompiledExpression) {
        self.expr(expression.ast());
        self.len(expression.references().len());
        for reference in expression.references() {
            self.str(&reference.name);
            self.tag(u8::from(reference.cross_context));
        }
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        self.len(exprs.len());
        for e in exprs {
            self.expr(e);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(v) => {
                self.tag(0);
                self.value(v);
            }
            Expr::This => self.tag(1),
            Expr::Ident(name) => {
                self.tag(2);
                self.str(name);
            }
            Expr::Property(base, name) => {
                self.tag(3);
                self.expr(base);
                self.str(name);
            }
            Expr::Index(base, index) => {
                self.tag(4);
                self.expr(base);
                self.expr(index);
            }
            Expr::Unary(op, operand) => {
                self.tag(5);
                self.tag(*op as u8);
                self.expr(operand);
            }
            Expr::Binary(op, lhs, rhs) => {
                self.tag(6);
                self.tag(*op as u8);
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::Call(name, args) => {
                self.tag(7);
                self.str(name);
                self.exprs(args);
            }
            Expr::Collection(items) => {
                self.tag(8);
                self.exprs(items);
            }
            Expr::Filter {
                collection,
                predicate,
            } => {
                self.tag(9);
                self.expr(collection);
                self.expr(predicate);
            }
            Expr::ForEach {
                var,
                collection,
                body,
            } => {
                self.tag(10);
                self.str(var);
                self.expr(collection);
                self.expr(body);
            }
            Expr::Quantified {
                quantifier,
                var,
                collection,
                predicate,
            } => {
                self.tag(11);
                self.tag(*quantifier as u8);
                self.str(var);
                self.expr(collection);
                self.expr(predicate);
            }
            Expr::If {
                condition,
                then,
                otherwise,
            } => {
                self.tag(12);
                self.expr(condition);
                self.expr(then);
                self.optional(otherwise.as_deref(), Self::expr);
            }
            Expr::InstanceOf(value, type_name) => {
                self.tag(13);
                self.expr(value);
                self.str(type_name);
            }
            Expr::Cast(type_name, value) => {
                self.tag(14);
                self.str(type_name);
                self.expr(value);
            }
        }
    }

    fn value(&mut self, value: &Value) {
        match value {
            Value::Null => self.tag(0),
            Value::Bool(b) => {
                self.tag(1);
                self.tag(u8::from(*b));
            }
            Value::Number(n) => {
                self.tag(2);
                self.decimal(*n);
            }
            Value::String(text) => {
                self.tag(3);
                self.str(text);
            }
            Value::Date(date) => {
                self.tag(4);
                self.str(&date.to_string());
            }
            Value::DateTime(instant) => {
                self.tag(5);
                self.str(&instant.to_string());
            }
            Value::Money(money) => {
                self.tag(6);
                self.decimal(money.amount);
                self.str(&money.currency);
            }
            Value::List(items) => {
                self.tag(7);
                self.len(items.len());
                for item in items {
                    self.value(item);
                }
            }
            Value::Map(entries) => {
                self.tag(8);
                self.len(entries.len());
                for (key, item) in entries {
                    self.str(key);
                    self.value(item);
                }
            }
            Value::Optional(inner) => {
                self.tag(9);
                self.optional(inner.as_deref(), Self::value);
            }
            Value::Entity(entity) => {
                self.tag(10);
                self.str(entity.type_name());
                self.optional(entity.id(), Self::str);
                let fields: Vec<(&str, &Value)> = entity.fields().collect();
                self.len(fields.len());
                for (name, item) in fields {
                    self.str(name);
                    self.value(item);
                }
            }
        }
    }
}

/// A validated, immutable rule set. Thread-safe and designed to live behind `Arc`.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Arc<RuntimeRule>>,
    contexts: IndexMap<String, RuntimeContextDefinition>,
    entry_points: IndexMap<String, Vec<String>>,
    checksum: RuleSetChecksum,
}

impl RuleSet {
    /// Rules in definition order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<RuntimeRule>] {
        &self.rules
    }

    #[must_use]
    pub fn rule(&self, name: &str) -> Option<&Arc<RuntimeRule>> {
        self.rules.iter().find(|r| r.name() == name)
    }

    #[must_use]
    pub fn contexts(&self) -> &IndexMap<String, RuntimeContextDefinition> {
        &self.contexts
    }

    #[must_use]
    pub fn entry_points(&self) -> &IndexMap<String, Vec<String>> {
        &self.entry_points
    }

    #[must_use]
    pub fn checksum(&self) -> RuleSetChecksum {
        self.checksum
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl ContextRepository for RuleSet {
    fn definition(&self, name: &str) -> Option<&RuntimeContextDefinition> {
        self.contexts.get(name)
    }
}

impl fmt::Display for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RuleSet({} rules, {} contexts, {} entry points)",
            self.rules.len(),
            self.contexts.len(),
            self.entry_points.len(),
        )
    }
}
