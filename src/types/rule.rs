use std::fmt;

use rust_decimal::Decimal;

use super::expr::CompiledExpression;
use crate::template::TemplateMessage;

/// Declares that a rule's expressions read `target_path` on `context_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dependency {
    pub context_name: String,
    pub target_path: String,
}

impl Dependency {
    #[must_use]
    pub fn new(context_name: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            context_name: context_name.into(),
            target_path: target_path.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.context_name, self.target_path)
    }
}

/// What a rule does to its target attribute once its condition holds.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Validation: the expression must evaluate to `true`.
    Assertion(CompiledExpression),
    /// Writes the value when the attribute is empty.
    Default(CompiledExpression),
    /// Writes the value unconditionally.
    Reset(CompiledExpression),
    /// The attribute must sit inside a stepped numeric domain.
    NumberSet {
        min: Option<Decimal>,
        max: Option<Decimal>,
        step: Option<Decimal>,
    },
}

impl Payload {
    /// The expression the payload evaluates, if any.
    #[must_use]
    pub fn expression(&self) -> Option<&CompiledExpression> {
        match self {
            Payload::Assertion(e) | Payload::Default(e) | Payload::Reset(e) => Some(e),
            Payload::NumberSet { .. } => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Assertion(_) => "assertion",
            Payload::Default(_) => "default",
            Payload::Reset(_) => "reset",
            Payload::NumberSet { .. } => "number-set",
        }
    }
}

/// A compiled rule bound to one attribute of one context type.
///
/// Immutable once built by [`RuleSetBuilder`](super::RuleSetBuilder).
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeRule {
    name: String,
    context_name: String,
    target_path: String,
    dependencies: Vec<Dependency>,
    condition: Option<CompiledExpression>,
    payload: Payload,
    message: Option<TemplateMessage>,
}

impl RuntimeRule {
    pub(crate) fn new(
        name: String,
        context_name: String,
        target_path: String,
        dependencies: Vec<Dependency>,
        condition: Option<CompiledExpression>,
        payload: Payload,
        message: Option<TemplateMessage>,
    ) -> Self {
        Self {
            name,
            context_name,
            target_path,
            dependencies,
            condition,
            payload,
            message,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn context_name(&self) -> &str {
        &self.context_name
    }

    #[must_use]
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    #[must_use]
    pub fn condition(&self) -> Option<&CompiledExpression> {
        self.condition.as_ref()
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    #[must_use]
    pub fn message(&self) -> Option<&TemplateMessage> {
        self.message.as_ref()
    }

    /// Dependency targets rendered as `Context.path`, duplicates removed.
    #[must_use]
    pub fn distinct_dependency_targets(&self) -> Vec<String> {
        let mut seen = Vec::with_capacity(self.dependencies.len());
        for dep in &self.dependencies {
            let rendered = dep.to_string();
            if !seen.contains(&rendered) {
                seen.push(rendered);
            }
        }
        seen
    }
}

impl fmt::Display for RuntimeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} on {}.{})",
            self.name,
            self.payload.kind(),
            self.context_name,
            self.target_path
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::expr::lit;

    #[test]
    fn dependency_equality_is_structural() {
        assert_eq!(Dependency::new("Policy", "premium"), Dependency::new("Policy", "premium"));
        assert_ne!(Dependency::new("Policy", "premium"), Dependency::new("Vehicle", "premium"));
        assert_eq!(Dependency::new("Policy", "premium").to_string(), "Policy.premium");
    }

    #[test]
    fn distinct_targets_keep_first_occurrence() {
        let rule = RuntimeRule::new(
            "r".into(),
            "Policy".into(),
            "premium".into(),
            vec![
                Dependency::new("Policy", "limit"),
                Dependency::new("Vehicle", "value"),
                Dependency::new("Policy", "limit"),
            ],
            None,
            Payload::Default(lit(1_i64).into()),
            None,
        );
        assert_eq!(
            rule.distinct_dependency_targets(),
            vec!["Policy.limit", "Vehicle.value"]
        );
        assert_eq!(rule.to_string(), "r (default on Policy.premium)");
    }
}
