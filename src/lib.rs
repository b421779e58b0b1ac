//! Dependency-ordered business rules over a dynamically typed object graph.
//!
//! Rules declare the attribute they target and the attributes they read.
//! [`RuleOrderingEngine`] turns a [`RuleSet`] into a [`RuleOrder`] where every
//! producer runs before its consumers, and reports cycles with the rules
//! involved. [`Evaluator`] interprets rule expressions with 16-digit decimal
//! arithmetic, and [`ContextExtractor`] materializes the instances a rule is
//! evaluated against.
//!
//! ```
//! use ruleweave::{
//!     num, CompiledExpression, Entity, Environment, EvaluationContext, Evaluator, Expr, Value,
//! };
//!
//! let policy = Value::from(Entity::new("Policy").field("premium", 1200_i64));
//! let tax: CompiledExpression = (Expr::path("premium").unwrap() * num("0.0825")).into();
//!
//! let value = Evaluator::default()
//!     .evaluate(&tax, &Environment::new(&policy), &EvaluationContext::default())
//!     .unwrap();
//! assert_eq!(value.to_string(), "99");
//! ```

use std::sync::Arc;

pub mod adapter;
mod engine;
mod error;
mod evaluate;
mod extract;
pub mod functions;
mod graph;
pub mod numeric;
pub mod parse;
mod template;
mod types;

pub use adapter::{Shape, TypeAdapterRegistry, TypeAdapterRegistryBuilder};
pub use engine::{RuleOrder, RuleOrderingEngine};
pub use error::EngineError;
pub use evaluate::{
    DefaultPropertyAccessor, EvaluationError, EvaluationFailure, Evaluator, EvaluatorBuilder,
    PropertyAccessor, PropertyResolutionError, DEFAULT_MAX_DEPTH,
};
pub use extract::{ContextExtractor, ExtractionError};
pub use functions::{FunctionError, FunctionRegistry};
pub use graph::DependencyGraph;
pub use numeric::ArithmeticError;
pub use template::{render_value, TemplateMessage};
pub use types::{
    call, cast, collection, every, for_each, ident, if_then, lit, num, some, this, try_num, BinaryOp,
    CompiledExpression, ContextRepository, CycleMember, Dependency, DependencyCycle, Diagnostic,
    Entity, Environment, EvaluationContext, EvaluationReport, Expr, ExpressionKind,
    ExtractedInstance, InheritanceCache, InstanceKey, Money, OrderError, Payload, Quantifier,
    RuleBuilder, RuleSet, RuleSetBuilder, RuleSetChecksum, RuntimeContextDefinition, RuntimeRule,
    UnaryOp, Value, VariableReference,
};

/// Order every rule of `ruleset` so producers precede consumers, without caching.
///
/// Independent rules keep their relative input order.
///
/// # Errors
///
/// Returns [`OrderError::CyclicDependency`] listing each cycle's rules.
pub fn build_order(ruleset: &RuleSet) -> Result<Vec<Arc<RuntimeRule>>, OrderError> {
    DependencyGraph::build(ruleset.rules(), ruleset).order()
}
