mod context;
mod entity;
mod environment;
mod error;
mod evaluation_report;
pub(crate) mod expr;
mod instance;
mod rule;
mod ruleset;
mod value;

pub use context::{ContextRepository, InheritanceCache, RuntimeContextDefinition};
pub use entity::Entity;
pub use environment::{Environment, EvaluationContext};
pub use error::{CycleMember, DependencyCycle, OrderError};
pub use evaluation_report::{Diagnostic, EvaluationReport};
pub use expr::{
    call, cast, collection, every, for_each, ident, if_then, lit, num, some, this, try_num, BinaryOp,
    CompiledExpression, Expr, ExpressionKind, Quantifier, UnaryOp, VariableReference,
};
pub use instance::{ExtractedInstance, InstanceKey};
pub use rule::{Dependency, Payload, RuntimeRule};
pub use ruleset::{RuleBuilder, RuleSet, RuleSetBuilder, RuleSetChecksum};
pub use value::{Money, Value};
