use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Not, Rem, Sub};

use super::Value;
use crate::numeric::ArithmeticError;
use crate::parse::{PathParseError, PathSegment, parse_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    /// Membership of the left operand in the right collection.
    In,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Some,
    Every,
}

/// Compiled expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// The object currently in scope: the data object, or the element inside a filter.
    This,
    /// A variable, or a property of the object in scope.
    Ident(String),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Collection(Vec<Expr>),
    /// `collection[predicate]`, with each element in scope as `this`.
    Filter {
        collection: Box<Expr>,
        predicate: Box<Expr>,
    },
    /// `for var in collection return body`
    ForEach {
        var: String,
        collection: Box<Expr>,
        body: Box<Expr>,
    },
    /// `some var in collection satisfies predicate` / `every ...`
    Quantified {
        quantifier: Quantifier,
        var: String,
        collection: Box<Expr>,
        predicate: Box<Expr>,
    },
    If {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Option<Box<Expr>>,
    },
    /// `value instanceof Type`
    InstanceOf(Box<Expr>, String),
    /// `(Type) value`: the value when it is of the type, otherwise `null`.
    Cast(String, Box<Expr>),
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::Eq => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Lte => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Gte => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
        };
        write!(f, "{symbol}")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::This => write!(f, "this"),
            Expr::Ident(name) => write!(f, "{name}"),
            Expr::Property(base, name) => write!(f, "{base}.{name}"),
            Expr::Index(base, index) => write!(f, "{base}[{index}]"),
            Expr::Unary(op, inner) => write!(f, "{op}{inner}"),
            Expr::Binary(op, a, b) => write!(f, "({a} {op} {b})"),
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                write!(f, ")")
            }
            Expr::Collection(items) => {
                write!(f, "{{")?;
                write_list(f, items)?;
                write!(f, "}}")
            }
            Expr::Filter {
                collection,
                predicate,
            } => write!(f, "{collection}[{predicate}]"),
            Expr::ForEach {
                var,
                collection,
                body,
            } => write!(f, "for {var} in {collection} return {body}"),
            Expr::Quantified {
                quantifier,
                var,
                collection,
                predicate,
            } => {
                let word = match quantifier {
                    Quantifier::Some => "some",
                    Quantifier::Every => "every",
                };
                write!(f, "{word} {var} in {collection} satisfies {predicate}")
            }
            Expr::If {
                condition,
                then,
                otherwise,
            } => {
                write!(f, "if {condition} then {then}")?;
                if let Some(otherwise) = otherwise {
                    write!(f, " else {otherwise}")?;
                }
                Ok(())
            }
            Expr::InstanceOf(value, type_name) => write!(f, "{value} instanceof {type_name}"),
            Expr::Cast(type_name, value) => write!(f, "({type_name}) {value}"),
        }
    }
}

impl Expr {
    /// Build a navigation expression from an attribute path.
    ///
    /// # Errors
    ///
    /// Returns [`PathParseError`] if `path` is malformed.
    pub fn path(path: &str) -> Result<Expr, PathParseError> {
        let segments = parse_path(path)?;
        let mut expr: Option<Expr> = None;
        for segment in segments {
            expr = Some(match (expr, segment) {
                (None, PathSegment::Property(name)) => Expr::Ident(name),
                (Some(base), PathSegment::Property(name)) => Expr::Property(Box::new(base), name),
                (Some(base), PathSegment::Index(i)) => Expr::Index(
                    Box::new(base),
                    Box::new(Expr::Literal(Value::from(i64::try_from(i).unwrap_or(i64::MAX)))),
                ),
                (Some(base), PathSegment::Key(k)) => {
                    Expr::Index(Box::new(base), Box::new(Expr::Literal(Value::String(k))))
                }
                (None, other) => return Err(PathParseError::new(path, format!("unexpected {other}"))),
            });
        }
        expr.ok_or_else(|| PathParseError::new(path, "empty path"))
    }

    #[must_use]
    pub fn prop(self, name: &str) -> Expr {
        Expr::Property(Box::new(self), name.to_owned())
    }

    #[must_use]
    pub fn at(self, index: Expr) -> Expr {
        Expr::Index(Box::new(self), Box::new(index))
    }

    fn binary(self, op: BinaryOp, other: Expr) -> Expr {
        Expr::Binary(op, Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn pow(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Pow, other)
    }

    #[must_use]
    pub fn eq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Eq, other)
    }

    #[must_use]
    pub fn neq(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Neq, other)
    }

    #[must_use]
    pub fn lt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lt, other)
    }

    #[must_use]
    pub fn lte(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Lte, other)
    }

    #[must_use]
    pub fn gt(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gt, other)
    }

    #[must_use]
    pub fn gte(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Gte, other)
    }

    #[must_use]
    pub fn and(self, other: Expr) -> Expr {
        self.binary(BinaryOp::And, other)
    }

    #[must_use]
    pub fn or(self, other: Expr) -> Expr {
        self.binary(BinaryOp::Or, other)
    }

    #[must_use]
    pub fn is_in(self, collection: Expr) -> Expr {
        self.binary(BinaryOp::In, collection)
    }

    #[must_use]
    pub fn filter(self, predicate: Expr) -> Expr {
        Expr::Filter {
            collection: Box::new(self),
            predicate: Box::new(predicate),
        }
    }

    #[must_use]
    pub fn instance_of(self, type_name: &str) -> Expr {
        Expr::InstanceOf(Box::new(self), type_name.to_owned())
    }
}

macro_rules! arithmetic_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Expr {
            type Output = Expr;

            fn $method(self, other: Expr) -> Expr {
                self.binary($op, other)
            }
        }
    };
}

arithmetic_op!(Add, add, BinaryOp::Add);
arithmetic_op!(Sub, sub, BinaryOp::Sub);
arithmetic_op!(Mul, mul, BinaryOp::Mul);
arithmetic_op!(Div, div, BinaryOp::Div);
arithmetic_op!(Rem, rem, BinaryOp::Mod);

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Unary(UnaryOp::Neg, Box::new(self))
    }
}

impl Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }
}

#[must_use]
pub fn lit(value: impl Into<Value>) -> Expr {
    Expr::Literal(value.into())
}

/// A decimal literal. Literals beyond the kernel precision are reduced to it.
///
/// # Errors
///
/// Returns [`ArithmeticError::InvalidNumber`] if `literal` is not a decimal.
pub fn try_num(literal: &str) -> Result<Expr, ArithmeticError> {
    Value::parse_number(literal).map(Expr::Literal)
}

/// Shorthand for [`try_num`] over literals written in source, such as
/// `num("0.0825")`. Use [`try_num`] for text that arrives at runtime.
///
/// # Panics
///
/// Panics if `literal` is not a decimal number.
#[must_use]
pub fn num(literal: &str) -> Expr {
    match try_num(literal) {
        Ok(expr) => expr,
        Err(e) => panic!("{e}"),
    }
}

#[must_use]
pub fn ident(name: &str) -> Expr {
    Expr::Ident(name.to_owned())
}

#[must_use]
pub fn this() -> Expr {
    Expr::This
}

#[must_use]
pub fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(name.to_owned(), args)
}

#[must_use]
pub fn collection(items: Vec<Expr>) -> Expr {
    Expr::Collection(items)
}

#[must_use]
pub fn for_each(var: &str, collection: Expr, body: Expr) -> Expr {
    Expr::ForEach {
        var: var.to_owned(),
        collection: Box::new(collection),
        body: Box::new(body),
    }
}

#[must_use]
pub fn some(var: &str, collection: Expr, predicate: Expr) -> Expr {
    Expr::Quantified {
        quantifier: Quantifier::Some,
        var: var.to_owned(),
        collection: Box::new(collection),
        predicate: Box::new(predicate),
    }
}

#[must_use]
pub fn every(var: &str, collection: Expr, predicate: Expr) -> Expr {
    Expr::Quantified {
        quantifier: Quantifier::Every,
        var: var.to_owned(),
        collection: Box::new(collection),
        predicate: Box::new(predicate),
    }
}

#[must_use]
pub fn if_then(condition: Expr, then: Expr, otherwise: Option<Expr>) -> Expr {
    Expr::If {
        condition: Box::new(condition),
        then: Box::new(then),
        otherwise: otherwise.map(Box::new),
    }
}

#[must_use]
pub fn cast(type_name: &str, value: Expr) -> Expr {
    Expr::Cast(type_name.to_owned(), Box::new(value))
}

/// How an expression is shaped, which lets callers skip full interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressionKind {
    Literal,
    Path,
    Complex,
}

/// A variable an expression reads. Cross-context references resolve through
/// externally supplied data contexts instead of the primary data object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VariableReference {
    pub name: String,
    pub cross_context: bool,
}

/// An immutable AST root plus the metadata the evaluator needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    ast: Expr,
    kind: ExpressionKind,
    literal: Option<Value>,
    references: Vec<VariableReference>,
}

impl CompiledExpression {
    /// Classify `ast`, precompute a literal value, and collect the free
    /// variables it reads.
    #[must_use]
    pub fn new(ast: Expr) -> Self {
        let kind = classify(&ast);
        let literal = match &ast {
            Expr::Literal(v) => Some(v.clone()),
            _ => None,
        };
        let mut names = BTreeSet::new();
        collect_free_idents(&ast, &mut Vec::new(), &mut names);
        let references = names
            .into_iter()
            .map(|name| VariableReference {
                name,
                cross_context: false,
            })
            .collect();
        Self {
            ast,
            kind,
            literal,
            references,
        }
    }

    /// Flag `name` as a cross-context reference, declaring it if the AST did not.
    #[must_use]
    pub fn cross_context(mut self, name: &str) -> Self {
        match self.references.iter_mut().find(|r| r.name == name) {
            Some(reference) => reference.cross_context = true,
            None => self.references.push(VariableReference {
                name: name.to_owned(),
                cross_context: true,
            }),
        }
        self
    }

    #[must_use]
    pub fn ast(&self) -> &Expr {
        &self.ast
    }

    #[must_use]
    pub fn kind(&self) -> ExpressionKind {
        self.kind
    }

    #[must_use]
    pub fn literal(&self) -> Option<&Value> {
        self.literal.as_ref()
    }

    #[must_use]
    pub fn references(&self) -> &[VariableReference] {
        &self.references
    }

    pub fn cross_context_names(&self) -> impl Iterator<Item = &str> {
        self.references
            .iter()
            .filter(|r| r.cross_context)
            .map(|r| r.name.as_str())
    }
}

impl From<Expr> for CompiledExpression {
    fn from(ast: Expr) -> Self {
        CompiledExpression::new(ast)
    }
}

impl fmt::Display for CompiledExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ast)
    }
}

fn classify(ast: &Expr) -> ExpressionKind {
    fn is_path(expr: &Expr) -> bool {
        match expr {
            Expr::This | Expr::Ident(_) => true,
            Expr::Property(base, _) => is_path(base),
            Expr::Index(base, index) => is_path(base) && matches!(**index, Expr::Literal(_)),
            _ => false,
        }
    }
    match ast {
        Expr::Literal(_) => ExpressionKind::Literal,
        other if is_path(other) => ExpressionKind::Path,
        _ => ExpressionKind::Complex,
    }
}

fn collect_free_idents(expr: &Expr, bound: &mut Vec<String>, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Literal(_) | Expr::This => {}
        Expr::Ident(name) => {
            if !bound.iter().any(|b| b == name) {
                out.insert(name.clone());
            }
        }
        Expr::Property(base, _) | Expr::Unary(_, base) | Expr::InstanceOf(base, _) => {
            collect_free_idents(base, bound, out);
        }
        Expr::Cast(_, base) => collect_free_idents(base, bound, out),
        Expr::Index(a, b) | Expr::Binary(_, a, b) => {
            collect_free_idents(a, bound, out);
            collect_free_idents(b, bound, out);
        }
        Expr::Call(_, items) | Expr::Collection(items) => {
            for item in items {
                collect_free_idents(item, bound, out);
            }
        }
        // Identifiers inside a filter predicate read the element, not the outer scope.
        Expr::Filter { collection, .. } => collect_free_idents(collection, bound, out),
        Expr::ForEach {
            var,
            collection,
            body: inner,
        }
        | Expr::Quantified {
            var,
            collection,
            predicate: inner,
            ..
        } => {
            collect_free_idents(collection, bound, out);
            bound.push(var.clone());
            collect_free_idents(inner, bound, out);
            bound.pop();
        }
        Expr::If {
            condition,
            then,
            otherwise,
        } => {
            collect_free_idents(condition, bound, out);
            collect_free_idents(then, bound, out);
            if let Some(otherwise) = otherwise {
                collect_free_idents(otherwise, bound, out);
            }
        }
    }
}
