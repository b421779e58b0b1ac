//! Message templates and locale-independent value rendering.

use std::fmt::Write as _;

use crate::parse::{tokenize_template, PathParseError, TemplateToken};
use crate::{numeric, CompiledExpression, Expr, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A rule message: literal parts interleaved with expressions whose rendered
/// values are spliced between them.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMessage {
    parts: Vec<String>,
    expressions: Vec<CompiledExpression>,
}

impl TemplateMessage {
    #[must_use]
    pub fn new(parts: Vec<String>, expressions: Vec<CompiledExpression>) -> Self {
        Self { parts, expressions }
    }

    /// Parse `Premium ${policy.premium} is too high` style templates. Each
    /// placeholder must be an attribute path.
    ///
    /// # Errors
    ///
    /// Returns [`PathParseError`] for an unterminated placeholder or a
    /// placeholder that is not a valid path.
    pub fn parse(template: &str) -> Result<Self, PathParseError> {
        let mut parts = vec![String::new()];
        let mut expressions = Vec::new();
        for token in tokenize_template(template)? {
            match token {
                TemplateToken::Text(text) => {
                    if let Some(last) = parts.last_mut() {
                        last.push_str(text);
                    }
                }
                TemplateToken::Placeholder(path) => {
                    expressions.push(CompiledExpression::new(Expr::path(path)?));
                    parts.push(String::new());
                }
            }
        }
        Ok(Self { parts, expressions })
    }

    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    #[must_use]
    pub fn expressions(&self) -> &[CompiledExpression] {
        &self.expressions
    }

    /// Interleave the literal parts with `rendered` values, in order. Surplus
    /// values are appended; missing ones render as nothing.
    #[must_use]
    pub fn format(&self, rendered: &[String]) -> String {
        let mut out = String::new();
        let slots = self.parts.len().max(rendered.len());
        for i in 0..slots {
            if let Some(part) = self.parts.get(i) {
                out.push_str(part);
            }
            if let Some(value) = rendered.get(i) {
                out.push_str(value);
            }
        }
        out
    }
}

/// Render a value for display in a message.
///
/// Decimals print plain with trailing zeros stripped, dates as `yyyy-MM-dd`,
/// datetimes as `yyyy-MM-dd HH:mm:ss`, collections recursively as `[a, b]`,
/// money as its amount, and absent values as the empty string.
#[must_use]
pub fn render_value(value: &Value) -> String {
    let mut out = String::new();
    render_into(value, &mut out);
    out
}

fn render_into(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Optional(None) => {}
        Value::Optional(Some(inner)) => render_into(inner, out),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&numeric::to_plain_string(*n)),
        Value::Money(money) => out.push_str(&numeric::to_plain_string(money.amount)),
        Value::String(s) => out.push_str(s),
        Value::Date(d) => {
            let _ = write!(out, "{}", d.format(DATE_FORMAT));
        }
        Value::DateTime(dt) => {
            let _ = write!(out, "{}", dt.format(DATE_TIME_FORMAT));
        }
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_into(item, out);
            }
            out.push(']');
        }
        Value::Map(entries) => {
            out.push('{');
            for (i, (key, item)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                render_into(item, out);
            }
            out.push('}');
        }
        Value::Entity(entity) => {
            let _ = write!(out, "{entity}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::*;
    use crate::Money;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn render_scalars() {
        assert_eq!(render_value(&Value::Number(dec("12.500"))), "12.5");
        assert_eq!(render_value(&Value::Number(dec("1E+3"))), "1000");
        assert_eq!(render_value(&Value::Bool(true)), "true");
        assert_eq!(render_value(&Value::Null), "");
        assert_eq!(render_value(&Value::none()), "");
        assert_eq!(render_value(&Value::from("text")), "text");
        assert_eq!(
            render_value(&Value::Money(Money::new(dec("99.90"), "USD"))),
            "99.9"
        );
    }

    #[test]
    fn render_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(render_value(&Value::Date(date)), "2024-01-05");
        let dt = date.and_hms_opt(9, 3, 7).unwrap();
        assert_eq!(render_value(&Value::DateTime(dt)), "2024-01-05 09:03:07");
    }

    #[test]
    fn render_nested_collections() {
        let value = Value::list([
            Value::from(1_i64),
            Value::list([Value::from("a"), Value::Null]),
            Value::Bool(false),
        ]);
        assert_eq!(render_value(&value), "[1, [a, ], false]");
    }

    #[test]
    fn parse_and_format() {
        let message = TemplateMessage::parse("Premium ${policy.premium} exceeds ${limit}!").unwrap();
        assert_eq!(message.parts(), ["Premium ", " exceeds ", "!"]);
        assert_eq!(message.expressions().len(), 2);
        assert_eq!(
            message.format(&["120".into(), "100".into()]),
            "Premium 120 exceeds 100!"
        );
    }

    #[test]
    fn format_tolerates_count_mismatch() {
        let message = TemplateMessage::new(vec!["a".into(), "b".into()], Vec::new());
        assert_eq!(message.format(&[]), "ab");
        assert_eq!(message.format(&["1".into(), "2".into(), "3".into()]), "a1b23");
    }

    #[test]
    fn parse_rejects_bad_placeholder() {
        assert!(TemplateMessage::parse("x ${a..b}").is_err());
        assert!(TemplateMessage::parse("x ${a").is_err());
    }
}
