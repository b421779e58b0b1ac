mod error;
mod grammar;
mod parser;

pub use error::PathParseError;
pub use parser::{PathSegment, TemplateToken};

/// Parse an attribute path such as `policy.coverages[0].limit` or
/// `attributes['usage']` into its segments.
///
/// # Errors
///
/// Returns [`PathParseError`] if the input is not a valid path.
pub fn parse_path(input: &str) -> Result<Vec<PathSegment>, PathParseError> {
    use winnow::Parser;
    grammar::path
        .parse(input.trim())
        .map_err(|e| PathParseError::new(input, e.to_string()))
}

/// Split a message template into literal text and `${path}` placeholders.
///
/// # Errors
///
/// Returns [`PathParseError`] for an unterminated placeholder.
pub fn tokenize_template(input: &str) -> Result<Vec<TemplateToken<'_>>, PathParseError> {
    use winnow::Parser;
    grammar::template
        .parse(input)
        .map_err(|e| PathParseError::new(input, e.to_string()))
}
