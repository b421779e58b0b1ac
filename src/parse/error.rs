use thiserror::Error;

/// Errors produced when parsing an attribute path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path '{path}': {message}")]
pub struct PathParseError {
    path: String,
    message: String,
}

impl PathParseError {
    pub(crate) fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The path text that failed to parse.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = PathParseError::new("a..b", "unexpected '.'");
        assert_eq!(err.to_string(), "invalid path 'a..b': unexpected '.'");
        assert_eq!(err.path(), "a..b");
    }
}
