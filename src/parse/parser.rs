use std::fmt;

/// One step of an attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// `.name` (or the leading name).
    Property(String),
    /// `[3]`
    Index(usize),
    /// `['key']`
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Property(name) => write!(f, ".{name}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Key(k) => write!(f, "['{k}']"),
        }
    }
}

/// A lexical piece of a message template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateToken<'i> {
    Text(&'i str),
    /// The trimmed path inside `${...}`.
    Placeholder(&'i str),
}
