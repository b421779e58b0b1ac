use thiserror::Error;

use crate::parse::PathParseError;
use crate::{ArithmeticError, EvaluationError, ExtractionError, FunctionError, OrderError};

/// Unified error type for callers that drive ordering, extraction, and
/// evaluation together and want a single `?` target.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Arithmetic(#[from] ArithmeticError),

    #[error(transparent)]
    PathParse(#[from] PathParseError),

    #[error(transparent)]
    Function(#[from] FunctionError),
}

impl EngineError {
    /// Whether the failure is an intentional business skip rather than a fault.
    #[must_use]
    pub fn is_business_skip(&self) -> bool {
        matches!(self, EngineError::Evaluation(e) if e.is_business_skip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(found: bool) -> Result<(), EngineError> {
        if found {
            Ok(())
        } else {
            Err(OrderError::DuplicateRule {
                name: "tax".into(),
            })?
        }
    }

    #[test]
    fn converts_with_question_mark() {
        assert!(lookup(true).is_ok());
        let err = lookup(false).unwrap_err();
        assert!(matches!(err, EngineError::Order(_)));
        assert_eq!(err.to_string(), OrderError::DuplicateRule { name: "tax".into() }.to_string());
        assert!(!err.is_business_skip());
    }

    #[test]
    fn business_skip_is_visible_through_wrapper() {
        let err = EngineError::from(EvaluationError::BusinessSkip {
            expression: "Rating()".into(),
            reason: "n/a".into(),
        });
        assert!(err.is_business_skip());
    }
}
