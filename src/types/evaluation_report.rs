use std::fmt;
use std::time::Duration;

use super::Value;
use crate::evaluate::EvaluationError;

/// A non-fatal finding recorded while evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Diagnostic {
    /// A cross-context reference had no data context supplied; it read as `null`.
    UnresolvedReference { name: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnresolvedReference { name } => {
                write!(f, "unresolved cross-context reference '{name}'")
            }
        }
    }
}

/// Detailed evaluation report returned by
/// [`Evaluator::evaluate_detailed()`](crate::Evaluator::evaluate_detailed).
///
/// Contains the outcome, the diagnostics collected along the way, and the
/// wall-clock duration of the evaluation.
#[derive(Debug)]
#[must_use]
pub struct EvaluationReport {
    result: Result<Value, EvaluationError>,
    diagnostics: Vec<Diagnostic>,
    duration: Duration,
}

impl EvaluationReport {
    pub(crate) fn new(
        result: Result<Value, EvaluationError>,
        diagnostics: Vec<Diagnostic>,
        duration: Duration,
    ) -> Self {
        Self {
            result,
            diagnostics,
            duration,
        }
    }

    /// The outcome, same as [`Evaluator::evaluate()`](crate::Evaluator::evaluate).
    pub fn result(&self) -> Result<&Value, &EvaluationError> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    #[must_use]
    pub fn error(&self) -> Option<&EvaluationError> {
        self.result.as_ref().err()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Wall-clock duration of the evaluation.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// # Errors
    ///
    /// Returns the evaluation error, if any.
    pub fn into_result(self) -> Result<Value, EvaluationError> {
        self.result
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Ok(v) => write!(f, "value: {v}")?,
            Err(e) => write!(f, "error: {e}")?,
        }
        write!(f, ", diagnostics: {}", self.diagnostics.len())?;
        write!(f, ", duration: {:?}", self.duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_accessors() {
        let report = EvaluationReport::new(
            Ok(Value::from(3_i64)),
            vec![Diagnostic::UnresolvedReference {
                name: "Vehicle".into(),
            }],
            Duration::from_nanos(500),
        );

        assert_eq!(report.value(), Some(&Value::from(3_i64)));
        assert!(report.error().is_none());
        assert_eq!(report.diagnostics().len(), 1);
        assert_eq!(report.duration(), Duration::from_nanos(500));
        assert_eq!(report.into_result().unwrap(), Value::from(3_i64));
    }

    #[test]
    fn report_display_with_value() {
        let report = EvaluationReport::new(Ok(Value::Bool(true)), vec![], Duration::from_nanos(500));
        let s = report.to_string();
        assert!(s.contains("value: true"));
        assert!(s.contains("diagnostics: 0"));
    }

    #[test]
    fn report_display_with_error() {
        let report = EvaluationReport::new(
            Err(EvaluationError::BusinessSkip {
                expression: "Rating()".into(),
                reason: "no rating".into(),
            }),
            vec![],
            Duration::from_nanos(100),
        );
        assert!(report.to_string().starts_with("error: "));
    }

    #[test]
    fn diagnostic_display() {
        let diagnostic = Diagnostic::UnresolvedReference {
            name: "Driver".into(),
        };
        assert_eq!(
            diagnostic.to_string(),
            "unresolved cross-context reference 'Driver'"
        );
    }
}
