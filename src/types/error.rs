use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("duplicate rule name '{name}'")]
    DuplicateRule { name: String },

    #[error("rule '{rule}' has no payload")]
    MissingPayload { rule: String },

    #[error("entry point '{entry_point}' references undefined rule '{rule}'")]
    UndefinedEntryPointRule { entry_point: String, rule: String },

    #[error("duplicate entry point '{name}'")]
    DuplicateEntryPoint { name: String },

    #[error("rule '{rule}' has an empty target path")]
    EmptyTargetPath { rule: String },

    #[error("cyclic dependency detected:\n{}", render_cycles(cycles))]
    CyclicDependency { cycles: Vec<DependencyCycle> },
}

/// One implicated rule in a dependency cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleMember {
    pub rule: String,
    pub context_name: String,
    pub target_path: String,
    /// Distinct `Context.path` targets the rule declares, in declaration order.
    pub dependencies: Vec<String>,
}

/// A strongly connected group of rules that depend on each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCycle {
    pub members: Vec<CycleMember>,
}

impl DependencyCycle {
    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.rule.as_str())
    }
}

impl fmt::Display for DependencyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "  rule '{}' on {}.{} depends on [{}]",
                member.rule,
                member.context_name,
                member.target_path,
                member.dependencies.join(", ")
            )?;
        }
        Ok(())
    }
}

fn render_cycles(cycles: &[DependencyCycle]) -> String {
    cycles
        .iter()
        .enumerate()
        .map(|(i, cycle)| format!("cycle {}:\n{cycle}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_rule_message() {
        let err = OrderError::DuplicateRule {
            name: "premium_default".into(),
        };
        assert_eq!(err.to_string(), "duplicate rule name 'premium_default'");
    }

    #[test]
    fn undefined_entry_point_rule_message() {
        let err = OrderError::UndefinedEntryPointRule {
            entry_point: "Quote".into(),
            rule: "missing".into(),
        };
        assert_eq!(
            err.to_string(),
            "entry point 'Quote' references undefined rule 'missing'"
        );
    }

    #[test]
    fn missing_payload_message() {
        let err = OrderError::MissingPayload {
            rule: "bare".into(),
        };
        assert_eq!(err.to_string(), "rule 'bare' has no payload");
    }

    #[test]
    fn empty_target_path_message() {
        let err = OrderError::EmptyTargetPath { rule: "r1".into() };
        assert_eq!(err.to_string(), "rule 'r1' has an empty target path");
    }

    #[test]
    fn cyclic_dependency_message() {
        let err = OrderError::CyclicDependency {
            cycles: vec![DependencyCycle {
                members: vec![
                    CycleMember {
                        rule: "R1".into(),
                        context_name: "Policy".into(),
                        target_path: "premium".into(),
                        dependencies: vec!["Policy.limit".into()],
                    },
                    CycleMember {
                        rule: "R2".into(),
                        context_name: "Policy".into(),
                        target_path: "limit".into(),
                        dependencies: vec!["Policy.premium".into(), "Vehicle.value".into()],
                    },
                ],
            }],
        };
        assert_eq!(
            err.to_string(),
            "cyclic dependency detected:\n\
             cycle 1:\n  \
             rule 'R1' on Policy.premium depends on [Policy.limit]\n  \
             rule 'R2' on Policy.limit depends on [Policy.premium, Vehicle.value]"
        );
    }
}
