#![allow(dead_code)]

use std::str::FromStr;

use proptest::prelude::*;
use rust_decimal::Decimal;
use ruleweave::{num, RuleSet, RuleSetBuilder, RuntimeContextDefinition};

// --- Fixed context schema ---
// Policy, Vehicle, and Car (inherits Vehicle). Every rule targets one of a
// small pool of attributes, so dependencies collide often.

const CONTEXTS: &[&str] = &["Policy", "Vehicle", "Car"];
const ATTRIBUTES: &[&str] = &["premium", "tax", "value", "limit", "discount", "total"];

/// A generated rule: its context and target, plus the indices of earlier
/// rules whose targets it reads.
#[derive(Debug, Clone)]
pub struct GenRule {
    pub name: String,
    pub context_name: String,
    pub target_path: String,
    pub reads: Vec<usize>,
}

/// A generated rule set whose dependencies only point at earlier rules,
/// which makes it acyclic by construction.
#[derive(Debug, Clone)]
pub struct GenRuleSet {
    pub rules: Vec<GenRule>,
}

impl GenRuleSet {
    /// Freeze into an actual `RuleSet`.
    ///
    /// # Panics
    ///
    /// Panics if the generated rule set is rejected (should not happen with
    /// valid generators).
    #[must_use]
    pub fn build(&self) -> RuleSet {
        let mut builder = RuleSetBuilder::new()
            .context(RuntimeContextDefinition::new("Policy"))
            .context(RuntimeContextDefinition::new("Vehicle"))
            .context(RuntimeContextDefinition::new("Car").inherits("Vehicle"));
        for rule in &self.rules {
            let reads: Vec<(String, String)> = rule
                .reads
                .iter()
                .map(|&i| {
                    let read = &self.rules[i];
                    (read.context_name.clone(), read.target_path.clone())
                })
                .collect();
            builder = builder.rule(&rule.name, &rule.context_name, &rule.target_path, move |r| {
                reads
                    .iter()
                    .fold(r, |r, (ctx, path)| r.depends_on(ctx, path))
                    .default_value(num("1"))
            });
        }
        builder.build().expect("generated rule set should build")
    }

    /// Whether a rule with `consumer`'s dependencies reads what `producer`
    /// writes, following the fixed inheritance (Car inherits Vehicle).
    #[must_use]
    pub fn reads_from(&self, consumer: usize, producer: usize) -> bool {
        let writer = &self.rules[producer];
        self.rules[consumer].reads.iter().any(|&i| {
            let read = &self.rules[i];
            read.target_path == writer.target_path
                && related(&read.context_name, &writer.context_name)
        })
    }
}

fn ancestry(context: &str) -> &'static [&'static str] {
    match context {
        "Car" => &["Car", "Vehicle"],
        "Vehicle" => &["Vehicle"],
        _ => &["Policy"],
    }
}

fn related(read: &str, write: &str) -> bool {
    ancestry(read).iter().any(|a| ancestry(write).contains(a))
}

/// Generate 1..=10 rules, each reading up to three earlier rules.
pub fn arb_acyclic_ruleset() -> impl Strategy<Value = GenRuleSet> {
    prop::collection::vec(
        (
            prop::sample::select(CONTEXTS),
            prop::sample::select(ATTRIBUTES),
            prop::collection::vec(any::<prop::sample::Index>(), 0..=3),
        ),
        1..=10,
    )
    .prop_map(|specs| {
        let rules = specs
            .into_iter()
            .enumerate()
            .map(|(i, (context, attribute, picks))| {
                let mut reads: Vec<usize> = if i == 0 {
                    Vec::new()
                } else {
                    picks.iter().map(|p| p.index(i)).collect()
                };
                reads.sort_unstable();
                reads.dedup();
                GenRule {
                    name: format!("rule_{i}"),
                    context_name: context.to_owned(),
                    target_path: attribute.to_owned(),
                    reads,
                }
            })
            .collect();
        GenRuleSet { rules }
    })
}

/// Decimals with up to 17 significant digits and a scale up to 10.
pub fn arb_decimal() -> impl Strategy<Value = Decimal> {
    (any::<bool>(), 1_u64..=99_999_999_999_999_999, 0_u32..=10).prop_map(
        |(negative, mantissa, scale)| {
            let literal = format!("{}{mantissa}", if negative { "-" } else { "" });
            let mut n = Decimal::from_str(&literal).unwrap_or_default();
            n.set_scale(scale).unwrap_or_default();
            n
        },
    )
}
