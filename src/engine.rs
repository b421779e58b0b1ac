//! Versioned rule ordering with a concurrent snapshot cache.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::graph::DependencyGraph;
use crate::{OrderError, RuleSet, RuleSetChecksum, RuntimeRule};

/// The dependency order of one rule-set version. Immutable; share it via `Arc`.
#[derive(Debug, Clone)]
pub struct RuleOrder {
    checksum: RuleSetChecksum,
    rules: Vec<Arc<RuntimeRule>>,
    entry_points: IndexMap<String, Vec<Arc<RuntimeRule>>>,
    edge_count: usize,
}

impl RuleOrder {
    /// Order every rule of `ruleset`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::CyclicDependency`] if the rules depend on each
    /// other circularly.
    pub fn build(ruleset: &RuleSet) -> Result<Self, OrderError> {
        let graph = DependencyGraph::build(ruleset.rules(), ruleset);
        let rules = graph.order()?;
        let entry_points = ruleset
            .entry_points()
            .iter()
            .map(|(name, members)| {
                let members: HashSet<&str> = members.iter().map(String::as_str).collect();
                let ordered = rules
                    .iter()
                    .filter(|r| members.contains(r.name()))
                    .cloned()
                    .collect();
                (name.clone(), ordered)
            })
            .collect();
        Ok(Self {
            checksum: ruleset.checksum(),
            rules,
            entry_points,
            edge_count: graph.edge_count(),
        })
    }

    #[must_use]
    pub fn checksum(&self) -> RuleSetChecksum {
        self.checksum
    }

    /// All rules, producers before consumers.
    #[must_use]
    pub fn rules(&self) -> &[Arc<RuntimeRule>] {
        &self.rules
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// The members of entry point `name`, in global dependency order.
    #[must_use]
    pub fn entry_point(&self, name: &str) -> Option<&[Arc<RuntimeRule>]> {
        self.entry_points.get(name).map(Vec::as_slice)
    }

    #[must_use]
    pub fn position(&self, rule_name: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.name() == rule_name)
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

/// Computes rule orders once per rule-set version.
///
/// Orders are cached by [`RuleSetChecksum`]. A new version gets a fresh
/// snapshot; callers still holding an older `Arc<RuleOrder>` are unaffected.
#[derive(Debug, Default)]
pub struct RuleOrderingEngine {
    cache: DashMap<RuleSetChecksum, Arc<RuleOrder>>,
}

impl RuleOrderingEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The order for `ruleset`, built on first request for its version.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::CyclicDependency`] if the rules depend on each
    /// other circularly. Failures are not cached.
    pub fn order(&self, ruleset: &RuleSet) -> Result<Arc<RuleOrder>, OrderError> {
        let checksum = ruleset.checksum();
        if let Some(hit) = self.cache.get(&checksum) {
            trace!(%checksum, "rule order cache hit");
            return Ok(Arc::clone(hit.value()));
        }
        debug!(%checksum, rules = ruleset.len(), "rule order cache miss");
        let built = Arc::new(RuleOrder::build(ruleset)?);
        // A concurrent builder may have won; keep whichever landed first.
        let order = self.cache.entry(checksum).or_insert(built).value().clone();
        Ok(order)
    }

    /// Drop every cached order.
    pub fn invalidate_all(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        debug!(dropped, "invalidated rule order cache");
    }

    #[must_use]
    pub fn cached_versions(&self) -> usize {
        self.cache.len()
    }
}
