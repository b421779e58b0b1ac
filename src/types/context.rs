use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::trace;

/// Static description of a context type: its ancestors, navigable children,
/// and fields. Only the ancestry matters for ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuntimeContextDefinition {
    name: String,
    inherited_contexts: Vec<String>,
    children: IndexMap<String, String>,
    fields: IndexMap<String, String>,
}

impl RuntimeContextDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inherited_contexts: Vec::new(),
            children: IndexMap::new(),
            fields: IndexMap::new(),
        }
    }

    /// Declare an ancestor context type.
    #[must_use]
    pub fn inherits(mut self, ancestor: impl Into<String>) -> Self {
        let ancestor = ancestor.into();
        if !self.inherited_contexts.contains(&ancestor) {
            self.inherited_contexts.push(ancestor);
        }
        self
    }

    /// Declare a navigable child: `name` leads to a context of type `context_name`.
    #[must_use]
    pub fn child(mut self, name: impl Into<String>, context_name: impl Into<String>) -> Self {
        self.children.insert(name.into(), context_name.into());
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), type_name.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn inherited_contexts(&self) -> &[String] {
        &self.inherited_contexts
    }

    #[must_use]
    pub fn children(&self) -> &IndexMap<String, String> {
        &self.children
    }

    #[must_use]
    pub fn fields(&self) -> &IndexMap<String, String> {
        &self.fields
    }
}

/// Lookup of context definitions by name.
pub trait ContextRepository: Send + Sync {
    fn definition(&self, name: &str) -> Option<&RuntimeContextDefinition>;
}

impl ContextRepository for IndexMap<String, RuntimeContextDefinition> {
    fn definition(&self, name: &str) -> Option<&RuntimeContextDefinition> {
        self.get(name)
    }
}

impl ContextRepository for HashMap<String, RuntimeContextDefinition> {
    fn definition(&self, name: &str) -> Option<&RuntimeContextDefinition> {
        self.get(name)
    }
}

/// Memoizes the ancestor closure of context names over one repository.
///
/// Entries are never invalidated individually; build a new cache when the
/// rule set changes.
pub struct InheritanceCache<'r> {
    repository: &'r dyn ContextRepository,
    closures: DashMap<String, Arc<[String]>>,
}

impl<'r> InheritanceCache<'r> {
    #[must_use]
    pub fn new(repository: &'r dyn ContextRepository) -> Self {
        Self {
            repository,
            closures: DashMap::new(),
        }
    }

    /// `name` followed by all of its transitive ancestors, breadth first,
    /// without duplicates. Unknown names have no ancestors.
    #[must_use]
    pub fn ancestry(&self, name: &str) -> Arc<[String]> {
        if let Some(hit) = self.closures.get(name) {
            return Arc::clone(hit.value());
        }
        let closure: Arc<[String]> = self.resolve(name).into();
        trace!(context = name, ancestors = closure.len() - 1, "resolved inheritance closure");
        self.closures
            .entry(name.to_owned())
            .or_insert(closure)
            .value()
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.closures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.closures.is_empty()
    }

    fn resolve(&self, name: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut out = vec![name.to_owned()];
        let mut queue = VecDeque::new();
        seen.insert(name);
        queue.push_back(name.to_owned());
        while let Some(current) = queue.pop_front() {
            let Some(definition) = self.repository.definition(&current) else {
                continue;
            };
            for ancestor in definition.inherited_contexts() {
                if seen.insert(ancestor.as_str()) {
                    out.push(ancestor.clone());
                    queue.push_back(ancestor.clone());
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for InheritanceCache<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InheritanceCache")
            .field("cached", &self.closures.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> IndexMap<String, RuntimeContextDefinition> {
        [
            RuntimeContextDefinition::new("Coverage"),
            RuntimeContextDefinition::new("VehicleCoverage").inherits("Coverage"),
            RuntimeContextDefinition::new("CollisionCoverage")
                .inherits("VehicleCoverage")
                .inherits("Deductible"),
            RuntimeContextDefinition::new("Deductible").inherits("Coverage"),
        ]
        .into_iter()
        .map(|d| (d.name().to_owned(), d))
        .collect()
    }

    #[test]
    fn closure_is_transitive_and_deduplicated() {
        let repo = repository();
        let cache = InheritanceCache::new(&repo);
        assert_eq!(
            &*cache.ancestry("CollisionCoverage"),
            ["CollisionCoverage", "VehicleCoverage", "Deductible", "Coverage"]
        );
    }

    #[test]
    fn unknown_context_is_its_own_closure() {
        let repo = repository();
        let cache = InheritanceCache::new(&repo);
        assert_eq!(&*cache.ancestry("Driver"), ["Driver"]);
    }

    #[test]
    fn results_are_memoized() {
        let repo = repository();
        let cache = InheritanceCache::new(&repo);
        assert!(cache.is_empty());
        let first = cache.ancestry("VehicleCoverage");
        let second = cache.ancestry("VehicleCoverage");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn inheritance_loops_terminate() {
        let repo: IndexMap<String, RuntimeContextDefinition> = [
            RuntimeContextDefinition::new("A").inherits("B"),
            RuntimeContextDefinition::new("B").inherits("A"),
        ]
        .into_iter()
        .map(|d| (d.name().to_owned(), d))
        .collect();
        let cache = InheritanceCache::new(&repo);
        assert_eq!(&*cache.ancestry("A"), ["A", "B"]);
    }

    #[test]
    fn definition_builder() {
        let def = RuntimeContextDefinition::new("Policy")
            .inherits("Base")
            .inherits("Base")
            .child("vehicles", "Vehicle")
            .field("premium", "Money");
        assert_eq!(def.inherited_contexts(), ["Base"]);
        assert_eq!(def.children().get("vehicles").map(String::as_str), Some("Vehicle"));
        assert_eq!(def.fields().len(), 1);
    }
}
