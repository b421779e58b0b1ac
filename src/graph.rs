//! Dependency graph over rules and their target attributes.
//!
//! An edge `producer -> consumer` exists when `consumer` declares a dependency
//! on an attribute `producer` targets, matched by context name including every
//! ancestor of both sides. The producer must run first.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::types::{CycleMember, DependencyCycle};
use crate::{ContextRepository, InheritanceCache, OrderError, RuntimeRule};

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    rules: Vec<Arc<RuntimeRule>>,
    /// `producers[c]`: rules `c` reads from, ascending by input position.
    producers: Vec<Vec<usize>>,
    /// `consumers[p]`: rules reading what `p` writes, ascending by input position.
    consumers: Vec<Vec<usize>>,
    edge_count: usize,
}

impl DependencyGraph {
    /// Build the graph for `rules`, expanding context names through
    /// `contexts`' inheritance.
    pub fn build(rules: &[Arc<RuntimeRule>], contexts: &dyn ContextRepository) -> Self {
        let inheritance = InheritanceCache::new(contexts);

        // (context or ancestor name, target path) -> rules writing it
        let mut writers: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            for name in inheritance.ancestry(rule.context_name()).iter() {
                writers
                    .entry((name.clone(), rule.target_path().to_owned()))
                    .or_default()
                    .push(i);
            }
        }

        let mut producers = vec![Vec::new(); rules.len()];
        let mut consumers = vec![Vec::new(); rules.len()];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for (consumer, rule) in rules.iter().enumerate() {
            for dep in rule.dependencies() {
                for name in inheritance.ancestry(&dep.context_name).iter() {
                    let key = (name.clone(), dep.target_path.clone());
                    let Some(matches) = writers.get(&key) else {
                        continue;
                    };
                    for &producer in matches {
                        if producer != consumer && seen.insert((producer, consumer)) {
                            producers[consumer].push(producer);
                            consumers[producer].push(consumer);
                        }
                    }
                }
            }
        }
        for list in producers.iter_mut().chain(consumers.iter_mut()) {
            list.sort_unstable();
        }

        let edge_count = seen.len();
        debug!(
            rules = rules.len(),
            edges = edge_count,
            contexts_resolved = inheritance.len(),
            "built dependency graph"
        );
        Self {
            rules: rules.to_vec(),
            producers,
            consumers,
            edge_count,
        }
    }

    /// Rules in input order.
    #[must_use]
    pub fn rules(&self) -> &[Arc<RuntimeRule>] {
        &self.rules
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Names of the rules `rule_name` must run after, in input order.
    ///
    /// Returns `None` if the rule name is not found.
    #[must_use]
    pub fn dependencies_of(&self, rule_name: &str) -> Option<Vec<&str>> {
        self.position(rule_name)
            .map(|i| self.names(&self.producers[i]))
    }

    /// Names of the rules that must run after `rule_name`, in input order.
    ///
    /// Returns `None` if the rule name is not found.
    #[must_use]
    pub fn dependents_of(&self, rule_name: &str) -> Option<Vec<&str>> {
        self.position(rule_name)
            .map(|i| self.names(&self.consumers[i]))
    }

    /// Every producer before each of its consumers; independent rules keep
    /// their input order.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::CyclicDependency`] describing every cycle if the
    /// graph is not acyclic. No partial order is returned.
    pub fn order(&self) -> Result<Vec<Arc<RuntimeRule>>, OrderError> {
        let sorted = self.topological_sort();
        if sorted.len() != self.rules.len() {
            let emitted: HashSet<usize> = sorted.into_iter().collect();
            let cycles = self.find_cycles(&emitted);
            debug!(cycles = cycles.len(), "dependency cycle detected");
            return Err(OrderError::CyclicDependency { cycles });
        }
        Ok(sorted
            .into_iter()
            .map(|i| Arc::clone(&self.rules[i]))
            .collect())
    }

    fn position(&self, rule_name: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.name() == rule_name)
    }

    fn names(&self, indices: &[usize]) -> Vec<&str> {
        indices.iter().map(|&i| self.rules[i].name()).collect()
    }

    /// Kahn's algorithm; the ready set always yields the earliest input position.
    fn topological_sort(&self) -> Vec<usize> {
        let mut in_degree: Vec<usize> = self.producers.iter().map(Vec::len).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, deg)| **deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut sorted = Vec::with_capacity(self.rules.len());
        while let Some(next) = ready.pop_first() {
            for &consumer in &self.consumers[next] {
                in_degree[consumer] -= 1;
                if in_degree[consumer] == 0 {
                    ready.insert(consumer);
                }
            }
            sorted.push(next);
        }
        sorted
    }

    /// Strongly connected components among the rules Kahn could not emit.
    /// Rules merely downstream of a cycle form singleton components and are
    /// not reported.
    fn find_cycles(&self, emitted: &HashSet<usize>) -> Vec<DependencyCycle> {
        let active: Vec<bool> = (0..self.rules.len()).map(|i| !emitted.contains(&i)).collect();
        let mut tarjan = Tarjan::new(&self.consumers, &active);
        for node in 0..self.rules.len() {
            if active[node] && tarjan.index[node].is_none() {
                tarjan.visit(node);
            }
        }

        let mut components: Vec<Vec<usize>> = tarjan
            .components
            .into_iter()
            .filter(|c| c.len() > 1)
            .map(|mut c| {
                c.sort_unstable();
                c
            })
            .collect();
        components.sort_by_key(|c| c[0]);

        components
            .into_iter()
            .map(|members| DependencyCycle {
                members: members
                    .into_iter()
                    .map(|i| {
                        let rule = &self.rules[i];
                        CycleMember {
                            rule: rule.name().to_owned(),
                            context_name: rule.context_name().to_owned(),
                            target_path: rule.target_path().to_owned(),
                            dependencies: rule.distinct_dependency_targets(),
                        }
                    })
                    .collect(),
            })
            .collect()
    }
}

/// Tarjan's strongly connected components over the active subgraph.
struct Tarjan<'g> {
    adjacency: &'g [Vec<usize>],
    active: &'g [bool],
    index: Vec<Option<usize>>,
    low_link: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    components: Vec<Vec<usize>>,
}

impl<'g> Tarjan<'g> {
    fn new(adjacency: &'g [Vec<usize>], active: &'g [bool]) -> Self {
        let n = adjacency.len();
        Self {
            adjacency,
            active,
            index: vec![None; n],
            low_link: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next_index: 0,
            components: Vec::new(),
        }
    }

    /// Iterative depth-first walk; `frames` holds each open node with the
    /// position of its next unexplored edge.
    fn visit(&mut self, root: usize) {
        let adjacency = self.adjacency;
        let mut frames: Vec<(usize, usize)> = Vec::new();
        self.open(root);
        frames.push((root, 0));

        while let Some(frame) = frames.last_mut() {
            let (node, edge) = *frame;
            if let Some(&next) = adjacency[node].get(edge) {
                frame.1 += 1;
                if !self.active[next] {
                    continue;
                }
                match self.index[next] {
                    None => {
                        self.open(next);
                        frames.push((next, 0));
                    }
                    Some(next_index) if self.on_stack[next] => {
                        self.low_link[node] = self.low_link[node].min(next_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                self.low_link[parent] = self.low_link[parent].min(self.low_link[node]);
            }
            if Some(self.low_link[node]) == self.index[node] {
                let mut component = Vec::new();
                while let Some(member) = self.stack.pop() {
                    self.on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }

    fn open(&mut self, node: usize) {
        self.index[node] = Some(self.next_index);
        self.low_link[node] = self.next_index;
        self.next_index += 1;
        self.stack.push(node);
        self.on_stack[node] = true;
    }
}
