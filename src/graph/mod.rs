//! Dependency Graph
//!
//! A small arena-style directed graph shared by the module resolver and the
//! hook scheduler. Nodes are identified by any hashable, displayable key and
//! stored in insertion order; edges point from a dependent to its dependency.

use crate::error::{ModstrapError, Result};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::hash::Hash;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Directed graph with cycle detection and wave-based topological ordering.
///
/// `add_edge(from, to)` reads as "`from` depends on `to`": `to` is placed in
/// an earlier wave than `from`.
///
/// # Example
///
/// ```
/// use modstrap::graph::DependencyGraph;
///
/// let mut graph = DependencyGraph::new();
/// graph.add_node("db");
/// graph.add_node("users");
/// graph.add_edge(&"users", &"db").unwrap();
///
/// let waves = graph.topo_order().unwrap();
/// assert_eq!(waves, vec![vec!["db"], vec!["users"]]);
/// ```
#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    nodes: Vec<K>,
    index: HashMap<K, usize>,
    deps: Vec<BTreeSet<usize>>,
}

impl<K> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            deps: Vec::new(),
        }
    }
}

impl<K> DependencyGraph<K>
where
    K: Clone + Eq + Hash + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Adding an existing node is a no-op.
    pub fn add_node(&mut self, id: K) {
        if self.index.contains_key(&id) {
            return;
        }
        self.index.insert(id.clone(), self.nodes.len());
        self.nodes.push(id);
        self.deps.push(BTreeSet::new());
    }

    /// Declare that `from` depends on `to`.
    ///
    /// # Errors
    /// Returns [`ModstrapError::UnknownNode`] if either node was never added.
    pub fn add_edge(&mut self, from: &K, to: &K) -> Result<()> {
        let from_idx = self.lookup(from)?;
        let to_idx = self.lookup(to)?;
        self.deps[from_idx].insert(to_idx);
        Ok(())
    }

    /// Remove a previously declared edge. Returns `true` if it existed.
    pub fn remove_edge(&mut self, from: &K, to: &K) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&f), Some(&t)) => self.deps[f].remove(&t),
            _ => false,
        }
    }

    pub fn contains(&self, id: &K) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &K> {
        self.nodes.iter()
    }

    /// Direct dependencies of `id`, in insertion order of the dependencies.
    pub fn dependencies_of(&self, id: &K) -> Vec<&K> {
        self.index
            .get(id)
            .map(|&i| self.deps[i].iter().map(|&d| &self.nodes[d]).collect())
            .unwrap_or_default()
    }

    /// Find a cycle with a depth-first search.
    ///
    /// Returns the cyclic path with the first node repeated at the end
    /// (`a -> b -> a`), or `None` for an acyclic graph. Traversal follows
    /// insertion order, so the reported path is deterministic.
    pub fn detect_cycle(&self) -> Option<Vec<K>> {
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::Unvisited {
                continue;
            }

            marks[start] = Mark::OnStack;
            let mut stack = vec![(start, self.deps[start].iter())];

            loop {
                let Some(frame) = stack.last_mut() else {
                    break;
                };
                let node = frame.0;
                let next = frame.1.next().copied();

                match next {
                    Some(child) => match marks[child] {
                        Mark::Unvisited => {
                            marks[child] = Mark::OnStack;
                            stack.push((child, self.deps[child].iter()));
                        }
                        Mark::OnStack => {
                            let pos = stack
                                .iter()
                                .position(|(n, _)| *n == child)
                                .unwrap_or(0);
                            let mut path: Vec<K> = stack[pos..]
                                .iter()
                                .map(|(n, _)| self.nodes[*n].clone())
                                .collect();
                            path.push(self.nodes[child].clone());
                            return Some(path);
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }

        None
    }

    /// Topological waves with nodes inside a wave kept in insertion order.
    pub fn topo_order(&self) -> Result<Vec<Vec<K>>> {
        self.topo_order_by(|_| ())
    }

    /// Topological waves, each wave sorted by `key` and then insertion order.
    ///
    /// Wave `n` holds every node whose dependencies all sit in waves `< n`.
    /// Wave membership is the ordering guarantee; the order inside a wave
    /// exists for reproducible iteration and logging only.
    ///
    /// # Errors
    /// Returns [`ModstrapError::Cycle`] carrying the offending path if the
    /// graph is not acyclic.
    pub fn topo_order_by<S, F>(&self, mut key: F) -> Result<Vec<Vec<K>>>
    where
        S: Ord,
        F: FnMut(&K) -> S,
    {
        let n = self.nodes.len();
        let mut remaining: Vec<usize> = self.deps.iter().map(BTreeSet::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (node, deps) in self.deps.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut current: Vec<usize> = (0..n).filter(|&i| remaining[i] == 0).collect();
        let mut waves = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            placed += current.len();

            let mut next = Vec::new();
            for &node in &current {
                for &dependent in &dependents[node] {
                    remaining[dependent] -= 1;
                    if remaining[dependent] == 0 {
                        next.push(dependent);
                    }
                }
            }

            current.sort_by_cached_key(|&i| (key(&self.nodes[i]), i));
            waves.push(current.iter().map(|&i| self.nodes[i].clone()).collect());
            current = next;
        }

        if placed < n {
            let path = self
                .detect_cycle()
                .unwrap_or_default()
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(ModstrapError::Cycle { path });
        }

        Ok(waves)
    }

    fn lookup(&self, id: &K) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ModstrapError::UnknownNode { id: id.to_string() })
    }
}
