use crate::symbols::UnitId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;

/// Dependency graph over interface-section `uses` clauses
#[derive(Debug)]
pub struct DependencyGraph {
    /// Adjacency list: unit -> units its interface uses
    edges: FxHashMap<UnitId, Vec<UnitId>>,
    /// All known units, ordered for deterministic traversal
    nodes: BTreeSet<UnitId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            edges: FxHashMap::default(),
            nodes: BTreeSet::new(),
        }
    }

    /// Add a unit and its dependencies to the graph
    pub fn add_unit(&mut self, id: UnitId, dependencies: Vec<UnitId>) {
        self.nodes.insert(id);
        for dep in &dependencies {
            self.nodes.insert(*dep);
        }
        self.edges.entry(id).or_default().extend(dependencies);
    }

    /// Every distinct cycle, each listed from its smallest unit id and
    /// closed by repeating the first unit.
    pub fn cycles(&self) -> Vec<Vec<UnitId>> {
        let mut visited = FxHashSet::default();
        let mut visiting = FxHashSet::default();
        let mut cycles = Vec::new();
        for node in &self.nodes {
            self.visit(*node, &mut visited, &mut visiting, &mut Vec::new(), &mut cycles);
        }

        let mut seen = FxHashSet::default();
        cycles
            .into_iter()
            .map(canonical_cycle)
            .filter(|cycle| seen.insert(cycle.clone()))
            .collect()
    }

    /// DFS visit with cycle collection
    fn visit(
        &self,
        node: UnitId,
        visited: &mut FxHashSet<UnitId>,
        visiting: &mut FxHashSet<UnitId>,
        path: &mut Vec<UnitId>,
        cycles: &mut Vec<Vec<UnitId>>,
    ) {
        if visiting.contains(&node) {
            if let Some(start) = path.iter().position(|n| *n == node) {
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                cycles.push(cycle);
            }
            return;
        }
        if visited.contains(&node) {
            return;
        }

        visiting.insert(node);
        path.push(node);

        if let Some(deps) = self.edges.get(&node) {
            for dep in deps {
                self.visit(*dep, visited, visiting, path, cycles);
            }
        }

        path.pop();
        visiting.remove(&node);
        visited.insert(node);
    }

    /// Get direct dependencies of a unit
    pub fn dependencies(&self, id: UnitId) -> &[UnitId] {
        self.edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.nodes.contains(&id)
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Rotate a closed cycle so it starts at its smallest unit.
fn canonical_cycle(mut cycle: Vec<UnitId>) -> Vec<UnitId> {
    cycle.pop();
    if let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, id)| **id)
        .map(|(i, _)| i)
    {
        cycle.rotate_left(min_pos);
    }
    if let Some(first) = cycle.first().copied() {
        cycle.push(first);
    }
    cycle
}
