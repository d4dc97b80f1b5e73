//! Dependency graph construction and topological waves.

use crate::phase::PhaseId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One declared phase, as fed to the scheduler.
///
/// `completed` is derived from on-disk artifact counts by the caller; the
/// scheduler treats it as an opaque flag. Immutable for the duration of one
/// scheduling computation.
#[derive(Debug, Clone)]
pub struct PhaseNode {
    pub id: PhaseId,
    pub declared_deps: Vec<PhaseId>,
    pub completed: bool,
}

impl PhaseNode {
    pub fn new(id: PhaseId, declared_deps: Vec<PhaseId>, completed: bool) -> Self {
        Self {
            id,
            declared_deps,
            completed,
        }
    }
}

/// A dependency pointing at a phase that was never declared.
///
/// Never becomes an edge; always treated as satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRef {
    pub phase: PhaseId,
    pub references: PhaseId,
}

/// The graph is not acyclic; names every node left unprocessed by Kahn's
/// algorithm (each participates in at least one cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub nodes: Vec<PhaseId>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.nodes.iter().map(|n| n.to_string()).collect();
        write!(f, "Cycle detected involving: {}", names.join(", "))
    }
}

/// Nodes plus resolvable edges (dep -> dependent) plus missing references.
///
/// Every edge endpoint is a declared node; declared dependencies that do not
/// resolve land in `missing_refs` instead.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<PhaseId>,
    edges: Vec<(PhaseId, PhaseId)>,
    missing_refs: Vec<MissingRef>,
}

impl DependencyGraph {
    pub fn build(phases: &[PhaseNode]) -> Self {
        let nodes: Vec<PhaseId> = phases.iter().map(|p| p.id).collect();
        let mut edges = Vec::new();
        let mut missing_refs = Vec::new();

        for phase in phases {
            for dep in &phase.declared_deps {
                if nodes.contains(dep) {
                    edges.push((*dep, phase.id));
                } else {
                    missing_refs.push(MissingRef {
                        phase: phase.id,
                        references: *dep,
                    });
                }
            }
        }

        Self {
            nodes,
            edges,
            missing_refs,
        }
    }

    pub fn nodes(&self) -> &[PhaseId] {
        &self.nodes
    }

    pub fn edges(&self) -> &[(PhaseId, PhaseId)] {
        &self.edges
    }

    pub fn missing_refs(&self) -> &[MissingRef] {
        &self.missing_refs
    }

    /// Successors of `id` (phases that declared a dependency on it).
    pub fn depended_by(&self, id: PhaseId) -> Vec<PhaseId> {
        self.edges.iter().filter(|(from, _)| *from == id).map(|(_, to)| *to).collect()
    }

    /// Topological waves via Kahn's algorithm.
    ///
    /// Each wave is the current in-degree-0 frontier; every node appears in
    /// exactly one wave and wave(u) < wave(v) for every edge (u -> v). A
    /// cyclic graph returns `CycleError` — never a partial schedule.
    pub fn waves(&self) -> std::result::Result<Vec<Vec<PhaseId>>, CycleError> {
        let mut in_degree: BTreeMap<PhaseId, usize> = BTreeMap::new();
        let mut adjacency: BTreeMap<PhaseId, Vec<PhaseId>> = BTreeMap::new();
        for node in &self.nodes {
            in_degree.insert(*node, 0);
            adjacency.insert(*node, Vec::new());
        }
        for (from, to) in &self.edges {
            // build() guarantees both endpoints are declared nodes
            if let Some(successors) = adjacency.get_mut(from) {
                successors.push(*to);
            }
            in_degree.entry(*to).and_modify(|d| *d += 1);
        }

        let mut frontier: Vec<PhaseId> = self
            .nodes
            .iter()
            .copied()
            .filter(|n| in_degree[n] == 0)
            .collect();
        let mut waves = Vec::new();
        let mut processed = 0;

        while !frontier.is_empty() {
            frontier.sort();
            processed += frontier.len();
            let mut next = Vec::new();
            for node in &frontier {
                for succ in &adjacency[node] {
                    if let Some(degree) = in_degree.get_mut(succ) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*succ);
                        }
                    }
                }
            }
            waves.push(std::mem::replace(&mut frontier, next));
        }

        if processed != self.nodes.len() {
            let nodes = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(node, _)| node)
                .collect();
            return Err(CycleError { nodes });
        }
        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PhaseId {
        s.parse().unwrap()
    }

    fn node(s: &str, deps: &[&str]) -> PhaseNode {
        PhaseNode::new(id(s), deps.iter().map(|d| id(d)).collect(), false)
    }

    #[test]
    fn test_build_resolves_edges() {
        let graph = DependencyGraph::build(&[node("1", &[]), node("2", &["1"])]);
        assert_eq!(graph.nodes(), &[id("1"), id("2")]);
        assert_eq!(graph.edges(), &[(id("1"), id("2"))]);
        assert!(graph.missing_refs().is_empty());
    }

    #[test]
    fn test_build_records_missing_refs() {
        let graph = DependencyGraph::build(&[node("1", &[]), node("2", &["99"])]);
        assert!(graph.edges().is_empty());
        assert_eq!(
            graph.missing_refs(),
            &[MissingRef {
                phase: id("2"),
                references: id("99")
            }]
        );
    }

    #[test]
    fn test_waves_diamond() {
        // 7, 8 free; 9 <- 7,8; 10 <- 7; 11 <- 7,8,9,10
        let graph = DependencyGraph::build(&[
            node("7", &[]),
            node("8", &[]),
            node("9", &["7", "8"]),
            node("10", &["7"]),
            node("11", &["7", "8", "9", "10"]),
        ]);
        let waves = graph.waves().unwrap();
        assert_eq!(
            waves,
            vec![
                vec![id("7"), id("8")],
                vec![id("9"), id("10")],
                vec![id("11")],
            ]
        );
    }

    #[test]
    fn test_waves_cover_all_nodes_and_respect_edges() {
        let graph = DependencyGraph::build(&[
            node("1", &[]),
            node("2", &["1"]),
            node("3", &["1"]),
            node("4", &["2", "3"]),
            node("5", &[]),
        ]);
        let waves = graph.waves().unwrap();

        let total: usize = waves.iter().map(|w| w.len()).sum();
        assert_eq!(total, graph.nodes().len());

        let wave_of = |p: PhaseId| waves.iter().position(|w| w.contains(&p)).unwrap();
        for (from, to) in graph.edges() {
            assert!(wave_of(*from) < wave_of(*to), "edge {from} -> {to} out of order");
        }
    }

    #[test]
    fn test_waves_cycle_names_all_members() {
        let graph = DependencyGraph::build(&[node("1", &["3"]), node("2", &["1"]), node("3", &["2"])]);
        let err = graph.waves().unwrap_err();
        assert_eq!(err.nodes, vec![id("1"), id("2"), id("3")]);
        assert_eq!(err.to_string(), "Cycle detected involving: 1, 2, 3");
    }

    #[test]
    fn test_waves_cycle_excludes_reachable_prefix() {
        // 0 is clean; 1 <-> 2 cycle
        let graph = DependencyGraph::build(&[node("0", &[]), node("1", &["2"]), node("2", &["1"])]);
        let err = graph.waves().unwrap_err();
        assert_eq!(err.nodes, vec![id("1"), id("2")]);
    }

    #[test]
    fn test_missing_ref_does_not_gate_waves() {
        let graph = DependencyGraph::build(&[node("1", &[]), node("2", &["1", "99"])]);
        let waves = graph.waves().unwrap();
        assert_eq!(waves, vec![vec![id("1")], vec![id("2")]]);
    }

    #[test]
    fn test_depended_by() {
        let graph = DependencyGraph::build(&[node("1", &[]), node("2", &["1"]), node("3", &["1"])]);
        assert_eq!(graph.depended_by(id("1")), vec![id("2"), id("3")]);
        assert!(graph.depended_by(id("2")).is_empty());
    }
}
