//! Ready/blocked classification and the next-unblockable hint.

use super::graph::{DependencyGraph, MissingRef, PhaseNode};
use crate::phase::PhaseId;
use serde::Serialize;

/// Per-phase slice of the analysis output.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    pub phase: PhaseId,
    pub depends_on: Vec<PhaseId>,
    pub depended_by: Vec<PhaseId>,
    pub completed: bool,
}

/// One parallel batch of the topological schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wave {
    pub wave: usize,
    pub phases: Vec<PhaseId>,
}

/// A non-completed phase with unmet dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedPhase {
    pub phase: PhaseId,
    /// Sorted unmet dependency ids.
    pub waiting_on: Vec<PhaseId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DagValidation {
    pub is_dag: bool,
    pub cycle_error: Option<String>,
    pub missing_refs: Vec<MissingRef>,
    /// True iff every wave has exactly one member; `None` for cyclic graphs.
    pub fully_sequential: Option<bool>,
}

/// Full scheduler output for one phase set.
#[derive(Debug, Clone, Serialize)]
pub struct DagAnalysis {
    pub phases: Vec<PhaseReport>,
    /// `None` when the graph is cyclic — no partial schedule is ever returned.
    pub waves: Option<Vec<Wave>>,
    pub ready: Vec<PhaseId>,
    pub blocked: Vec<BlockedPhase>,
    pub completed: Vec<PhaseId>,
    pub validation: DagValidation,
}

/// The blocked phase estimated to need the fewest additional completions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextUnblockable {
    pub phase: PhaseId,
    pub remaining: usize,
}

/// Analyze a declared phase set: waves, ready/blocked, diagnostics.
///
/// A cyclic graph never panics or errors out of this function; it comes back
/// as `is_dag = false` with the implicated nodes in `cycle_error`. Missing
/// references are warnings only and never gate scheduling.
pub fn analyze(nodes: &[PhaseNode]) -> DagAnalysis {
    let graph = DependencyGraph::build(nodes);

    let (waves, cycle_error) = match graph.waves() {
        Ok(generations) => {
            let waves = generations
                .into_iter()
                .enumerate()
                .map(|(i, phases)| Wave { wave: i + 1, phases })
                .collect();
            (Some(waves), None)
        }
        Err(cycle) => (None, Some(cycle.to_string())),
    };

    let completed: Vec<PhaseId> = nodes.iter().filter(|n| n.completed).map(|n| n.id).collect();

    // Ready/blocked reflects current completion, not the static schedule.
    // Only dependencies that are declared nodes can block; missing refs are
    // always treated as satisfied.
    let mut ready = Vec::new();
    let mut blocked = Vec::new();
    for node in nodes {
        if node.completed {
            continue;
        }
        let mut unmet: Vec<PhaseId> = node
            .declared_deps
            .iter()
            .copied()
            .filter(|dep| graph.nodes().contains(dep) && !completed.contains(dep))
            .collect();
        if unmet.is_empty() {
            ready.push(node.id);
        } else {
            unmet.sort();
            blocked.push(BlockedPhase {
                phase: node.id,
                waiting_on: unmet,
            });
        }
    }

    let fully_sequential = waves
        .as_ref()
        .map(|waves: &Vec<Wave>| waves.iter().all(|w| w.phases.len() == 1));

    let phases = nodes
        .iter()
        .map(|node| PhaseReport {
            phase: node.id,
            depends_on: node.declared_deps.clone(),
            depended_by: graph.depended_by(node.id),
            completed: node.completed,
        })
        .collect();

    DagAnalysis {
        phases,
        waves,
        ready,
        blocked,
        completed,
        validation: DagValidation {
            is_dag: cycle_error.is_none(),
            cycle_error,
            missing_refs: graph.missing_refs().to_vec(),
            fully_sequential,
        },
    }
}

/// Pick the blocked phase with the fewest dependencies still outstanding.
///
/// `remaining` recounts each waiting-on list against `completed`, so a
/// dependency finished since the blocked annotation was written counts as
/// satisfied (remaining can reach zero). Ties on the count break to the
/// lowest phase id.
pub fn next_unblockable(blocked: &[BlockedPhase], completed: &[PhaseId]) -> Option<NextUnblockable> {
    let mut best: Option<NextUnblockable> = None;
    for row in blocked {
        let remaining = row.waiting_on.iter().filter(|dep| !completed.contains(dep)).count();
        let better = match &best {
            None => true,
            Some(current) => {
                remaining < current.remaining
                    || (remaining == current.remaining && row.phase < current.phase)
            }
        };
        if better {
            best = Some(NextUnblockable {
                phase: row.phase,
                remaining,
            });
        }
    }
    best
}
