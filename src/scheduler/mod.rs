//! Dependency graph scheduler.
//!
//! Pure functions over a declared phase set: graph construction with
//! missing-reference tracking, topological waves (Kahn's algorithm),
//! ready/blocked classification against current completion, and the
//! next-unblockable hint. No I/O happens here.

mod analysis;
mod graph;

pub use analysis::{analyze, next_unblockable, BlockedPhase, DagAnalysis, DagValidation, NextUnblockable, PhaseReport, Wave};
pub use graph::{CycleError, DependencyGraph, MissingRef, PhaseNode};
