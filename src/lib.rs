//! phaser - multi-agent phase coordination over git worktrees
//!
//! Coordinates independent agent processes collaborating on ordered project
//! phases: a pure dependency-graph scheduler, an advisory claim registry
//! over a shared state document, and a worktree lifecycle manager that gives
//! each phase an isolated working copy.

pub mod config;
pub mod error;
pub mod git;
pub mod phase;
pub mod roadmap;
pub mod scheduler;
pub mod statedoc;
pub mod worktree;

pub use error::{PhaserError, Result};
