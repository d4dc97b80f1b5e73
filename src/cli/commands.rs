//! CLI command definitions using clap.
//!
//! Three command families:
//! - worktree: create/claim/release/merge/stash and related registry ops
//! - roadmap: dependency-graph analysis
//! - state: active-phases table access

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// phaser - coordinate multi-agent phase execution over git worktrees
#[derive(Parser, Debug)]
#[command(name = "phaser")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit machine-readable JSON on one line
    #[arg(long, global = true)]
    pub raw: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Worktree lifecycle and claim registry operations
    Worktree {
        #[command(subcommand)]
        command: WorktreeCommands,
    },

    /// Roadmap analysis
    Roadmap {
        #[command(subcommand)]
        command: RoadmapCommands,
    },

    /// Shared state document operations
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Worktree subcommands
#[derive(Subcommand, Debug)]
pub enum WorktreeCommands {
    /// Create (or reuse) the isolated working copy for a phase
    Create {
        /// Phase id, e.g. 7 or 6.2
        phase: String,

        /// Branch to create the worktree from (default: detected primary branch)
        #[arg(long)]
        base: Option<String>,
    },

    /// Claim a phase for the current worktree
    Claim {
        phase: String,
    },

    /// Release this worktree's claim on a phase
    Release {
        phase: String,
    },

    /// Set the plan field on this worktree's claim
    UpdatePlan {
        phase: String,
        /// Plan identifier, e.g. 07-02
        plan: String,
    },

    /// Remove claims whose worktrees no longer exist
    Clean,

    /// Show all claim rows
    Status,

    /// Merge a phase branch into the primary branch
    Merge {
        phase: String,

        /// Merge target branch (default: detected primary branch)
        #[arg(long)]
        into: Option<String>,
    },

    /// Stash uncommitted changes in a phase worktree
    Stash {
        phase: String,
    },

    /// Print the worktree manifest
    ListManifest,

    /// Record a verification result for a phase
    VerifyResult {
        phase: String,

        /// Verification tier, e.g. sanity or full
        #[arg(long)]
        tier: String,

        /// Verification result, e.g. pass or fail
        #[arg(long)]
        result: String,

        /// Blocking issues summary
        #[arg(long)]
        blockers: Option<String>,
    },
}

/// Roadmap subcommands
#[derive(Subcommand, Debug)]
pub enum RoadmapCommands {
    /// Analyze the phase dependency graph: waves, ready, blocked, warnings
    AnalyzeDag,
}

/// State document subcommands
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Print the active-phases table
    ActivePhases,

    /// Update (or insert) one row of the active-phases table
    UpdatePhaseRow {
        phase: String,

        #[arg(long)]
        status: Option<String>,

        #[arg(long)]
        worker: Option<String>,

        /// Progress as done/total, e.g. 2/4
        #[arg(long)]
        plans: Option<String>,

        #[arg(long)]
        name: Option<String>,

        /// Explicit timestamp (default: now)
        #[arg(long)]
        last_update: Option<String>,
    },
}
