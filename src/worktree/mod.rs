//! Worktree lifecycle: manifest store + create/reuse/merge/stash.

mod manager;
mod manifest;

pub use manager::{CreateOutcome, MergeOutcome, StashOutcome, WorktreeLifecycle};
pub use manifest::{manifest_path, worktree_key, WorktreeEntry, WorktreeManifest, WorktreeStatus};
