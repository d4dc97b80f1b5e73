//! Worktree lifecycle manager.
//!
//! Creates, reuses, merges, and stashes isolated working copies, one per
//! phase, keeping the manifest in sync with what actually exists on disk.

use super::manifest::{worktree_key, WorktreeEntry, WorktreeManifest, WorktreeStatus};
use crate::config::Config;
use crate::error::{PhaserError, Result};
use crate::git::{GitBackend, StashPopOutcome};
use crate::phase::PhaseId;
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct CreateOutcome {
    pub created: bool,
    pub reused: bool,
    pub path: String,
    pub branch: String,
    pub stash_restored: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub merged: bool,
    pub conflicts: bool,
    pub conflict_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StashOutcome {
    pub stashed: bool,
    pub stash_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Lifecycle operations bound to one repository root.
#[derive(Debug)]
pub struct WorktreeLifecycle<'a> {
    repo_root: PathBuf,
    backend: &'a GitBackend,
    config: &'a Config,
}

impl<'a> WorktreeLifecycle<'a> {
    pub fn new(repo_root: impl Into<PathBuf>, backend: &'a GitBackend, config: &'a Config) -> Self {
        Self {
            repo_root: repo_root.into(),
            backend,
            config,
        }
    }

    fn relative_path(&self, key: &str) -> String {
        format!("{}/{}", self.config.git.worktree_base, key)
    }

    fn branch_name(&self, phase: PhaseId) -> String {
        format!("phase-{}", phase.normalized())
    }

    /// Configured primary branch, or the detected one (main, else master).
    fn primary_branch(&self) -> String {
        match &self.config.git.main_branch {
            Some(branch) => branch.clone(),
            None => self.backend.default_branch(&self.repo_root),
        }
    }

    /// Create a working copy for `phase`, or reuse the existing one.
    ///
    /// An existing manifest entry whose directory is still on disk is reused
    /// (restoring any pending stash, best effort). An entry whose directory
    /// vanished is stale: it is discarded and a fresh worktree is created.
    pub fn create(&self, phase: PhaseId, base: Option<&str>, phase_name: Option<String>) -> Result<CreateOutcome> {
        let key = worktree_key(phase);
        let rel_path = self.relative_path(&key);
        let abs_path = self.repo_root.join(&rel_path);
        let mut manifest = WorktreeManifest::load(&self.repo_root)?;

        if let Some(entry) = manifest.worktrees.get_mut(&key) {
            if abs_path.exists() {
                info!("reusing existing worktree for phase {}", phase);
                let mut stash_restored = false;
                if entry.stash_ref.is_some() {
                    match self.backend.stash_pop(&abs_path) {
                        StashPopOutcome::Restored => stash_restored = true,
                        StashPopOutcome::NothingToRestore => {
                            info!("no stash entries to restore in {}", rel_path);
                        }
                        StashPopOutcome::Failed(reason) => {
                            warn!("could not restore stash in {}: {}", rel_path, reason);
                        }
                    }
                    entry.stash_ref = None;
                }
                entry.status = WorktreeStatus::Active;
                let branch = entry.branch.clone();
                manifest.save(&self.repo_root)?;
                return Ok(CreateOutcome {
                    created: false,
                    reused: true,
                    path: rel_path,
                    branch,
                    stash_restored,
                });
            }
            info!("discarding stale manifest entry for phase {} (directory gone)", phase);
            manifest.worktrees.remove(&key);
        }

        let branch = self.branch_name(phase);
        let base = match base {
            Some(b) => b.to_string(),
            None => self.primary_branch(),
        };
        std::fs::create_dir_all(self.repo_root.join(&self.config.git.worktree_base))?;
        self.backend.create_worktree(&self.repo_root, &abs_path, &branch, &base)?;

        self.copy_planning_state(&abs_path);
        self.init_progress_record(&abs_path, phase, phase_name.as_deref());

        if manifest.project.is_none() {
            manifest.project = self
                .repo_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string());
        }
        manifest.worktrees.insert(
            key,
            WorktreeEntry {
                path: rel_path.clone(),
                branch: branch.clone(),
                phase,
                phase_name,
                created: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                status: WorktreeStatus::Active,
                stash_ref: None,
                last_commit: None,
                merged: false,
                merged_at: None,
            },
        );
        manifest.save(&self.repo_root)?;

        Ok(CreateOutcome {
            created: true,
            reused: false,
            path: rel_path,
            branch,
            stash_restored: false,
        })
    }

    /// Non-fast-forward merge of the phase branch into `into` (default: the
    /// detected primary branch). Conflicts are reported with the list of
    /// conflicting paths — nothing is aborted or resolved automatically.
    pub fn merge(&self, phase: PhaseId, into: Option<&str>) -> Result<MergeOutcome> {
        let branch = self.branch_name(phase);
        let into = match into {
            Some(b) => b.to_string(),
            None => self.primary_branch(),
        };
        let message = format!("merge: phase {} into {}", phase, into);

        let out = self.backend.merge_no_ff(&self.repo_root, &branch, &message)?;
        if !out.success {
            let conflict_files = self.backend.conflicted_paths(&self.repo_root)?;
            if !conflict_files.is_empty() {
                return Ok(MergeOutcome {
                    merged: false,
                    conflicts: true,
                    conflict_files,
                });
            }
            return Err(PhaserError::Backend(format!(
                "merge of {} failed: {}",
                branch,
                if out.stderr.is_empty() { out.stdout } else { out.stderr }
            )));
        }

        let mut manifest = WorktreeManifest::load(&self.repo_root)?;
        if let Some(entry) = manifest.worktrees.get_mut(&worktree_key(phase)) {
            entry.merged = true;
            entry.merged_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
            entry.status = WorktreeStatus::Merged;
            manifest.save(&self.repo_root)?;
        }

        Ok(MergeOutcome {
            merged: true,
            conflicts: false,
            conflict_files: Vec::new(),
        })
    }

    /// Push uncommitted changes in the phase worktree into a labeled stash
    /// and record the reference. Nothing to stash is reported, not an error.
    pub fn stash(&self, phase: PhaseId) -> Result<StashOutcome> {
        let key = worktree_key(phase);
        let mut manifest = WorktreeManifest::load(&self.repo_root)?;
        let entry = manifest
            .worktrees
            .get_mut(&key)
            .ok_or_else(|| PhaserError::NotFound(format!("no worktree for phase {} in manifest", phase)))?;

        let abs_path = self.repo_root.join(&entry.path);
        if !abs_path.exists() {
            return Err(PhaserError::NotFound(format!(
                "worktree directory not found: {}",
                entry.path
            )));
        }

        let label = format!("phaser-checkpoint-phase-{}", phase);
        let out = self.backend.stash_push(&abs_path, &label)?;
        if out.stdout.contains("No local changes") || out.stderr.contains("No local changes") {
            return Ok(StashOutcome {
                stashed: false,
                stash_ref: None,
                reason: Some("no changes to stash".to_string()),
            });
        }
        if !out.success {
            return Err(PhaserError::Backend(format!("failed to stash: {}", out.stderr)));
        }

        let stash_ref = self.backend.latest_stash_ref(&abs_path);
        entry.stash_ref = stash_ref.clone();
        entry.status = WorktreeStatus::Stashed;
        manifest.save(&self.repo_root)?;

        Ok(StashOutcome {
            stashed: true,
            stash_ref,
            reason: None,
        })
    }

    /// The manifest as stored (empty default when none exists yet).
    pub fn list_manifest(&self) -> Result<WorktreeManifest> {
        WorktreeManifest::load(&self.repo_root)
    }

    /// Copy the shared planning state into a fresh worktree so its claim and
    /// status tables start from the primary copy. Best effort.
    fn copy_planning_state(&self, worktree: &Path) {
        let src = self.repo_root.join(".planning");
        if !src.exists() {
            return;
        }
        let dest = worktree.join(".planning");
        if let Err(e) = copy_dir_recursive(&src, &dest) {
            warn!("could not copy .planning/ into {}: {}", worktree.display(), e);
        }
    }

    /// Best-effort per-phase progress record inside the new worktree.
    fn init_progress_record(&self, worktree: &Path, phase: PhaseId, phase_name: Option<&str>) {
        let dir = worktree.join(".planning");
        let content = format!(
            "# Phase {} Status\n\nPhase: {}\nName: {}\nStarted: {}\n",
            phase,
            phase,
            phase_name.unwrap_or("unknown"),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let write = std::fs::create_dir_all(&dir).and_then(|_| std::fs::write(dir.join("STATUS.md"), content));
        if let Err(e) = write {
            warn!("could not initialize STATUS.md in {}: {}", worktree.display(), e);
        }
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
