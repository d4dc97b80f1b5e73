//! Worktree manifest store.
//!
//! One JSON record per repository at `.worktrees/manifest.json` describing
//! every known isolated working copy. Entries are never deleted
//! automatically; an entry whose backing directory vanished is stale and is
//! self-healed on the next `create` for that key.

use crate::error::{PhaserError, Result};
use crate::phase::PhaseId;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const MANIFEST_VERSION: &str = "1.0";

/// Deterministic manifest key for a phase: "p07", "p06.2".
pub fn worktree_key(phase: PhaseId) -> String {
    format!("p{}", phase.normalized())
}

pub fn manifest_path(repo_root: &Path) -> PathBuf {
    repo_root.join(".worktrees").join("manifest.json")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorktreeStatus {
    Active,
    Stashed,
    Merged,
}

/// One logical worktree record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeEntry {
    /// Path relative to the repository root, e.g. ".worktrees/p07".
    pub path: String,
    pub branch: String,
    pub phase: PhaseId,
    pub phase_name: Option<String>,
    pub created: String,
    pub status: WorktreeStatus,
    pub stash_ref: Option<String>,
    pub last_commit: Option<String>,
    pub merged: bool,
    pub merged_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeManifest {
    pub version: String,
    pub project: Option<String>,
    pub worktrees: BTreeMap<String, WorktreeEntry>,
    pub updated: Option<String>,
}

impl Default for WorktreeManifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            project: None,
            worktrees: BTreeMap::new(),
            updated: None,
        }
    }
}

impl WorktreeManifest {
    /// Load the manifest for a repository; empty default when none exists.
    pub fn load(repo_root: &Path) -> Result<Self> {
        let path = manifest_path(repo_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw)
            .map_err(|e| PhaserError::Manifest(format!("invalid manifest {}: {}", path.display(), e)))
    }

    /// Persist atomically (write-temp + rename), refreshing `updated`.
    pub fn save(&mut self, repo_root: &Path) -> Result<()> {
        let path = manifest_path(repo_root);
        let parent = path
            .parent()
            .ok_or_else(|| PhaserError::Manifest(format!("no parent directory for {}", path.display())))?;
        std::fs::create_dir_all(parent)?;
        self.updated = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));

        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        let json = serde_json::to_string_pretty(self)?;
        tmp.write_all(json.as_bytes())?;
        tmp.write_all(b"\n")?;
        tmp.persist(&path)
            .map_err(|e| PhaserError::Manifest(format!("failed to persist {}: {}", path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> PhaseId {
        s.parse().unwrap()
    }

    fn entry(phase: &str) -> WorktreeEntry {
        WorktreeEntry {
            path: format!(".worktrees/{}", worktree_key(id(phase))),
            branch: format!("phase-{}", id(phase).normalized()),
            phase: id(phase),
            phase_name: Some("Auth layer".to_string()),
            created: "2026-01-01T00:00:00Z".to_string(),
            status: WorktreeStatus::Active,
            stash_ref: None,
            last_commit: None,
            merged: false,
            merged_at: None,
        }
    }

    #[test]
    fn test_worktree_key() {
        assert_eq!(worktree_key(id("7")), "p07");
        assert_eq!(worktree_key(id("6.2")), "p06.2");
    }

    #[test]
    fn test_load_missing_is_empty_default() {
        let temp = TempDir::new().unwrap();
        let manifest = WorktreeManifest::load(temp.path()).unwrap();
        assert_eq!(manifest.version, MANIFEST_VERSION);
        assert!(manifest.worktrees.is_empty());
        assert!(manifest.updated.is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let mut manifest = WorktreeManifest::default();
        manifest.project = Some("demo".to_string());
        manifest.worktrees.insert(worktree_key(id("7")), entry("7"));
        manifest.save(temp.path()).unwrap();

        let reloaded = WorktreeManifest::load(temp.path()).unwrap();
        assert_eq!(reloaded.project.as_deref(), Some("demo"));
        assert!(reloaded.updated.is_some());
        let e = &reloaded.worktrees["p07"];
        assert_eq!(e.phase, id("7"));
        assert_eq!(e.status, WorktreeStatus::Active);
        assert!(!e.merged);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&WorktreeStatus::Stashed).unwrap();
        assert_eq!(json, "\"stashed\"");
    }

    #[test]
    fn test_invalid_manifest_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".worktrees")).unwrap();
        std::fs::write(manifest_path(temp.path()), "{not json").unwrap();
        let err = WorktreeManifest::load(temp.path()).unwrap_err();
        assert!(matches!(err, PhaserError::Manifest(_)));
    }
}
