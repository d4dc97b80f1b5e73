//! Shared state document.
//!
//! A single markdown document (`.planning/STATE.md` inside each working
//! copy) carries three pipe-delimited tables: worktree claims, verification
//! results, and the active-phases view with its trailing next-unblockable
//! hint. Coordination over this document is advisory and non-atomic: each
//! operation is a load -> modify -> store cycle with no cross-process lock,
//! so two processes racing the same table can both observe the pre-write
//! state (see the claim registry docs). Writes themselves go through an
//! atomic rename so readers never observe a half-written document.

pub mod active;
pub mod claims;
mod table;

pub use active::{ActivePhaseRow, ActivePhasesView, PhaseRowUpdate, UpsertOutcome};
pub use claims::{
    ClaimOutcome, ClaimRegistry, ClaimRow, CleanOutcome, ReleaseOutcome, UpdatePlanOutcome, VerifyOutcome,
};
pub use table::TableSchema;

use crate::error::{PhaserError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Fixed path of the state document relative to a working-copy root.
pub fn state_doc_path(worktree_root: &Path) -> PathBuf {
    worktree_root.join(".planning").join("STATE.md")
}

/// One loaded copy of the shared state document.
#[derive(Debug, Clone)]
pub struct StateDoc {
    path: PathBuf,
    pub content: String,
}

impl StateDoc {
    /// Load the document for a working copy; `NotFound` when absent.
    pub fn load(worktree_root: &Path) -> Result<Self> {
        let path = state_doc_path(worktree_root);
        if !path.exists() {
            return Err(PhaserError::NotFound(format!("state document {}", path.display())));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Self { path, content })
    }

    pub fn exists(worktree_root: &Path) -> bool {
        state_doc_path(worktree_root).exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist via write-to-temp + rename so concurrent readers never see a
    /// torn document. This does not close the read-modify-write race between
    /// two writers; last writer wins.
    pub fn store(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| PhaserError::Document(format!("no parent directory for {}", self.path.display())))?;
        std::fs::create_dir_all(parent)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(self.content.as_bytes())?;
        tmp.persist(&self.path)
            .map_err(|e| PhaserError::Document(format!("failed to persist {}: {}", self.path.display(), e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = StateDoc::load(temp.path()).unwrap_err();
        assert!(matches!(err, PhaserError::NotFound(_)));
    }

    #[test]
    fn test_store_and_reload() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".planning")).unwrap();
        std::fs::write(state_doc_path(temp.path()), "# State\n").unwrap();

        let mut doc = StateDoc::load(temp.path()).unwrap();
        doc.content.push_str("\nmore\n");
        doc.store().unwrap();

        let reloaded = StateDoc::load(temp.path()).unwrap();
        assert_eq!(reloaded.content, "# State\n\nmore\n");
    }

    #[test]
    fn test_store_creates_planning_dir() {
        let temp = TempDir::new().unwrap();
        let doc = StateDoc {
            path: state_doc_path(temp.path()),
            content: "# State\n".to_string(),
        };
        doc.store().unwrap();
        assert!(StateDoc::exists(temp.path()));
    }
}
