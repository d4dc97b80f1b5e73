//! Worktree claim registry.
//!
//! Advisory mutual exclusion over phases: one claim row binds a phase to the
//! canonical root of the working copy that claimed it. Uniqueness is checked
//! at claim time only — there is no lock over the document, so two processes
//! that both read before either writes can produce a transient duplicate
//! claim. That window is a documented limitation of the storage contract;
//! `clean` and manual reconciliation resolve it.

use super::table::TableSchema;
use super::StateDoc;
use crate::config::Config;
use crate::error::{PhaserError, Result};
use crate::git::{GitBackend, LiveWorktrees};
use crate::phase::PhaseId;
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CLAIMS_TABLE: TableSchema = TableSchema {
    heading: "## Worktree Assignments",
    columns: &["Worktree", "Branch", "Phase", "Plan", "Status", "Started", "Agent"],
};

pub const VERIFY_TABLE: TableSchema = TableSchema {
    heading: "### Verification Results",
    columns: &["Phase", "Tier", "Result", "Date", "Blockers"],
};

/// Sentinel plan value for a claim with no plan selected yet.
const NO_PLAN: &str = "none";

/// One row of the claims table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimRow {
    pub worktree: String,
    pub branch: String,
    pub phase: PhaseId,
    pub plan: String,
    pub status: String,
    pub started: String,
    pub agent: String,
}

impl ClaimRow {
    fn from_cells(cells: &[String]) -> Option<Self> {
        Some(Self {
            worktree: cells.first()?.clone(),
            branch: cells.get(1)?.clone(),
            phase: cells.get(2)?.parse().ok()?,
            plan: cells.get(3)?.clone(),
            status: cells.get(4)?.clone(),
            started: cells.get(5)?.clone(),
            agent: cells.get(6)?.clone(),
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![
            self.worktree.clone(),
            self.branch.clone(),
            self.phase.to_string(),
            self.plan.clone(),
            self.status.clone(),
            self.started.clone(),
            self.agent.clone(),
        ]
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub claimed: bool,
    pub already_claimed: bool,
    pub worktree: String,
    pub phase: PhaseId,
    pub branch: Option<String>,
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    pub released: bool,
    pub worktree: String,
    pub phase: PhaseId,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdatePlanOutcome {
    pub updated: bool,
    pub worktree: String,
    pub phase: PhaseId,
    pub plan: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanOutcome {
    pub cleaned: usize,
    pub released: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub recorded: bool,
    pub phase: PhaseId,
    pub tier: String,
    pub result: String,
    pub date: String,
    pub blockers: String,
}

/// Claim operations bound to one caller working copy.
#[derive(Debug)]
pub struct ClaimRegistry<'a> {
    worktree_root: PathBuf,
    backend: &'a GitBackend,
    config: &'a Config,
}

impl<'a> ClaimRegistry<'a> {
    /// Bind to the working copy containing `cwd`; its canonical root is the
    /// caller's claim identity.
    pub fn new(cwd: &Path, backend: &'a GitBackend, config: &'a Config) -> Self {
        Self {
            worktree_root: backend.repo_root(cwd),
            backend,
            config,
        }
    }

    fn identity(&self) -> String {
        self.worktree_root.to_string_lossy().to_string()
    }

    fn load_rows(&self) -> Result<(StateDoc, Vec<ClaimRow>)> {
        let mut doc = StateDoc::load(&self.worktree_root)?;
        doc.content = CLAIMS_TABLE.ensure(&doc.content);
        let rows = CLAIMS_TABLE
            .parse(&doc.content)
            .iter()
            .filter_map(|cells| ClaimRow::from_cells(cells))
            .collect();
        Ok((doc, rows))
    }

    fn store_rows(&self, doc: &mut StateDoc, rows: &[ClaimRow]) -> Result<()> {
        let cells: Vec<Vec<String>> = rows.iter().map(|r| r.to_cells()).collect();
        doc.content = CLAIMS_TABLE.replace(&doc.content, &cells, None);
        doc.store()
    }

    /// Claim `phase` for this working copy.
    ///
    /// Fails with `Conflict` (table untouched) when another worktree holds
    /// the phase; re-claiming from the same worktree is idempotent.
    pub fn claim(&self, phase: PhaseId) -> Result<ClaimOutcome> {
        let (mut doc, mut rows) = self.load_rows()?;
        let identity = self.identity();

        if let Some(holder) = rows.iter().find(|r| r.phase == phase && r.worktree != identity) {
            return Err(PhaserError::Conflict(format!(
                "phase {} is being executed by {} (started {}); claim a different phase or release it first",
                phase, holder.worktree, holder.started
            )));
        }

        if rows.iter().any(|r| r.phase == phase && r.worktree == identity) {
            return Ok(ClaimOutcome {
                claimed: true,
                already_claimed: true,
                worktree: identity,
                phase,
                branch: None,
                agent: None,
            });
        }

        let branch = self.backend.current_branch(&self.worktree_root);
        let agent = self.agent_token();
        rows.push(ClaimRow {
            worktree: identity.clone(),
            branch: branch.clone(),
            phase,
            plan: NO_PLAN.to_string(),
            status: "executing".to_string(),
            started: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            agent: agent.clone(),
        });
        self.store_rows(&mut doc, &rows)?;

        if self.config.docs.commit_on_mutation {
            let message = format!("chore: claim phase {} for worktree {}", phase, basename(&identity));
            if let Err(e) = self
                .backend
                .commit_paths(&self.worktree_root, &[".planning/STATE.md"], &message)
            {
                warn!("claim checkpoint commit failed: {}", e);
            }
        }

        Ok(ClaimOutcome {
            claimed: true,
            already_claimed: false,
            worktree: identity,
            phase,
            branch: Some(branch),
            agent: Some(agent),
        })
    }

    /// Remove this worktree's claim on `phase`. Releasing an unclaimed phase
    /// is reported, never an error.
    pub fn release(&self, phase: PhaseId) -> Result<ReleaseOutcome> {
        let (mut doc, rows) = self.load_rows()?;
        let identity = self.identity();
        let before = rows.len();
        let kept: Vec<ClaimRow> = rows
            .into_iter()
            .filter(|r| !(r.worktree == identity && r.phase == phase))
            .collect();
        let released = kept.len() < before;
        self.store_rows(&mut doc, &kept)?;
        Ok(ReleaseOutcome {
            released,
            worktree: identity,
            phase,
        })
    }

    /// Set the plan field on this worktree's claim; reported no-op if absent.
    pub fn update_plan(&self, phase: PhaseId, plan: &str) -> Result<UpdatePlanOutcome> {
        let (mut doc, mut rows) = self.load_rows()?;
        let identity = self.identity();
        let mut updated = false;
        for row in rows.iter_mut() {
            if row.worktree == identity && row.phase == phase {
                row.plan = plan.to_string();
                updated = true;
                break;
            }
        }
        if updated {
            self.store_rows(&mut doc, &rows)?;
        }
        Ok(UpdatePlanOutcome {
            updated,
            worktree: identity,
            phase,
            plan: plan.to_string(),
        })
    }

    /// All claim rows, as stored.
    pub fn status(&self) -> Result<Vec<ClaimRow>> {
        if !StateDoc::exists(&self.worktree_root) {
            return Ok(Vec::new());
        }
        let (_, rows) = self.load_rows()?;
        Ok(rows)
    }

    /// Drop claims whose worktree no longer exists in the backend's live set.
    ///
    /// When the live-set query itself fails this is a no-op — claims that
    /// cannot be verified are never destroyed.
    pub fn clean(&self) -> Result<CleanOutcome> {
        if !StateDoc::exists(&self.worktree_root) {
            return Ok(CleanOutcome::default());
        }
        let (mut doc, rows) = self.load_rows()?;

        let live = match self.backend.list_live_worktrees(&self.worktree_root) {
            LiveWorktrees::Live(paths) => paths,
            LiveWorktrees::Unavailable(reason) => {
                return Ok(CleanOutcome {
                    cleaned: 0,
                    released: Vec::new(),
                    error: Some(format!("live worktree query failed: {}", reason)),
                });
            }
        };

        let mut released = Vec::new();
        let kept: Vec<ClaimRow> = rows
            .into_iter()
            .filter(|row| {
                let row_path = Path::new(&row.worktree);
                let is_live = live
                    .iter()
                    .any(|p| p == row_path || (p.file_name().is_some() && p.file_name() == row_path.file_name()));
                if !is_live {
                    info!("released stale claim for {} (worktree no longer exists)", row.worktree);
                    released.push(row.worktree.clone());
                }
                is_live
            })
            .collect();

        if !released.is_empty() {
            self.store_rows(&mut doc, &kept)?;
        }
        Ok(CleanOutcome {
            cleaned: released.len(),
            released,
            error: None,
        })
    }

    /// Opportunistic variant of `clean` invoked before higher-level
    /// workflows; swallows every internal error.
    pub fn clean_silent(&self) {
        if let Err(e) = self.clean() {
            warn!("silent claim cleanup skipped: {}", e);
        }
    }

    /// Upsert a verification result keyed by (phase, tier).
    pub fn verify_result(
        &self,
        phase: PhaseId,
        tier: &str,
        result: &str,
        blockers: Option<&str>,
    ) -> Result<VerifyOutcome> {
        let mut doc = StateDoc::load(&self.worktree_root)?;
        doc.content = CLAIMS_TABLE.ensure(&doc.content);
        doc.content = VERIFY_TABLE.ensure(&doc.content);

        let date = Utc::now().format("%Y-%m-%d").to_string();
        let blockers = blockers.unwrap_or("none").to_string();
        let mut rows = VERIFY_TABLE.parse(&doc.content);
        let new_row = vec![
            phase.to_string(),
            tier.to_string(),
            result.to_string(),
            date.clone(),
            blockers.clone(),
        ];
        match rows
            .iter_mut()
            .find(|cells| cells[0] == phase.to_string() && cells[1] == tier)
        {
            Some(existing) => *existing = new_row,
            None => rows.push(new_row),
        }
        doc.content = VERIFY_TABLE.replace(&doc.content, &rows, None);
        doc.store()?;

        Ok(VerifyOutcome {
            recorded: true,
            phase,
            tier: tier.to_string(),
            result: result.to_string(),
            date,
            blockers,
        })
    }

    fn agent_token(&self) -> String {
        if let Some(name) = &self.config.agent.name {
            return name.clone();
        }
        std::env::var("PHASER_AGENT")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
