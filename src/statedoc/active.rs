//! Active-phases state view.
//!
//! A derived table inside the shared state document that downstream tooling
//! reads. Every mutation recomputes the trailing next-unblockable hint from
//! the rows' status strings using the scheduler's fewest-remaining logic.

use super::table::TableSchema;
use super::{state_doc_path, StateDoc};
use crate::error::{PhaserError, Result};
use crate::phase::PhaseId;
use crate::scheduler::{next_unblockable, BlockedPhase};
use chrono::{SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const ACTIVE_TABLE: TableSchema = TableSchema {
    heading: "## Active Phases",
    columns: &["Phase", "Name", "Status", "Worker", "Plans", "Last Update"],
};

static BLOCKED_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^blocked\s*\(([^)]+)\)").unwrap());

/// One row of the active-phases table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePhaseRow {
    pub phase: PhaseId,
    pub name: String,
    pub status: String,
    pub worker: String,
    pub plans: String,
    pub last_update: String,
}

impl ActivePhaseRow {
    fn from_cells(cells: &[String]) -> Option<Self> {
        Some(Self {
            phase: cells.first()?.parse().ok()?,
            name: cells.get(1)?.clone(),
            status: cells.get(2)?.clone(),
            worker: cells.get(3)?.clone(),
            plans: cells.get(4)?.clone(),
            last_update: cells.get(5)?.clone(),
        })
    }

    fn to_cells(&self) -> Vec<String> {
        vec![
            self.phase.to_string(),
            self.name.clone(),
            self.status.clone(),
            self.worker.clone(),
            self.plans.clone(),
            self.last_update.clone(),
        ]
    }

    /// Waiting-on list parsed back out of a "blocked (7,8)" status.
    fn waiting_on(&self) -> Option<Vec<PhaseId>> {
        let caps = BLOCKED_STATUS.captures(&self.status)?;
        Some(
            caps[1]
                .split(',')
                .filter_map(|d| d.trim().parse().ok())
                .collect(),
        )
    }
}

/// Fields supplied to `upsert`; unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct PhaseRowUpdate {
    pub name: Option<String>,
    pub status: Option<String>,
    pub worker: Option<String>,
    pub plans: Option<String>,
    pub last_update: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    pub updated: bool,
    pub phase: PhaseId,
    pub fields_changed: Vec<String>,
    pub next_unblockable: String,
}

/// Read/upsert access to the active-phases table of one working copy.
#[derive(Debug)]
pub struct ActivePhasesView {
    worktree_root: PathBuf,
}

impl ActivePhasesView {
    pub fn new(worktree_root: impl Into<PathBuf>) -> Self {
        Self {
            worktree_root: worktree_root.into(),
        }
    }

    /// Parse the table into ordered rows; missing document or section reads
    /// as empty.
    pub fn read(&self) -> Result<Vec<ActivePhaseRow>> {
        if !state_doc_path(&self.worktree_root).exists() {
            return Ok(Vec::new());
        }
        let doc = StateDoc::load(&self.worktree_root)?;
        Ok(parse_rows(&doc.content))
    }

    /// Update the row for `phase`, touching only the supplied fields and
    /// always refreshing `last_update` (an explicit value wins). Inserting a
    /// new row requires at least `name` and `status`; rows re-sort by phase
    /// id afterwards. The next-unblockable hint is recomputed on every
    /// mutation.
    pub fn upsert(&self, phase: PhaseId, update: PhaseRowUpdate) -> Result<UpsertOutcome> {
        let mut doc = StateDoc::load(&self.worktree_root)?;
        doc.content = ACTIVE_TABLE.ensure(&doc.content);
        let mut rows = parse_rows(&doc.content);

        let timestamp = update
            .last_update
            .clone()
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        let mut fields_changed = Vec::new();

        match rows.iter_mut().find(|r| r.phase == phase) {
            Some(row) => {
                if let Some(name) = update.name {
                    row.name = name;
                    fields_changed.push("name".to_string());
                }
                if let Some(status) = update.status {
                    row.status = status;
                    fields_changed.push("status".to_string());
                }
                if let Some(worker) = update.worker {
                    row.worker = worker;
                    fields_changed.push("worker".to_string());
                }
                if let Some(plans) = update.plans {
                    row.plans = plans;
                    fields_changed.push("plans".to_string());
                }
                row.last_update = timestamp;
                fields_changed.push("last_update".to_string());
            }
            None => {
                let (Some(name), Some(status)) = (update.name, update.status) else {
                    return Err(PhaserError::NotFound(format!(
                        "phase {} not in active-phases table; provide name and status to insert a new row",
                        phase
                    )));
                };
                rows.push(ActivePhaseRow {
                    phase,
                    name,
                    status,
                    worker: update.worker.unwrap_or_else(|| "--".to_string()),
                    plans: update.plans.unwrap_or_else(|| "0/0".to_string()),
                    last_update: timestamp,
                });
                rows.sort_by_key(|r| r.phase);
                for field in ["name", "status", "worker", "plans", "last_update"] {
                    fields_changed.push(field.to_string());
                }
            }
        }

        let hint = next_unblockable_hint(&rows);
        let cells: Vec<Vec<String>> = rows.iter().map(|r| r.to_cells()).collect();
        let trailer = format!("**Next unblockable:** {}", hint);
        doc.content = ACTIVE_TABLE.replace(&doc.content, &cells, Some(&trailer));
        doc.store()?;

        Ok(UpsertOutcome {
            updated: true,
            phase,
            fields_changed,
            next_unblockable: hint,
        })
    }

    pub fn worktree_root(&self) -> &Path {
        &self.worktree_root
    }
}

fn parse_rows(content: &str) -> Vec<ActivePhaseRow> {
    ACTIVE_TABLE
        .parse(content)
        .iter()
        .filter_map(|cells| ActivePhaseRow::from_cells(cells))
        .collect()
}

/// Recompute the next-unblockable hint from the table's status strings.
///
/// Rows whose status is "complete" satisfy dependencies; rows with a
/// "blocked (a,b)" status contribute their waiting-on lists. Ties on the
/// remaining count break to the lowest phase id.
pub fn next_unblockable_hint(rows: &[ActivePhaseRow]) -> String {
    let completed: Vec<PhaseId> = rows
        .iter()
        .filter(|r| r.status.eq_ignore_ascii_case("complete"))
        .map(|r| r.phase)
        .collect();
    let blocked: Vec<BlockedPhase> = rows
        .iter()
        .filter_map(|r| {
            r.waiting_on().map(|waiting_on| BlockedPhase {
                phase: r.phase,
                waiting_on,
            })
        })
        .collect();

    match next_unblockable(&blocked, &completed) {
        Some(next) => {
            let name = rows
                .iter()
                .find(|r| r.phase == next.phase)
                .map(|r| r.name.as_str())
                .unwrap_or("?");
            if next.remaining == 0 {
                format!("Phase {} ({}) -- ready to unblock", next.phase, name)
            } else {
                format!("Phase {} ({}) -- {} dep(s) remaining", next.phase, name, next.remaining)
            }
        }
        None => "--".to_string(),
    }
}
