//! Roadmap phase extraction.
//!
//! Pulls the raw phase declarations the scheduler needs out of the project
//! roadmap: phase headings, free-form "Depends on" strings, and on-disk
//! plan/summary artifact counts that derive completion. Everything else in
//! the roadmap is someone else's concern.

use crate::error::{PhaserError, Result};
use crate::phase::{parse_depends_on, PhaseId};
use crate::scheduler::PhaseNode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::path::Path;

static PHASE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^#{2,4}\s*Phase\s+(\d+(?:\.\d+)?)\s*:\s*(.+)$").unwrap());
static DEPENDS_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*\*Depends on(?::\*\*|\*\*:)\s*([^\n]+)").unwrap());
static INSERTED_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\(INSERTED\)").unwrap());

/// Completion state derived from a phase's artifact directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskStatus {
    NoDirectory,
    Empty,
    Planned,
    Partial,
    Complete,
}

/// One phase as declared in the roadmap.
#[derive(Debug, Clone, Serialize)]
pub struct RoadmapPhase {
    pub id: PhaseId,
    pub name: String,
    pub depends_on_raw: Option<String>,
    pub declared_deps: Vec<PhaseId>,
    pub plan_count: usize,
    pub summary_count: usize,
    pub disk_status: DiskStatus,
}

impl RoadmapPhase {
    pub fn completed(&self) -> bool {
        self.disk_status == DiskStatus::Complete
    }

    pub fn to_node(&self) -> PhaseNode {
        PhaseNode::new(self.id, self.declared_deps.clone(), self.completed())
    }
}

/// Parse the roadmap under `root/.planning/ROADMAP.md` into phase records.
pub fn load_phases(root: &Path) -> Result<Vec<RoadmapPhase>> {
    let roadmap_path = root.join(".planning").join("ROADMAP.md");
    if !roadmap_path.exists() {
        return Err(PhaserError::NotFound(format!("roadmap {}", roadmap_path.display())));
    }
    let content = std::fs::read_to_string(&roadmap_path)?;
    let phases_dir = root.join(".planning").join("phases");
    Ok(parse_roadmap(&content, &phases_dir))
}

fn parse_roadmap(content: &str, phases_dir: &Path) -> Vec<RoadmapPhase> {
    let headings: Vec<(usize, PhaseId, String)> = PHASE_HEADING
        .captures_iter(content)
        .filter_map(|caps| {
            let start = caps.get(0)?.start();
            let id: PhaseId = caps[1].parse().ok()?;
            let name = INSERTED_MARK.replace_all(&caps[2], "").trim().to_string();
            Some((start, id, name))
        })
        .collect();

    headings
        .iter()
        .enumerate()
        .map(|(i, (start, id, name))| {
            let end = headings.get(i + 1).map(|(s, _, _)| *s).unwrap_or(content.len());
            let section = &content[*start..end];
            let depends_on_raw = DEPENDS_LINE
                .captures(section)
                .map(|caps| caps[1].trim().to_string());
            let declared_deps = parse_depends_on(depends_on_raw.as_deref());
            let (plan_count, summary_count, disk_status) = probe_disk(phases_dir, *id);
            RoadmapPhase {
                id: *id,
                name: name.clone(),
                depends_on_raw,
                declared_deps,
                plan_count,
                summary_count,
                disk_status,
            }
        })
        .collect()
}

/// Count plan/summary artifacts for a phase directory (`NN[-slug]`).
///
/// A phase is complete when it has at least one plan and at least as many
/// summaries as plans.
fn probe_disk(phases_dir: &Path, id: PhaseId) -> (usize, usize, DiskStatus) {
    let normalized = id.normalized();
    let dir = std::fs::read_dir(phases_dir).ok().and_then(|entries| {
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .find(|e| {
                let file_name = e.file_name();
                let name = file_name.to_string_lossy();
                name == normalized || name.starts_with(&format!("{}-", normalized))
            })
    });

    let Some(dir) = dir else {
        return (0, 0, DiskStatus::NoDirectory);
    };

    let mut plan_count = 0;
    let mut summary_count = 0;
    if let Ok(entries) = std::fs::read_dir(dir.path()) {
        for entry in entries.filter_map(|e| e.ok()) {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.ends_with("-PLAN.md") || name == "PLAN.md" {
                plan_count += 1;
            } else if name.ends_with("-SUMMARY.md") || name == "SUMMARY.md" {
                summary_count += 1;
            }
        }
    }

    let status = if plan_count > 0 && summary_count >= plan_count {
        DiskStatus::Complete
    } else if summary_count > 0 {
        DiskStatus::Partial
    } else if plan_count > 0 {
        DiskStatus::Planned
    } else {
        DiskStatus::Empty
    };
    (plan_count, summary_count, status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(s: &str) -> PhaseId {
        s.parse().unwrap()
    }

    const ROADMAP: &str = "\
# Roadmap

## Phase 7: Auth layer

**Goal:** Sessions and tokens
**Depends on:** Nothing

## Phase 8: Schema (INSERTED)

**Depends on:** None

### Phase 9: API surface

**Depends on:** Phase 7, Phase 8
";

    #[test]
    fn test_parse_headings_and_deps() {
        let temp = TempDir::new().unwrap();
        let phases = parse_roadmap(ROADMAP, &temp.path().join("phases"));
        assert_eq!(phases.len(), 3);

        assert_eq!(phases[0].id, id("7"));
        assert_eq!(phases[0].name, "Auth layer");
        assert!(phases[0].declared_deps.is_empty());

        // "(INSERTED)" marker stripped from the name
        assert_eq!(phases[1].name, "Schema");

        assert_eq!(phases[2].id, id("9"));
        assert_eq!(phases[2].declared_deps, vec![id("7"), id("8")]);
        assert_eq!(phases[2].depends_on_raw.as_deref(), Some("Phase 7, Phase 8"));
    }

    #[test]
    fn test_no_phases_dir_means_no_directory() {
        let temp = TempDir::new().unwrap();
        let phases = parse_roadmap(ROADMAP, &temp.path().join("phases"));
        assert!(phases.iter().all(|p| p.disk_status == DiskStatus::NoDirectory));
        assert!(phases.iter().all(|p| !p.completed()));
    }

    #[test]
    fn test_disk_status_progression() {
        let temp = TempDir::new().unwrap();
        let phases_dir = temp.path().join("phases");

        let seven = phases_dir.join("07-auth-layer");
        std::fs::create_dir_all(&seven).unwrap();
        std::fs::write(seven.join("07-01-PLAN.md"), "plan").unwrap();
        std::fs::write(seven.join("07-02-PLAN.md"), "plan").unwrap();
        std::fs::write(seven.join("07-01-SUMMARY.md"), "done").unwrap();

        let eight = phases_dir.join("08-schema");
        std::fs::create_dir_all(&eight).unwrap();
        std::fs::write(eight.join("08-01-PLAN.md"), "plan").unwrap();
        std::fs::write(eight.join("08-01-SUMMARY.md"), "done").unwrap();

        let phases = parse_roadmap(ROADMAP, &phases_dir);
        assert_eq!(phases[0].disk_status, DiskStatus::Partial);
        assert_eq!(phases[0].plan_count, 2);
        assert_eq!(phases[0].summary_count, 1);

        assert_eq!(phases[1].disk_status, DiskStatus::Complete);
        assert!(phases[1].completed());

        assert_eq!(phases[2].disk_status, DiskStatus::NoDirectory);
    }

    #[test]
    fn test_decimal_phase_directory_match() {
        let temp = TempDir::new().unwrap();
        let phases_dir = temp.path().join("phases");
        let dir = phases_dir.join("06.2-hotfix");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("PLAN.md"), "plan").unwrap();

        let roadmap = "## Phase 6.2: Hotfix\n\n**Depends on:** Phase 6\n";
        let phases = parse_roadmap(roadmap, &phases_dir);
        assert_eq!(phases[0].disk_status, DiskStatus::Planned);
    }

    #[test]
    fn test_load_phases_missing_roadmap() {
        let temp = TempDir::new().unwrap();
        let err = load_phases(temp.path()).unwrap_err();
        assert!(matches!(err, PhaserError::NotFound(_)));
    }

    #[test]
    fn test_to_node_carries_completion() {
        let temp = TempDir::new().unwrap();
        let phases = parse_roadmap(ROADMAP, &temp.path().join("phases"));
        let node = phases[2].to_node();
        assert_eq!(node.id, id("9"));
        assert_eq!(node.declared_deps, vec![id("7"), id("8")]);
        assert!(!node.completed);
    }
}
