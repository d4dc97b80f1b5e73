//! Pipe-table codec for the shared state document.
//!
//! Each table is a structured section with a fixed heading and ordered
//! column set. Parse and serialize are a round-trip law: parsing a rendered
//! table yields the same rows back, cell for cell.

/// Schema of one pipe table: its section heading and ordered columns.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    /// Full heading line, e.g. "## Worktree Assignments".
    pub heading: &'static str,
    pub columns: &'static [&'static str],
}

impl TableSchema {
    /// Heading + header row + separator row.
    fn header_block(&self) -> String {
        let header: Vec<String> = self.columns.iter().map(|c| format!(" {} ", c)).collect();
        let separator: Vec<String> = self.columns.iter().map(|c| "-".repeat(c.len() + 2)).collect();
        format!("{}\n\n|{}|\n|{}|", self.heading, header.join("|"), separator.join("|"))
    }

    /// Byte range of this section: heading line through the char before the
    /// next `##`/`###` heading (or end of document).
    fn section_range(&self, content: &str) -> Option<(usize, usize)> {
        let mut offset = 0;
        let mut start = None;
        for line in content.split_inclusive('\n') {
            let trimmed = line.trim_end();
            if start.is_none() {
                if trimmed == self.heading {
                    start = Some(offset);
                }
            } else if trimmed.starts_with("## ") || trimmed.starts_with("### ") {
                return Some((start.unwrap_or(0), offset));
            }
            offset += line.len();
        }
        start.map(|s| (s, content.len()))
    }

    pub fn exists(&self, content: &str) -> bool {
        self.section_range(content).is_some()
    }

    /// Parse the section's data rows (header and separator excluded).
    ///
    /// Cells are trimmed; a row with fewer cells than the schema has columns
    /// is skipped as malformed.
    pub fn parse(&self, content: &str) -> Vec<Vec<String>> {
        let Some((start, end)) = self.section_range(content) else {
            return Vec::new();
        };
        let mut rows = Vec::new();
        let mut pipe_lines_seen = 0;
        for line in content[start..end].lines() {
            let line = line.trim();
            if !line.starts_with('|') {
                continue;
            }
            pipe_lines_seen += 1;
            // first pipe line is the header, second the separator
            if pipe_lines_seen <= 2 {
                continue;
            }
            let cells: Vec<String> = line
                .split('|')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if cells.len() >= self.columns.len() {
                rows.push(cells);
            }
        }
        rows
    }

    /// Render the full section: heading, header, rows, optional trailer line.
    pub fn render(&self, rows: &[Vec<String>], trailer: Option<&str>) -> String {
        let mut section = self.header_block();
        for row in rows {
            let cells: Vec<String> = row.iter().map(|c| format!(" {} ", c)).collect();
            section.push_str(&format!("\n|{}|", cells.join("|")));
        }
        if let Some(trailer) = trailer {
            section.push_str("\n\n");
            section.push_str(trailer);
        }
        section.push('\n');
        section
    }

    /// Replace this section's content (or append the section) and return the
    /// updated document.
    pub fn replace(&self, content: &str, rows: &[Vec<String>], trailer: Option<&str>) -> String {
        let section = self.render(rows, trailer);
        match self.section_range(content) {
            Some((start, end)) => {
                let mut updated = String::with_capacity(content.len() + section.len());
                updated.push_str(&content[..start]);
                updated.push_str(&section);
                let rest = &content[end..];
                if rest.starts_with('#') {
                    updated.push('\n');
                }
                updated.push_str(rest);
                updated
            }
            None => {
                let mut updated = content.trim_end().to_string();
                if !updated.is_empty() {
                    updated.push_str("\n\n");
                }
                updated.push_str(&section);
                updated
            }
        }
    }

    /// Append an empty table when the section is missing.
    pub fn ensure(&self, content: &str) -> String {
        if self.exists(content) {
            content.to_string()
        } else {
            self.replace(content, &[], None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLAIMS: TableSchema = TableSchema {
        heading: "## Worktree Assignments",
        columns: &["Worktree", "Branch", "Phase", "Plan", "Status", "Started", "Agent"],
    };

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_render_parse_roundtrip() {
        let rows = vec![
            row(&["/tmp/a", "phase-07", "7", "none", "executing", "2026-01-01T00:00:00Z", "agent-1"]),
            row(&["/tmp/b", "phase-08", "8", "08-01", "executing", "2026-01-02T00:00:00Z", "agent-2"]),
        ];
        let doc = CLAIMS.render(&rows, None);
        assert_eq!(CLAIMS.parse(&doc), rows);
    }

    #[test]
    fn test_parse_skips_header_and_separator() {
        let doc = CLAIMS.render(&[], None);
        assert!(CLAIMS.parse(&doc).is_empty());
    }

    #[test]
    fn test_parse_missing_section() {
        assert!(CLAIMS.parse("# Document\n\nNo tables here.\n").is_empty());
    }

    #[test]
    fn test_section_bounded_by_next_heading() {
        let rows = vec![row(&["/tmp/a", "b", "7", "none", "executing", "t", "a"])];
        let mut doc = CLAIMS.render(&rows, None);
        doc.push_str("\n## Session Continuity\n\n| Worktree |\n|----------|\n| bogus |\n");
        assert_eq!(CLAIMS.parse(&doc).len(), 1);
    }

    #[test]
    fn test_replace_preserves_other_sections() {
        let mut doc = String::from("# State\n\n");
        doc.push_str(&CLAIMS.render(&[row(&["/tmp/a", "b", "7", "none", "executing", "t", "a"])], None));
        doc.push_str("\n## Session Continuity\n\ntext\n");

        let updated = CLAIMS.replace(&doc, &[], None);
        assert!(updated.contains("# State"));
        assert!(updated.contains("## Session Continuity"));
        assert!(updated.contains("text"));
        assert!(CLAIMS.parse(&updated).is_empty());
    }

    #[test]
    fn test_ensure_appends_once() {
        let doc = CLAIMS.ensure("# State\n");
        assert!(CLAIMS.exists(&doc));
        let again = CLAIMS.ensure(&doc);
        assert_eq!(doc, again);
    }

    #[test]
    fn test_trailer_rendered_and_replaced() {
        const ACTIVE: TableSchema = TableSchema {
            heading: "## Active Phases",
            columns: &["Phase", "Name", "Status", "Worker", "Plans", "Last Update"],
        };
        let rows = vec![row(&["7", "Auth", "executing", "agent-1", "1/3", "t"])];
        let doc = ACTIVE.render(&rows, Some("**Next unblockable:** --"));
        assert!(doc.contains("**Next unblockable:** --"));

        let updated = ACTIVE.replace(&doc, &rows, Some("**Next unblockable:** Phase 9 (API) -- 1 dep(s) remaining"));
        assert!(!updated.contains("**Next unblockable:** --"));
        assert!(updated.contains("1 dep(s) remaining"));
    }
}
