//! Version-control backend collaborator.
//!
//! Every call is a blocking `git` subprocess with a fixed second-scale
//! timeout. A timed-out or failed-to-spawn call surfaces as
//! `PhaserError::Backend` ("unavailable") and is never retried. Best-effort
//! queries used by self-healing paths return explicit three-way outcomes
//! instead of swallowed errors.

use crate::error::{PhaserError, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Exit status plus captured output of one backend call.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Result of the live-worktree query used for staleness cleanup.
///
/// `Unavailable` means the query itself failed; callers must treat the live
/// set as unknown and skip destructive cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveWorktrees {
    Live(Vec<PathBuf>),
    Unavailable(String),
}

/// Outcome of a best-effort stash restore on worktree reuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StashPopOutcome {
    Restored,
    NothingToRestore,
    Failed(String),
}

/// Blocking git backend with a per-call timeout.
#[derive(Debug, Clone)]
pub struct GitBackend {
    timeout: Duration,
}

impl GitBackend {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Run one git command, killing it if the deadline passes.
    fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        let mut child = Command::new("git")
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PhaserError::Backend(format!("failed to spawn git {}: {}", args.join(" "), e)))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(PhaserError::Backend(format!(
                            "git {} timed out after {}s",
                            args.join(" "),
                            self.timeout.as_secs()
                        )));
                    }
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(e) => {
                    return Err(PhaserError::Backend(format!("git {} failed: {}", args.join(" "), e)));
                }
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| PhaserError::Backend(format!("git {} failed: {}", args.join(" "), e)))?;
        Ok(GitOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Canonical root of the working copy containing `cwd`.
    ///
    /// This is the worktree identity used by the claim registry. Falls back
    /// to `cwd` itself when git is unavailable.
    pub fn repo_root(&self, cwd: &Path) -> PathBuf {
        match self.run(cwd, &["rev-parse", "--show-toplevel"]) {
            Ok(out) if out.success && !out.stdout.is_empty() => PathBuf::from(out.stdout),
            _ => cwd.to_path_buf(),
        }
    }

    pub fn current_branch(&self, cwd: &Path) -> String {
        match self.run(cwd, &["branch", "--show-current"]) {
            Ok(out) if out.success && !out.stdout.is_empty() => out.stdout,
            _ => "unknown".to_string(),
        }
    }

    /// Detected primary branch: prefer "main", fall back to "master".
    pub fn default_branch(&self, root: &Path) -> String {
        if let Ok(out) = self.run(root, &["branch", "--list", "main", "master"]) {
            let branches: Vec<&str> = out
                .stdout
                .lines()
                .map(|l| l.trim().trim_start_matches("* ").trim())
                .collect();
            if branches.contains(&"main") {
                return "main".to_string();
            }
            if branches.contains(&"master") {
                return "master".to_string();
            }
        }
        "main".to_string()
    }

    pub fn create_worktree(&self, root: &Path, path: &Path, branch: &str, base: &str) -> Result<()> {
        let path_str = path.to_string_lossy();
        let out = self.run(root, &["worktree", "add", &path_str, "-b", branch, base])?;
        if !out.success {
            return Err(PhaserError::Backend(format!(
                "failed to create worktree {}: {}",
                path_str, out.stderr
            )));
        }
        Ok(())
    }

    /// Non-fast-forward merge of `branch` into the checked-out branch at `root`.
    ///
    /// Returns the raw output; the caller decides whether a failure is a
    /// conflict (inspect `conflicted_paths`) or a hard error.
    pub fn merge_no_ff(&self, root: &Path, branch: &str, message: &str) -> Result<GitOutput> {
        self.run(root, &["merge", branch, "--no-ff", "-m", message])
    }

    /// Paths left unmerged by a conflicting merge.
    pub fn conflicted_paths(&self, root: &Path) -> Result<Vec<String>> {
        let out = self.run(root, &["diff", "--name-only", "--diff-filter=U"])?;
        Ok(out.stdout.lines().map(|l| l.to_string()).filter(|l| !l.is_empty()).collect())
    }

    pub fn stash_push(&self, worktree: &Path, label: &str) -> Result<GitOutput> {
        self.run(worktree, &["stash", "push", "-m", label])
    }

    /// Best-effort stash restore used when a worktree is reused.
    pub fn stash_pop(&self, worktree: &Path) -> StashPopOutcome {
        match self.run(worktree, &["stash", "pop"]) {
            Ok(out) if out.success => StashPopOutcome::Restored,
            Ok(out) => {
                if out.stderr.contains("No stash entries") || out.stdout.contains("No stash entries") {
                    StashPopOutcome::NothingToRestore
                } else {
                    StashPopOutcome::Failed(out.stderr)
                }
            }
            Err(e) => StashPopOutcome::Failed(e.to_string()),
        }
    }

    /// Most recent stash reference in `worktree` ("stash@{0}"), if any.
    pub fn latest_stash_ref(&self, worktree: &Path) -> Option<String> {
        let out = self.run(worktree, &["stash", "list"]).ok()?;
        let first = out.stdout.lines().next()?;
        first.split(':').next().map(|r| r.trim().to_string())
    }

    /// Live worktree paths for the repository containing `root`.
    pub fn list_live_worktrees(&self, root: &Path) -> LiveWorktrees {
        match self.run(root, &["worktree", "list", "--porcelain"]) {
            Ok(out) if out.success => {
                let paths = out
                    .stdout
                    .lines()
                    .filter_map(|line| line.strip_prefix("worktree "))
                    .map(PathBuf::from)
                    .collect();
                LiveWorktrees::Live(paths)
            }
            Ok(out) => LiveWorktrees::Unavailable(out.stderr),
            Err(e) => LiveWorktrees::Unavailable(e.to_string()),
        }
    }

    /// Stage the given paths and commit. Used for the optional
    /// commit-on-mutation checkpoint; callers treat failure as best-effort.
    pub fn commit_paths(&self, cwd: &Path, paths: &[&str], message: &str) -> Result<()> {
        let mut add_args = vec!["add"];
        add_args.extend_from_slice(paths);
        let add = self.run(cwd, &add_args)?;
        if !add.success {
            return Err(PhaserError::Backend(format!("git add failed: {}", add.stderr)));
        }
        let commit = self.run(cwd, &["commit", "-m", message])?;
        if !commit.success {
            return Err(PhaserError::Backend(format!("git commit failed: {}", commit.stderr)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_repo() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let repo_path = temp.path().join("repo");
        std::fs::create_dir(&repo_path).unwrap();

        let git = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(&repo_path)
                .output()
                .unwrap()
        };

        git(&["init", "-b", "main"]);
        git(&["config", "user.email", "test@test.com"]);
        git(&["config", "user.name", "Test"]);
        std::fs::write(repo_path.join("README.md"), "# Test").unwrap();
        git(&["add", "."]);
        git(&["commit", "-m", "Initial commit"]);

        (temp, repo_path)
    }

    #[test]
    fn test_repo_root() {
        let (_temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(10);
        let root = backend.repo_root(&repo_path);
        assert_eq!(root.canonicalize().unwrap(), repo_path.canonicalize().unwrap());
    }

    #[test]
    fn test_repo_root_falls_back_to_cwd() {
        let temp = TempDir::new().unwrap();
        let backend = GitBackend::new(10);
        assert_eq!(backend.repo_root(temp.path()), temp.path());
    }

    #[test]
    fn test_current_branch() {
        let (_temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(10);
        assert_eq!(backend.current_branch(&repo_path), "main");
    }

    #[test]
    fn test_current_branch_unknown_outside_repo() {
        let temp = TempDir::new().unwrap();
        let backend = GitBackend::new(10);
        assert_eq!(backend.current_branch(temp.path()), "unknown");
    }

    #[test]
    fn test_default_branch_prefers_main() {
        let (_temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(10);
        assert_eq!(backend.default_branch(&repo_path), "main");
    }

    #[test]
    fn test_create_worktree_and_list() {
        let (temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(10);
        let wt_path = temp.path().join("wt-p07");

        backend
            .create_worktree(&repo_path, &wt_path, "phase-07", "main")
            .unwrap();
        assert!(wt_path.exists());

        match backend.list_live_worktrees(&repo_path) {
            LiveWorktrees::Live(paths) => {
                assert_eq!(paths.len(), 2); // primary + phase worktree
                assert!(paths.iter().any(|p| p.ends_with("wt-p07")));
            }
            LiveWorktrees::Unavailable(reason) => panic!("live set unavailable: {}", reason),
        }
    }

    #[test]
    fn test_list_live_worktrees_unavailable_outside_repo() {
        let temp = TempDir::new().unwrap();
        let backend = GitBackend::new(10);
        assert!(matches!(
            backend.list_live_worktrees(temp.path()),
            LiveWorktrees::Unavailable(_)
        ));
    }

    #[test]
    fn test_stash_pop_nothing_to_restore() {
        let (_temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(10);
        assert!(matches!(
            backend.stash_pop(&repo_path),
            StashPopOutcome::NothingToRestore | StashPopOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_stash_push_and_latest_ref() {
        let (_temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(10);

        std::fs::write(repo_path.join("README.md"), "# Changed").unwrap();
        let out = backend.stash_push(&repo_path, "checkpoint-phase-7").unwrap();
        assert!(out.success);

        let stash_ref = backend.latest_stash_ref(&repo_path).unwrap();
        assert!(stash_ref.starts_with("stash@{"));
    }

    #[test]
    fn test_merge_conflict_reports_paths() {
        let (_temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(10);
        let git = |args: &[&str]| {
            Command::new("git")
                .args(args)
                .current_dir(&repo_path)
                .output()
                .unwrap()
        };

        git(&["checkout", "-b", "phase-01"]);
        std::fs::write(repo_path.join("README.md"), "# Branch").unwrap();
        git(&["commit", "-am", "branch change"]);
        git(&["checkout", "main"]);
        std::fs::write(repo_path.join("README.md"), "# Main").unwrap();
        git(&["commit", "-am", "main change"]);

        let out = backend.merge_no_ff(&repo_path, "phase-01", "merge phase 1").unwrap();
        assert!(!out.success);
        let conflicts = backend.conflicted_paths(&repo_path).unwrap();
        assert_eq!(conflicts, vec!["README.md".to_string()]);
    }

    #[test]
    fn test_timeout_kills_slow_call() {
        // A zero-second timeout expires before any git call completes.
        let (_temp, repo_path) = setup_test_repo();
        let backend = GitBackend::new(0);
        let result = backend.run(&repo_path, &["status"]);
        assert!(matches!(result, Err(PhaserError::Backend(_))));
    }
}
