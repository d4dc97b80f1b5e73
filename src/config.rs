//! Configuration loading for phaser.
//!
//! YAML config with per-section defaults. Resolution order: explicit
//! `--config` path, then `.phaser.yml` at the current repo root, then
//! built-in defaults.

use crate::error::{PhaserError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub git: GitConfig,
    pub docs: DocsConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Directory (relative to the repo root) where phase worktrees live.
    pub worktree_base: String,
    /// Override for the primary branch; detected (main/master) when unset.
    pub main_branch: Option<String>,
    /// Per-call timeout for backend git commands.
    pub command_timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            worktree_base: ".worktrees".to_string(),
            main_branch: None,
            command_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocsConfig {
    /// Commit the state document after a successful claim as a durable
    /// checkpoint.
    pub commit_on_mutation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Caller-identifying token recorded on claims; falls back to
    /// PHASER_AGENT, then HOSTNAME, then "unknown".
    pub name: Option<String>,
}

impl Config {
    /// Load configuration from an explicit path, or `.phaser.yml` under
    /// `search_root` when present, or defaults.
    pub fn load(explicit: Option<&Path>, search_root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(PhaserError::Config(format!("config file not found: {}", path.display())));
            }
            return Self::from_file(path);
        }
        let default_path = search_root.join(".phaser.yml");
        if default_path.exists() {
            return Self::from_file(&default_path);
        }
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        Ok(config)
    }
}
