//! Error types for phaser
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in phaser
#[derive(Debug, Error)]
pub enum PhaserError {
    /// Phase already claimed by another worktree, or a merge hit conflicts
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Referenced phase, plan, or document is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Version-control backend call failed or timed out
    #[error("Backend unavailable: {0}")]
    Backend(String),

    /// Shared state document could not be parsed or written
    #[error("Document error: {0}")]
    Document(String),

    /// Worktree manifest could not be read or written
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for phaser operations
pub type Result<T> = std::result::Result<T, PhaserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_error() {
        let err = PhaserError::Conflict("phase 7 claimed by /tmp/wt".to_string());
        assert_eq!(err.to_string(), "Conflict: phase 7 claimed by /tmp/wt");
    }

    #[test]
    fn test_not_found_error() {
        let err = PhaserError::NotFound("STATE.md".to_string());
        assert_eq!(err.to_string(), "Not found: STATE.md");
    }

    #[test]
    fn test_backend_error() {
        let err = PhaserError::Backend("git timed out after 10s".to_string());
        assert_eq!(err.to_string(), "Backend unavailable: git timed out after 10s");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PhaserError = io_err.into();
        assert!(matches!(err, PhaserError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: PhaserError = json_err.into();
        assert!(matches!(err, PhaserError::Json(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(PhaserError::NotFound("x".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
