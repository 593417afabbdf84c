//! Domain error taxonomy.
//!
//! Infrastructure code (runtime, http, archive) reports failures through
//! `anyhow`. The search, resolve, install and uninstall layers convert those
//! into [`ResourceError`] so callers can tell recoverable per-repository
//! failures from fatal ones.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    /// The repository store is unreadable, malformed or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid version constraint '{input}': {reason}")]
    InvalidVersionConstraint { input: String, reason: String },

    /// A repository could not be queried. Recovered per repository.
    #[error("repository '{repository}' is unavailable: {reason}")]
    FeedUnavailable { repository: String, reason: String },

    #[error("package '{name}' could not be found in any repository")]
    PackageNotFound { name: String },

    #[error("dependency '{dependency}' ({constraint}) of '{parent}' could not be resolved: {reason}")]
    DependencyUnresolved {
        parent: String,
        dependency: String,
        constraint: String,
        reason: String,
    },

    /// Uninstall refused because other installed packages depend on the target.
    #[error("cannot uninstall '{target}': required by {}", .blockers.join(", "))]
    DependencyConflict {
        target: String,
        blockers: Vec<String>,
    },

    #[error("file system error at {path:?}: {reason}")]
    FileSystem { path: PathBuf, reason: String },

    #[error("operation cancelled")]
    Cancelled,
}

impl ResourceError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn invalid_constraint(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersionConstraint {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn feed_unavailable(repository: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::FeedUnavailable {
            repository: repository.into(),
            reason: format!("{:#}", error),
        }
    }

    pub fn file_system(path: impl Into<PathBuf>, error: &anyhow::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            reason: format!("{:#}", error),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Domain result alias.
pub type ResourceResult<T> = std::result::Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_conflict_lists_blockers() {
        let err = ResourceError::DependencyConflict {
            target: "PackageManagement".to_string(),
            blockers: vec!["PowerShellGet 2.2.5".to_string(), "Az 9.0.0".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("PackageManagement"));
        assert!(msg.contains("PowerShellGet 2.2.5, Az 9.0.0"));
    }

    #[test]
    fn test_feed_unavailable_keeps_error_chain() {
        let inner = anyhow::anyhow!("connection refused").context("Failed to send request");
        let err = ResourceError::feed_unavailable("Gallery", &inner);
        let msg = err.to_string();
        assert!(msg.contains("Gallery"));
        assert!(msg.contains("Failed to send request: connection refused"));
    }

    #[test]
    fn test_cancelled() {
        assert!(ResourceError::Cancelled.is_cancelled());
        assert!(!ResourceError::configuration("x").is_cancelled());
    }
}
