//! Content source errors.

use thiserror::Error;

/// Errors from the git-backed store.
///
/// Variants carry message strings rather than error sources so one
/// settled failure can be cloned out to every deduplicated waiter.
#[derive(Debug, Clone, Error)]
pub enum GitFsError {
  /// The configured repository path does not exist.
  #[error("bad repo path: {path}")]
  BadRepo { path: String },

  /// The path does not exist at the requested version.
  #[error("'{path}' does not exist at version {version}")]
  NotFound { version: String, path: String },

  /// The path exists at the version but is not a directory.
  #[error("'{path}' at version {version} is not a directory")]
  NotDirectory { version: String, path: String },

  /// git exited nonzero for a reason other than a missing path.
  #[error("git {command} failed: {stderr}")]
  Git { command: String, stderr: String },

  /// The git subprocess could not be spawned at all.
  #[error("failed to run git: {message}")]
  Spawn { message: String },

  /// A raw working-tree read failed.
  #[error("failed to read '{path}' from the working tree: {message}")]
  WorkTree { path: String, message: String },
}

impl GitFsError {
  /// Whether this failure means the path simply isn't there at the
  /// version. Callers use this to fall back to alternate paths; every
  /// other variant is a real fault.
  pub fn is_not_found(&self) -> bool {
    matches!(self, GitFsError::NotFound { .. })
  }
}
