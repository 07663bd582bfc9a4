//! Loader errors.

use spelt_gitfs::GitFsError;
use spelt_singleflight::LeaderVanished;
use thiserror::Error;

/// Errors from content loading. Clonable so one settled outcome can
/// be relayed to every deduplicated waiter.
#[derive(Debug, Clone, Error)]
pub enum DataError {
  #[error(transparent)]
  Git(#[from] GitFsError),

  #[error(transparent)]
  Flight(#[from] LeaderVanished),

  /// The resource exists but its content has the wrong shape.
  #[error("malformed resource '{name}': {message}")]
  Malformed { name: String, message: String },
}

impl DataError {
  /// Whether the failure means the resource does not exist at the
  /// version.
  pub fn is_not_found(&self) -> bool {
    matches!(self, DataError::Git(e) if e.is_not_found())
  }
}
