use std::fmt;

/// A version selector for reads from the store.
///
/// `Head` is symbolic and may resolve to different content across
/// calls; `Commit` pins an immutable tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Version {
  Head,
  Commit(String),
}

impl Version {
  pub fn commit(sha: impl Into<String>) -> Self {
    Version::Commit(sha.into())
  }

  /// Whether reads at this version are stable across calls.
  pub fn is_pinned(&self) -> bool {
    matches!(self, Version::Commit(_))
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Version::Head => write!(f, "HEAD"),
      Version::Commit(sha) => write!(f, "{sha}"),
    }
  }
}
