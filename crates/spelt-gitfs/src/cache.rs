//! Read caches for pinned versions.
//!
//! Content at a pinned commit is immutable, so those reads are cached
//! for the lifetime of the handle. Symbolic `HEAD` reads are never
//! cached.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Cache key: pinned commit sha plus repo-relative path.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub(crate) struct ReadKey {
  pub sha: String,
  pub path: String,
}

impl ReadKey {
  pub fn new(sha: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      sha: sha.into(),
      path: path.into(),
    }
  }
}

#[derive(Debug)]
pub(crate) struct ReadCache<V> {
  entries: Arc<RwLock<HashMap<ReadKey, V>>>,
}

impl<V> Clone for ReadCache<V> {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
    }
  }
}

impl<V: Clone> ReadCache<V> {
  pub fn new() -> Self {
    Self {
      entries: Arc::new(RwLock::new(HashMap::new())),
    }
  }

  pub fn get(&self, key: &ReadKey) -> Option<V> {
    self.entries.read().unwrap().get(key).cloned()
  }

  pub fn insert(&self, key: ReadKey, value: V) {
    self.entries.write().unwrap().insert(key, value);
  }

  pub fn clear(&self) {
    self.entries.write().unwrap().clear();
  }
}
