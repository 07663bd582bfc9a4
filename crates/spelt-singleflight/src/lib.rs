//! Single-flight deduplication.
//!
//! A [`SingleFlight`] collapses concurrent calls for the same key into
//! one underlying execution. The first caller for a key becomes the
//! leader and runs the operation; callers arriving while it is in
//! flight only register a waiter and receive a clone of the leader's
//! outcome, success or failure alike. The in-flight entry is removed
//! the moment the operation settles, so a call arriving afterwards
//! starts fresh work rather than reading a stale result.
//!
//! Keys are supplied by the caller and must cover every discriminating
//! argument of the operation: the same path at two different versions
//! is two resources and must use two keys.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::debug;

/// Surfaced to waiters when the leading call was dropped before its
/// operation settled. Converted into the caller's error type via
/// `From`.
#[derive(Debug, Clone, thiserror::Error)]
#[error("single-flight leader for key {key} went away before settling")]
pub struct LeaderVanished {
  pub key: String,
}

type WaiterList<T, E> = Vec<oneshot::Sender<Result<T, E>>>;
type InflightTable<K, T, E> = Mutex<HashMap<K, WaiterList<T, E>>>;

/// The in-flight table. Cloning the handle shares the table; one
/// handle per logical resource family is created by whoever owns the
/// process lifecycle.
pub struct SingleFlight<K, T, E> {
  inflight: Arc<InflightTable<K, T, E>>,
}

impl<K, T, E> Clone for SingleFlight<K, T, E> {
  fn clone(&self) -> Self {
    Self {
      inflight: Arc::clone(&self.inflight),
    }
  }
}

impl<K, T, E> Default for SingleFlight<K, T, E>
where
  K: Eq + Hash + Clone + Debug,
  T: Clone,
  E: Clone + From<LeaderVanished>,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<K, T, E> SingleFlight<K, T, E>
where
  K: Eq + Hash + Clone + Debug,
  T: Clone,
  E: Clone + From<LeaderVanished>,
{
  pub fn new() -> Self {
    Self {
      inflight: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  /// Number of keys currently in flight.
  pub fn in_flight(&self) -> usize {
    self.inflight.lock().unwrap().len()
  }

  /// Run `operation` under `key`, or join an execution already in
  /// flight for it.
  ///
  /// Exactly one of the concurrent callers for a key polls its
  /// operation; the others' operations are dropped unpolled and every
  /// caller receives the same outcome. Waiters are notified in
  /// registration order, after the entry has been vacated.
  pub async fn run<F>(&self, key: K, operation: F) -> Result<T, E>
  where
    F: Future<Output = Result<T, E>>,
  {
    let receiver = {
      let mut inflight = self.inflight.lock().unwrap();
      match inflight.entry(key.clone()) {
        Entry::Occupied(mut entry) => {
          let (sender, receiver) = oneshot::channel();
          entry.get_mut().push(sender);
          Some(receiver)
        }
        Entry::Vacant(entry) => {
          entry.insert(Vec::new());
          None
        }
      }
    };

    if let Some(receiver) = receiver {
      debug!(key = ?key, "joined in-flight operation");
      drop(operation);
      return match receiver.await {
        Ok(outcome) => outcome,
        Err(_) => Err(
          LeaderVanished {
            key: format!("{key:?}"),
          }
          .into(),
        ),
      };
    }

    debug!(key = ?key, "leading new operation");
    let guard = EntryGuard {
      inflight: &self.inflight,
      key: &key,
      done: false,
    };
    let outcome = operation.await;

    // Vacate the entry before anyone hears about the outcome, so a
    // caller racing in after settlement starts fresh work.
    let waiters = guard.complete();
    for sender in waiters {
      let _ = sender.send(outcome.clone());
    }
    outcome
  }
}

/// Removes the in-flight entry on every exit path. If the leader is
/// dropped mid-flight the waiters' channels break and they observe
/// [`LeaderVanished`] instead of hanging on a leaked entry.
struct EntryGuard<'a, K: Eq + Hash, T, E> {
  inflight: &'a InflightTable<K, T, E>,
  key: &'a K,
  done: bool,
}

impl<K: Eq + Hash, T, E> EntryGuard<'_, K, T, E> {
  fn complete(mut self) -> WaiterList<T, E> {
    self.done = true;
    self
      .inflight
      .lock()
      .unwrap()
      .remove(self.key)
      .unwrap_or_default()
  }
}

impl<K: Eq + Hash, T, E> Drop for EntryGuard<'_, K, T, E> {
  fn drop(&mut self) {
    if !self.done {
      let _ = self.inflight.lock().unwrap().remove(self.key);
    }
  }
}
