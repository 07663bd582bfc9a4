//! Pipeline execution.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

use tracing::{debug, error};
use uuid::Uuid;

type BoxedTicket<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// Body of a synchronous stage.
pub type SyncBody<T, E> = Box<dyn FnOnce(StageInput<T, E>) -> Result<T, E> + Send>;

/// Body of a fan-out stage.
pub type FanoutBody<T, E> =
  Box<dyn FnOnce(StageInput<T, E>, &mut FanoutScope<T, E>) -> Result<(), E> + Send>;

/// What a stage receives from the stage before it.
///
/// The failure signal and the result values are separate fields on
/// purpose: a stage that returned a value and a stage whose fan-out
/// failed must never be confused for one another.
#[derive(Debug)]
pub struct StageInput<T, E> {
  /// Failure carried over from the previous stage, if any. When set,
  /// `values` holds whichever tickets still succeeded, best-effort.
  pub failure: Option<E>,
  /// Previous stage results, in ticket registration order. A sync
  /// stage contributes exactly one value.
  pub values: Vec<T>,
}

impl<T, E> StageInput<T, E> {
  fn empty() -> Self {
    Self {
      failure: None,
      values: Vec::new(),
    }
  }

  fn from_value(value: T) -> Self {
    Self {
      failure: None,
      values: vec![value],
    }
  }

  fn from_failure(failure: E) -> Self {
    Self {
      failure: Some(failure),
      values: Vec::new(),
    }
  }

  /// Short-circuit helper for the common stage prologue: yields the
  /// values when the previous stage succeeded, otherwise forwards its
  /// failure.
  pub fn check(self) -> Result<Vec<T>, E> {
    match self.failure {
      Some(failure) => Err(failure),
      None => Ok(self.values),
    }
  }
}

/// One step of a pipeline.
///
/// Whether a stage returns synchronously or registers parallel work is
/// declared by the variant, never inferred from how the body behaves
/// at runtime.
pub enum Stage<T, E> {
  /// Runs to completion immediately; its value becomes the sole input
  /// of the next stage.
  Sync(SyncBody<T, E>),
  /// Registers tickets on a [`FanoutScope`]; the next stage starts
  /// once every ticket has settled.
  Fanout(FanoutBody<T, E>),
}

/// Registration surface handed to a fan-out stage body.
pub struct FanoutScope<T, E> {
  tickets: Vec<BoxedTicket<T, E>>,
}

impl<T, E> FanoutScope<T, E> {
  fn new() -> Self {
    Self {
      tickets: Vec::new(),
    }
  }

  /// Reserve the next result slot for `operation` and return its
  /// index. Slots are filled in registration order no matter which
  /// operation settles first.
  pub fn ticket<F>(&mut self, operation: F) -> usize
  where
    F: Future<Output = Result<T, E>> + Send + 'static,
  {
    let slot = self.tickets.len();
    self.tickets.push(Box::pin(operation));
    slot
  }

  /// Number of tickets registered so far.
  pub fn len(&self) -> usize {
    self.tickets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.tickets.is_empty()
  }
}

/// An ordered sequence of stages, run once and then discarded.
///
/// `run` delivers the terminal outcome exactly once: `Ok` with the
/// final stage's values in registration order, or `Err` with the
/// failure the final stage carried.
pub struct Pipeline<T, E> {
  stages: Vec<Stage<T, E>>,
}

impl<T, E> Pipeline<T, E>
where
  T: Send + 'static,
  E: Display + Send + 'static,
{
  pub fn new() -> Self {
    Self { stages: Vec::new() }
  }

  /// Append a stage.
  pub fn stage(mut self, stage: Stage<T, E>) -> Self {
    self.stages.push(stage);
    self
  }

  /// Append a synchronous stage.
  pub fn sync<F>(self, body: F) -> Self
  where
    F: FnOnce(StageInput<T, E>) -> Result<T, E> + Send + 'static,
  {
    self.stage(Stage::Sync(Box::new(body)))
  }

  /// Append a fan-out stage. If the body returns `Err`, tickets it
  /// registered are discarded unpolled and the failure is carried to
  /// the next stage.
  pub fn fanout<F>(self, body: F) -> Self
  where
    F: FnOnce(StageInput<T, E>, &mut FanoutScope<T, E>) -> Result<(), E> + Send + 'static,
  {
    self.stage(Stage::Fanout(Box::new(body)))
  }

  /// Drive the stages in order.
  ///
  /// A failure never aborts the run early: the controller advances to
  /// the next stage with the failure marked in its input, and only the
  /// terminal outcome reports it. No stage is retried.
  pub async fn run(self) -> Result<Vec<T>, E> {
    let pipeline_id = Uuid::new_v4().to_string();
    debug!(
      pipeline_id = %pipeline_id,
      stages = self.stages.len(),
      "pipeline_started"
    );

    let mut input = StageInput::empty();
    for (index, stage) in self.stages.into_iter().enumerate() {
      input = match stage {
        Stage::Sync(body) => match body(input) {
          Ok(value) => StageInput::from_value(value),
          Err(failure) => StageInput::from_failure(failure),
        },
        Stage::Fanout(body) => {
          let mut scope = FanoutScope::new();
          match body(input, &mut scope) {
            Ok(()) => {
              debug!(
                pipeline_id = %pipeline_id,
                stage = index,
                tickets = scope.len(),
                "stage_fanout"
              );
              join_tickets(scope.tickets).await
            }
            Err(failure) => StageInput::from_failure(failure),
          }
        }
      };
      if let Some(failure) = &input.failure {
        debug!(
          pipeline_id = %pipeline_id,
          stage = index,
          failure = %failure,
          "stage_failed"
        );
      }
    }

    match input.check() {
      Ok(values) => {
        debug!(
          pipeline_id = %pipeline_id,
          results = values.len(),
          "pipeline_completed"
        );
        Ok(values)
      }
      Err(failure) => {
        error!(pipeline_id = %pipeline_id, failure = %failure, "pipeline_failed");
        Err(failure)
      }
    }
  }
}

impl<T, E> Default for Pipeline<T, E>
where
  T: Send + 'static,
  E: Display + Send + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// Join all tickets of one stage. `join_all` polls every ticket
/// concurrently and yields outcomes in registration order; the first
/// failed slot (in that order) becomes the carried failure while the
/// successes are kept best-effort.
async fn join_tickets<T, E>(tickets: Vec<BoxedTicket<T, E>>) -> StageInput<T, E> {
  let settled = futures::future::join_all(tickets).await;
  let mut failure = None;
  let mut values = Vec::with_capacity(settled.len());
  for outcome in settled {
    match outcome {
      Ok(value) => values.push(value),
      Err(e) => {
        if failure.is_none() {
          failure = Some(e);
        }
      }
    }
  }
  StageInput { failure, values }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn sync_stages_chain_values() {
    let result: Result<Vec<String>, String> = Pipeline::new()
      .sync(|_| Ok("one".to_string()))
      .sync(|input| {
        let values = input.check()?;
        Ok(format!("{}-two", values[0]))
      })
      .run()
      .await;

    assert_eq!(result, Ok(vec!["one-two".to_string()]));
  }

  #[tokio::test]
  async fn empty_pipeline_yields_no_values() {
    let result: Result<Vec<String>, String> = Pipeline::new().run().await;
    assert_eq!(result, Ok(vec![]));
  }

  #[tokio::test]
  async fn tickets_settle_in_registration_order() {
    // C settles first, A last; the next stage must still see A, B, C.
    let result: Result<Vec<String>, String> = Pipeline::new()
      .fanout(|_, scope| {
        scope.ticket(async {
          tokio::time::sleep(Duration::from_millis(30)).await;
          Ok("A".to_string())
        });
        scope.ticket(async {
          tokio::time::sleep(Duration::from_millis(20)).await;
          Ok("B".to_string())
        });
        scope.ticket(async {
          tokio::time::sleep(Duration::from_millis(10)).await;
          Ok("C".to_string())
        });
        Ok(())
      })
      .sync(|input| {
        let values = input.check()?;
        Ok(values.join(","))
      })
      .run()
      .await;

    assert_eq!(result, Ok(vec!["A,B,C".to_string()]));
  }

  #[tokio::test]
  async fn ticket_failure_reaches_the_next_stage() {
    let result: Result<Vec<String>, String> = Pipeline::new()
      .fanout(|_, scope| {
        scope.ticket(async { Ok("fine".to_string()) });
        scope.ticket(async { Err("disk on fire".to_string()) });
        Ok(())
      })
      .sync(|input| {
        // forward, not swallow
        let values = input.check()?;
        Ok(values.join(","))
      })
      .run()
      .await;

    assert_eq!(result, Err("disk on fire".to_string()));
  }

  #[tokio::test]
  async fn failure_does_not_abort_later_stages() {
    let later_ran = Arc::new(AtomicUsize::new(0));
    let witness = Arc::clone(&later_ran);

    let result: Result<Vec<String>, String> = Pipeline::new()
      .sync(|_| Err("early failure".to_string()))
      .sync(move |input| {
        witness.fetch_add(1, Ordering::SeqCst);
        assert_eq!(input.failure.as_deref(), Some("early failure"));
        // recover with a fallback value
        Ok("fallback".to_string())
      })
      .run()
      .await;

    assert_eq!(later_ran.load(Ordering::SeqCst), 1);
    assert_eq!(result, Ok(vec!["fallback".to_string()]));
  }

  #[tokio::test]
  async fn failing_fanout_body_discards_its_tickets() {
    let polled = Arc::new(AtomicUsize::new(0));
    let witness = Arc::clone(&polled);

    let result: Result<Vec<String>, String> = Pipeline::new()
      .fanout(move |_, scope| {
        let witness = Arc::clone(&witness);
        scope.ticket(async move {
          witness.fetch_add(1, Ordering::SeqCst);
          Ok("never seen".to_string())
        });
        Err("body failed after registering".to_string())
      })
      .run()
      .await;

    assert_eq!(result, Err("body failed after registering".to_string()));
    assert_eq!(polled.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn fanout_with_zero_tickets_passes_empty_input() {
    let result: Result<Vec<String>, String> = Pipeline::new()
      .fanout(|_, _| Ok(()))
      .sync(|input| {
        assert!(input.failure.is_none());
        assert!(input.values.is_empty());
        Ok("done".to_string())
      })
      .run()
      .await;

    assert_eq!(result, Ok(vec!["done".to_string()]));
  }

  #[tokio::test]
  async fn final_fanout_returns_all_values() {
    let result: Result<Vec<u64>, String> = Pipeline::new()
      .fanout(|_, scope| {
        for n in 0..4u64 {
          scope.ticket(async move {
            tokio::time::sleep(Duration::from_millis(8 - 2 * n)).await;
            Ok(n)
          });
        }
        Ok(())
      })
      .run()
      .await;

    assert_eq!(result, Ok(vec![0, 1, 2, 3]));
  }
}
