//! Continuation-style pipelines for spelt.
//!
//! A [`Pipeline`] runs an ordered list of stages. Each stage either
//! returns a value synchronously or fans out any number of concurrent
//! sub-operations ("tickets") which are joined before the next stage
//! runs. Failures travel through the same channel as results: a failed
//! stage or ticket marks the next stage's [`StageInput`] instead of
//! aborting the run, and stage bodies decide whether to recover or
//! forward the failure.
//!
//! # Architecture
//!
//! ```text
//! Pipeline::new()
//!   .sync(body)        - stage producing one value synchronously
//!   .fanout(body)      - stage registering parallel tickets
//!   .run()             - drives the stages, returns the final outcome
//!
//! StageInput { failure, values }
//!   - failure: carried from the previous stage, checked by the body
//!   - values: previous results, in ticket registration order
//! ```

mod pipeline;

pub use pipeline::{FanoutBody, FanoutScope, Pipeline, Stage, StageInput, SyncBody};
