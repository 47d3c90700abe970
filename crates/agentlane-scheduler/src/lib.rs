//! `agentlane-scheduler` — one FIFO lane per chatKey, up to a configured
//! number running concurrently. Strict FIFO within a chatKey, no ordering
//! guarantee across chatKeys.
//!
//! The scheduler never touches the transcript or the agent directly; it is
//! handed an `AgentRunner` to drive each dequeued turn, which keeps this
//! crate's only dependency `agentlane-core`.

pub mod engine;
pub mod error;
pub mod runner;
pub mod types;

pub use engine::LaneScheduler;
pub use error::{Result, SchedulerError};
pub use runner::{AgentRunner, Drainer};
pub use types::{DrainedBatch, EnqueueOutcome, Lane, PendingMessage, SchedulerStats};
