//! The Context Manager: the façade `agentlane-daemon` calls into. Owns the
//! chatKey → transcript-store cache and the shared agent behind one Lane
//! Scheduler (SPEC_FULL §4.8).

pub mod error;
pub mod manager;

pub use error::{ContextError, Result};
pub use manager::{ContextManager, EnqueueParams};
