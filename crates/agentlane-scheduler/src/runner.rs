//! The scheduler's view of an agent: just enough surface to drive a run
//! without depending on `agentlane-agent` and risking a dependency cycle
//! (the agent crate depends on the router and transcript, which the
//! scheduler must stay upstream of).

use crate::types::DrainedBatch;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Lets an in-flight run pull newly-arrived, same-lane messages into itself
/// instead of leaving them to wait for a follow-up run.
#[async_trait]
pub trait Drainer: Send + Sync {
    async fn drain_merged(&self) -> Option<DrainedBatch>;
}

/// Implemented by whatever owns the actual agent (`agentlane-context`, in
/// this kernel). The scheduler calls `run` once per dequeued turn.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(
        &self,
        chat_key: &str,
        text: &str,
        drain: &dyn Drainer,
        cancel: CancellationToken,
    ) -> agentlane_core::Result<()>;
}
