use thiserror::Error;

/// Errors that can occur within the lane scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("agent run failed: {0}")]
    RunFailed(#[from] agentlane_core::AgentlaneError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
