use thiserror::Error;

/// Errors raised while driving one agent run. Tool-local failures never
/// reach this type — they are converted to `tool-result isError=true` parts
/// inside the run loop and fed back to the model.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("llm transport error: {0}")]
    LlmTransport(#[from] crate::provider::ProviderError),

    #[error(transparent)]
    Transcript(#[from] agentlane_transcript::TranscriptError),

    #[error(transparent)]
    Router(#[from] agentlane_router::RouterError),

    #[error("step budget exceeded")]
    StepBudgetExceeded,

    #[error("run cancelled")]
    Cancelled,

    #[error("bad chat key: {0}")]
    BadChatKey(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl From<AgentError> for agentlane_core::AgentlaneError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::LlmTransport(e) => agentlane_core::AgentlaneError::LlmTransport(e.to_string()),
            AgentError::Transcript(e) => agentlane_core::AgentlaneError::TranscriptIo(e.to_string()),
            AgentError::Router(e) => agentlane_core::AgentlaneError::ToolExecution(e.to_string()),
            AgentError::StepBudgetExceeded => agentlane_core::AgentlaneError::StepBudgetExceeded,
            AgentError::Cancelled => agentlane_core::AgentlaneError::Cancelled,
            AgentError::BadChatKey(s) => agentlane_core::AgentlaneError::BadChatKey(s),
        }
    }
}
