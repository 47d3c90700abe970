use thiserror::Error;

/// Top-level aggregate error. Individual crates raise their own typed errors
/// (`TranscriptError`, `RouterError`, `SchedulerError`, `ToolError`, ...);
/// this is the type a caller that wants one error to match on sees.
#[derive(Debug, Error)]
pub enum AgentlaneError {
    #[error("bad chat key: {0}")]
    BadChatKey(String),

    #[error("no dispatcher registered for channel {0}")]
    NoDispatcher(String),

    #[error("qq reply context missing (chatType/messageId not found in transcript)")]
    QqReplyContextMissing,

    #[error("transcript io error: {0}")]
    TranscriptIo(String),

    #[error("llm transport error: {0}")]
    LlmTransport(String),

    #[error("tool execution error: {0}")]
    ToolExecution(String),

    #[error("approval timed out")]
    ApprovalTimeout,

    #[error("step budget exceeded")]
    StepBudgetExceeded,

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentlaneError {
    /// Short error code, stable across releases, for logging and for
    /// callers that want to match without depending on variant shape.
    pub fn code(&self) -> &'static str {
        match self {
            AgentlaneError::BadChatKey(_) => "BAD_CHAT_KEY",
            AgentlaneError::NoDispatcher(_) => "NO_DISPATCHER",
            AgentlaneError::QqReplyContextMissing => "QQ_REPLY_CONTEXT_MISSING",
            AgentlaneError::TranscriptIo(_) => "TRANSCRIPT_IO",
            AgentlaneError::LlmTransport(_) => "LLM_TRANSPORT",
            AgentlaneError::ToolExecution(_) => "TOOL_EXECUTION",
            AgentlaneError::ApprovalTimeout => "APPROVAL_TIMEOUT",
            AgentlaneError::StepBudgetExceeded => "STEP_BUDGET_EXCEEDED",
            AgentlaneError::Cancelled => "CANCELLED",
            AgentlaneError::Config(_) => "CONFIG_ERROR",
            AgentlaneError::Serialization(_) => "SERIALIZATION_ERROR",
            AgentlaneError::Io(_) => "IO_ERROR",
            AgentlaneError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this error kind is one the run loop should feed back to the
    /// model as a tool-result rather than aborting the run.
    pub fn is_tool_local(&self) -> bool {
        matches!(
            self,
            AgentlaneError::NoDispatcher(_)
                | AgentlaneError::QqReplyContextMissing
                | AgentlaneError::ToolExecution(_)
                | AgentlaneError::ApprovalTimeout
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentlaneError>;
