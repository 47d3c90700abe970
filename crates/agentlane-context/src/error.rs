use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("bad chat key: {0}")]
    BadChatKey(String),

    #[error("transcript io error: {0}")]
    Transcript(#[from] agentlane_transcript::TranscriptError),
}

impl From<ContextError> for agentlane_core::AgentlaneError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::BadChatKey(s) => agentlane_core::AgentlaneError::BadChatKey(s),
            ContextError::Transcript(e) => agentlane_core::AgentlaneError::TranscriptIo(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
