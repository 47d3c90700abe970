use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("bad chat key: {0}")]
    BadChatKey(String),

    #[error("no dispatcher registered for channel {0}")]
    NoDispatcher(String),

    #[error("qq reply context missing: no prior ingress message carries messageId/chatType")]
    QqReplyContextMissing,

    #[error("dispatcher send failed: {0}")]
    SendFailed(String),

    #[error("transcript error: {0}")]
    Transcript(#[from] agentlane_transcript::TranscriptError),
}

pub type Result<T> = std::result::Result<T, RouterError>;
