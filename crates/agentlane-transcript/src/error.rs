use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("transcript io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("bad chat key: {0}")]
    BadChatKey(String),

    #[error("compaction would archive more messages than exist")]
    CompactionOverrun,
}

pub type Result<T> = std::result::Result<T, TranscriptError>;
