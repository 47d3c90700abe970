use thiserror::Error;

/// Errors a dispatcher or the egress registry can raise.
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// The remote endpoint rejected or failed to deliver the message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The dispatcher did not respond within the allowed time budget.
    #[error("dispatcher timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// No dispatcher is registered for the requested channel.
    #[error("no dispatcher registered for channel {0}")]
    NoDispatcher(String),
}

pub type Result<T> = std::result::Result<T, DispatcherError>;
