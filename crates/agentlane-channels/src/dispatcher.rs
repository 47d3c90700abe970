use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Platform-native parameters for one outbound send. The registry and
/// router never interpret these beyond what routing requires — they are
/// forwarded as-is to whichever adapter implements `Dispatcher` for the
/// target channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTextParams {
    pub chat_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn ok() -> Self {
        SendOutcome { success: true, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        SendOutcome { success: false, error: Some(error.into()) }
    }
}

/// External contract implemented by a platform adapter. The kernel depends
/// only on this trait — individual platform adapters (HTTP polling, signing,
/// attachment handling) are out of scope.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    fn channel(&self) -> &str;

    async fn send_text(&self, params: SendTextParams) -> Result<SendOutcome>;

    /// Optional "typing…" style presence indicator. Default is a no-op
    /// success so adapters that don't support it need not implement it.
    async fn send_action(&self, _chat_id: &str, _action: &str) -> Result<SendOutcome> {
        Ok(SendOutcome::ok())
    }
}
