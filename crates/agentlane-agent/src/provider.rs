use agentlane_core::MessagePart;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Tool definition sent to the LLM API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// A tool call extracted from the LLM response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// One turn of conversation history handed to a provider. Reuses
/// `agentlane_core`'s `Role`/`MessagePart` rather than inventing a parallel
/// message model — a turn is exactly what a transcript `Message` carries.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: agentlane_core::Role,
    pub parts: Vec<MessagePart>,
}

/// Request to an LLM provider for a single step of the run loop.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub turns: Vec<ChatTurn>,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The model produced a final answer with no further tool calls.
    EndTurn,
    /// The model wants to call one or more tools; the run loop should
    /// execute them and feed results back.
    ToolUse,
}

/// Response from an LLM provider for a single step.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub text: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: StopReason,
    pub tool_calls: Vec<ToolCall>,
}

/// Common interface for LLM providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// Send one step of the run loop and wait for the full response.
    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),
}
