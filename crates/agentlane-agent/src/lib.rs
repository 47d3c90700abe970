//! The agent: System-Prompt Providers, the built-in Tool Set, and the Agent
//! Run Loop that steps an LLM provider against them for one dequeued turn.

pub mod context;
pub mod error;
pub mod http_provider;
pub mod provider;
pub mod providers;
pub mod run;
pub mod tools;

pub use context::RunContext;
pub use error::{AgentError, Result};
pub use http_provider::HttpProvider;
pub use provider::{ChatRequest, ChatResponse, ChatTurn, LlmProvider, ProviderError, StopReason, ToolCall, ToolDefinition};
pub use providers::{AggregateOutput, ProviderOutput, ProviderOutputError, ProviderRegistry, SystemPromptProvider};
pub use run::{Agent, ApprovalHook, DenyApprovalHook, MaintenanceHook, NoopMaintenanceHook};
pub use tools::{filter_active, to_definitions, Tool, ToolResult};
