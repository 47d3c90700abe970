use async_trait::async_trait;

use agentlane_core::fingerprint;
use agentlane_transcript::TranscriptStore;

use crate::context::RunContext;

use super::{Tool, ToolResult};

/// `chat_send(text)` — replies on the run's own chatKey. Idempotent by
/// `(chatKey, fingerprint(text))` within one run and capped at
/// `max_chat_send_per_run` dispatches (SPEC_FULL §4.5, §8 invariant 6).
pub struct ChatSendTool;

#[async_trait]
impl Tool for ChatSendTool {
    fn name(&self) -> &str {
        "chat_send"
    }

    fn description(&self) -> &str {
        "Send a user-visible reply on the current conversation."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &RunContext) -> ToolResult {
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) if !t.is_empty() => t,
            _ => return ToolResult::error("missing required parameter: text"),
        };

        if !ctx.try_reserve_chat_send(&fingerprint(text)) {
            return ToolResult::error(format!(
                "chat_send budget exhausted or this text was already sent this run (limit {})",
                ctx.max_chat_send_per_run
            ));
        }

        match ctx.router.send_text_by_chat_key(ctx.chat_key.as_str(), text, &ctx.store).await {
            Ok(outcome) if outcome.success => ToolResult::success("sent"),
            Ok(outcome) => ToolResult::error(outcome.error.unwrap_or_else(|| "send failed".into())),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// `chat_contact_send(chatKey, text)` — replies on a chatKey other than the
/// one driving this run (SPEC_FULL §4.5, calling into §4.3's Router).
pub struct ChatContactSendTool;

#[async_trait]
impl Tool for ChatContactSendTool {
    fn name(&self) -> &str {
        "chat_contact_send"
    }

    fn description(&self) -> &str {
        "Send a message to a different conversation by its chat key."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "chatKey": { "type": "string" },
                "text": { "type": "string" },
            },
            "required": ["chatKey", "text"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &RunContext) -> ToolResult {
        let chat_key = match input.get("chatKey").and_then(|v| v.as_str()) {
            Some(k) if !k.is_empty() => k,
            _ => return ToolResult::error("missing required parameter: chatKey"),
        };
        let text = match input.get("text").and_then(|v| v.as_str()) {
            Some(t) if !t.is_empty() => t,
            _ => return ToolResult::error("missing required parameter: text"),
        };

        let key = match agentlane_router::ChatKeyRouter::parse(chat_key) {
            Ok(k) => k,
            Err(e) => return ToolResult::error(e.to_string()),
        };
        let store = TranscriptStore::new(&ctx.root_dir, key);

        match ctx.router.send_text_by_chat_key(chat_key, text, &store).await {
            Ok(outcome) if outcome.success => ToolResult::success("sent"),
            Ok(outcome) => ToolResult::error(outcome.error.unwrap_or_else(|| "send failed".into())),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
