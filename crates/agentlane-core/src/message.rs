use crate::chat_key::{ChatKey, QqChatType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Generates a time-sortable message id. UUIDv7 embeds a millisecond
/// timestamp so ids sort the same way insertion order does, which is enough
/// of a ULID substitute for a JSONL-ordered transcript.
pub fn new_message_id() -> String {
    Uuid::now_v7().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Normal,
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSource {
    Ingress,
    Egress,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub from_id: String,
    pub to_id: String,
    pub count: usize,
}

/// One ordered content unit inside a message. `tool-call` and `tool-result`
/// parts are appended to the in-flight assistant message by the run loop as
/// the model drives the tool loop; `text` parts carry user input or model
/// prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    ToolCall {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        args: serde_json::Value,
    },
    ToolResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        output: serde_json::Value,
        #[serde(default, rename = "isError", skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessagePart::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub v: u32,
    pub ts: i64,
    #[serde(rename = "chatKey")]
    pub chat_key: String,
    pub channel: String,
    #[serde(rename = "targetId")]
    pub target_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "actorId")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "actorName")]
    pub actor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "messageId")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "threadId")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "targetType")]
    pub target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "requestId")]
    pub request_id: Option<String>,
    pub kind: MessageKind,
    pub source: MessageSource,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "sourceRange")]
    pub source_range: Option<SourceRange>,
    /// Set when the run loop exhausted its step budget before the model
    /// produced an `EndTurn` (SPEC_FULL §4.6 failure semantics).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl MessageMetadata {
    /// `chatType` lives in `targetType` for qq chat keys; extracted lazily
    /// rather than stored redundantly since it already rides in the chat key.
    pub fn chat_type(&self) -> Option<QqChatType> {
        self.target_type.as_deref().and_then(|s| QqChatType::from_str(s).ok())
    }
}

/// The sole unit of transcript persistence. Constructed once and never
/// mutated in place; compaction replaces a run of messages with a new
/// summary message rather than editing any existing one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new_user_text(
        chat_key: &ChatKey,
        text: impl Into<String>,
        now_ms: i64,
        actor_id: Option<String>,
        actor_name: Option<String>,
        message_id: Option<String>,
        thread_id: Option<String>,
        request_id: Option<String>,
    ) -> Self {
        let target_type = chat_key.chat_type().map(|t| t.to_string());
        Message {
            id: new_message_id(),
            role: Role::User,
            parts: vec![MessagePart::text(text)],
            metadata: MessageMetadata {
                v: 1,
                ts: now_ms,
                chat_key: chat_key.as_str().to_string(),
                channel: chat_key.channel().to_string(),
                target_id: chat_key.chat_id().to_string(),
                actor_id,
                actor_name,
                message_id,
                thread_id: thread_id.or_else(|| chat_key.thread_id().map(str::to_string)),
                target_type,
                request_id,
                kind: MessageKind::Normal,
                source: MessageSource::Ingress,
                source_range: None,
                truncated: false,
            },
        }
    }

    pub fn new_assistant_text(
        chat_key: &ChatKey,
        parts: Vec<MessagePart>,
        now_ms: i64,
        request_id: Option<String>,
    ) -> Self {
        Message {
            id: new_message_id(),
            role: Role::Assistant,
            parts,
            metadata: MessageMetadata {
                v: 1,
                ts: now_ms,
                chat_key: chat_key.as_str().to_string(),
                channel: chat_key.channel().to_string(),
                target_id: chat_key.chat_id().to_string(),
                actor_id: None,
                actor_name: None,
                message_id: None,
                thread_id: chat_key.thread_id().map(str::to_string),
                target_type: chat_key.chat_type().map(|t| t.to_string()),
                request_id,
                kind: MessageKind::Normal,
                source: MessageSource::Egress,
                source_range: None,
                truncated: false,
            },
        }
    }

    pub fn new_summary(
        chat_key: &ChatKey,
        summary_text: impl Into<String>,
        now_ms: i64,
        source_range: SourceRange,
    ) -> Self {
        Message {
            id: new_message_id(),
            role: Role::Assistant,
            parts: vec![MessagePart::text(summary_text)],
            metadata: MessageMetadata {
                v: 1,
                ts: now_ms,
                chat_key: chat_key.as_str().to_string(),
                channel: chat_key.channel().to_string(),
                target_id: chat_key.chat_id().to_string(),
                actor_id: None,
                actor_name: None,
                message_id: None,
                thread_id: chat_key.thread_id().map(str::to_string),
                target_type: chat_key.chat_type().map(|t| t.to_string()),
                request_id: None,
                kind: MessageKind::Summary,
                source: MessageSource::Compact,
                source_range: Some(source_range),
                truncated: false,
            },
        }
    }

    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(MessagePart::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn with_truncated(mut self, truncated: bool) -> Self {
        self.metadata.truncated = truncated;
        self
    }
}

/// Per-chatKey sidecar persisted as `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesMeta {
    pub v: u32,
    #[serde(rename = "chatKey")]
    pub chat_key: String,
    #[serde(rename = "pinnedSkillIds")]
    pub pinned_skill_ids: std::collections::BTreeSet<String>,
    #[serde(default, rename = "lastArchiveId")]
    pub last_archive_id: Option<String>,
    #[serde(rename = "keepLastMessages")]
    pub keep_last_messages: usize,
    #[serde(rename = "maxInputTokensApprox")]
    pub max_input_tokens_approx: usize,
    /// Cached running total; `totalMessageCount()` trusts this until a
    /// mismatch against the actual line count is observed.
    #[serde(default)]
    pub cached_total: usize,
}

impl MessagesMeta {
    pub fn new(chat_key: &ChatKey, keep_last_messages: usize, max_input_tokens_approx: usize) -> Self {
        MessagesMeta {
            v: 1,
            chat_key: chat_key.as_str().to_string(),
            pinned_skill_ids: Default::default(),
            last_archive_id: None,
            keep_last_messages,
            max_input_tokens_approx,
            cached_total: 0,
        }
    }
}

/// Injected by the skill-loading tool and by System-Prompt Providers; not
/// owned or persisted by the core beyond the id set in `MessagesMeta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "skillMdPath")]
    pub skill_md_path: String,
    pub content: String,
    #[serde(rename = "allowedTools")]
    pub allowed_tools: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_key::Channel;

    #[test]
    fn user_text_message_round_trips_through_json() {
        let key = ChatKey::new(Channel::Telegram, "123", None, None).unwrap();
        let msg = Message::new_user_text(&key, "hi", 1_700_000_000_000, None, None, None, None, None);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, msg.id);
        assert_eq!(back.text_content(), "hi");
        assert_eq!(back.metadata.chat_key, "telegram-chat-123");
    }

    #[test]
    fn tool_result_serializes_is_error_only_when_true() {
        let part = MessagePart::ToolResult {
            tool_call_id: "tc1".into(),
            output: serde_json::json!({"ok": true}),
            is_error: false,
        };
        let v = serde_json::to_value(&part).unwrap();
        assert!(v.get("isError").is_none());

        let part_err = MessagePart::ToolResult {
            tool_call_id: "tc1".into(),
            output: serde_json::json!({"ok": false}),
            is_error: true,
        };
        let v_err = serde_json::to_value(&part_err).unwrap();
        assert_eq!(v_err.get("isError"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn summary_message_carries_source_range() {
        let key = ChatKey::new(Channel::Telegram, "1", None, None).unwrap();
        let range = SourceRange { from_id: "a".into(), to_id: "b".into(), count: 6 };
        let msg = Message::new_summary(&key, "summary text", 0, range.clone());
        assert_eq!(msg.metadata.kind, MessageKind::Summary);
        assert_eq!(msg.metadata.source_range.unwrap().count, 6);
    }
}
