//! An OpenAI-compatible HTTP provider. Kept as the one surviving vendor
//! adapter — any OpenAI-wire-compatible endpoint (the real OpenAI API, a
//! local proxy, a self-hosted gateway) can be reached by pointing `base_url`
//! at it; `name`/`chat_path` let the same struct stand in for several such
//! endpoints without a dedicated type each.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use agentlane_core::{MessagePart, Role};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, StopReason, ToolCall};

pub struct HttpProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
    chat_path: String,
}

impl HttpProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self::with_path(
            "openai",
            api_key,
            base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            "/v1/chat/completions".to_string(),
        )
    }

    /// `base_url` should not include a trailing slash; `chat_path` should
    /// start with `/`.
    pub fn with_path(name: impl Into<String>, api_key: String, base_url: String, chat_path: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider_name: name.into(),
            api_key,
            base_url,
            chat_path,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn send(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = build_request_body(req);
        let url = format!("{}{}", self.base_url, self.chat_path);

        debug!(model = %req.model, "sending request to {}", self.provider_name);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "{} API error", self.provider_name);
            return Err(ProviderError::Api { status, message: text });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(parse_response(api_resp))
    }
}

fn build_request_body(req: &ChatRequest) -> serde_json::Value {
    let mut messages: Vec<serde_json::Value> = vec![serde_json::json!({
        "role": "system",
        "content": req.system,
    })];

    for turn in &req.turns {
        messages.extend(turn_to_openai(turn));
    }

    let mut body = serde_json::json!({
        "model": req.model,
        "messages": messages,
        "max_tokens": req.max_tokens,
        "stream": false,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    body
}

/// One `ChatTurn` maps to one OpenAI message when it's plain text, an
/// assistant message with `tool_calls` when it carries `ToolCall` parts, or
/// one `"tool"`-role message per `ToolResult` part.
fn turn_to_openai(turn: &crate::provider::ChatTurn) -> Vec<serde_json::Value> {
    let role = match turn.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let tool_calls: Vec<serde_json::Value> = turn
        .parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::ToolCall { tool_call_id, tool_name, args } => Some(serde_json::json!({
                "id": tool_call_id,
                "type": "function",
                "function": { "name": tool_name, "arguments": args.to_string() },
            })),
            _ => None,
        })
        .collect();

    if !tool_calls.is_empty() {
        let text: String = turn.parts.iter().filter_map(MessagePart::as_text).collect();
        let content = if text.is_empty() { serde_json::Value::Null } else { serde_json::json!(text) };
        return vec![serde_json::json!({ "role": "assistant", "content": content, "tool_calls": tool_calls })];
    }

    let tool_results: Vec<serde_json::Value> = turn
        .parts
        .iter()
        .filter_map(|p| match p {
            MessagePart::ToolResult { tool_call_id, output, .. } => Some(serde_json::json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "content": output.to_string(),
            })),
            _ => None,
        })
        .collect();

    if !tool_results.is_empty() {
        return tool_results;
    }

    let text: String = turn.parts.iter().filter_map(MessagePart::as_text).collect();
    vec![serde_json::json!({ "role": role, "content": text })]
}

fn parse_response(resp: ApiResponse) -> ChatResponse {
    let choice = resp.choices.into_iter().next();
    let content = choice.as_ref().and_then(|c| c.message.content.as_deref()).unwrap_or("").to_string();

    let tool_calls: Vec<ToolCall> = choice
        .as_ref()
        .and_then(|c| c.message.tool_calls.as_ref())
        .map(|calls| {
            calls
                .iter()
                .map(|tc| ToolCall {
                    id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    input: serde_json::from_str(&tc.function.arguments).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    let stop_reason = if tool_calls.is_empty() { StopReason::EndTurn } else { StopReason::ToolUse };

    ChatResponse {
        text: content,
        model: resp.model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp.usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
        stop_reason,
        tool_calls,
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatTurn;

    #[test]
    fn plain_text_turn_becomes_one_message() {
        let turn = ChatTurn { role: Role::User, parts: vec![MessagePart::text("hi")] };
        let msgs = turn_to_openai(&turn);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
        assert_eq!(msgs[0]["content"], "hi");
    }

    #[test]
    fn tool_call_turn_carries_tool_calls_array() {
        let turn = ChatTurn {
            role: Role::Assistant,
            parts: vec![MessagePart::ToolCall {
                tool_call_id: "tc1".into(),
                tool_name: "chat_send".into(),
                args: serde_json::json!({"text": "hi"}),
            }],
        };
        let msgs = turn_to_openai(&turn);
        assert_eq!(msgs[0]["role"], "assistant");
        assert_eq!(msgs[0]["tool_calls"][0]["function"]["name"], "chat_send");
    }

    #[test]
    fn tool_result_turn_becomes_tool_role_message() {
        let turn = ChatTurn {
            role: Role::User,
            parts: vec![MessagePart::ToolResult {
                tool_call_id: "tc1".into(),
                output: serde_json::json!({"ok": true}),
                is_error: false,
            }],
        };
        let msgs = turn_to_openai(&turn);
        assert_eq!(msgs[0]["role"], "tool");
        assert_eq!(msgs[0]["tool_call_id"], "tc1");
    }

    #[test]
    fn parse_response_with_tool_calls_sets_tool_use() {
        let resp = ApiResponse {
            model: "gpt".into(),
            choices: vec![Choice {
                message: ChatMessage {
                    content: None,
                    tool_calls: Some(vec![ApiToolCall {
                        id: "tc1".into(),
                        function: ApiFunction { name: "chat_send".into(), arguments: "{}".into() },
                    }]),
                },
            }],
            usage: None,
        };
        let chat = parse_response(resp);
        assert_eq!(chat.stop_reason, StopReason::ToolUse);
        assert_eq!(chat.tool_calls.len(), 1);
    }
}
