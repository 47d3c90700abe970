//! The Agent Run Loop (SPEC_FULL §4.6): compose the system prompt, load and
//! trim the transcript, then step the model against the tool set until it
//! stops calling tools or the step budget runs out.
//!
//! Grounded on the teacher's `pipeline::process` tool loop — same overall
//! shape (history → system prompt → tools → step-until-done → persist) —
//! generalized to the explicit `RunContext` (SPEC_FULL §9) and the
//! `agentlane_scheduler::AgentRunner` seam instead of a SQLite conversation
//! log and an ambient request context.
//!
//! Per §4.7, the inbound user turn is persisted by `ContextManager::enqueue`
//! before the lane scheduler ever dequeues it — this loop only loads history
//! (which already contains that turn) and appends the final assistant reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use agentlane_core::{config::RunConfig, ChatKey, MessagePart, Role};
use agentlane_router::ChatKeyRouter;
use agentlane_scheduler::{AgentRunner, Drainer};
use agentlane_transcript::TranscriptStore;

use crate::context::RunContext;
use crate::error::AgentError;
use crate::provider::{ChatRequest, ChatTurn, LlmProvider, ProviderError, StopReason};
use crate::providers::ProviderRegistry;
use crate::tools::{filter_active, to_definitions, Tool};

/// Fire-and-forget hook run after a turn is persisted (SPEC_FULL §4.9).
/// Failures are logged and never propagate back to the caller.
#[async_trait]
pub trait MaintenanceHook: Send + Sync {
    async fn on_write(&self, chat_key: &str, store: Arc<TranscriptStore>);
}

pub struct NoopMaintenanceHook;

#[async_trait]
impl MaintenanceHook for NoopMaintenanceHook {
    async fn on_write(&self, _chat_key: &str, _store: Arc<TranscriptStore>) {}
}

/// Out-of-band approval for calls where `Tool::needs_approval` is `true`
/// (SPEC_FULL §4.5/§5). The run loop waits on this up to
/// `RunConfig::approval_timeout_secs`; a `false` or a timeout both end in a
/// synthesized rejection fed back to the model as a tool-result error.
#[async_trait]
pub trait ApprovalHook: Send + Sync {
    async fn request_approval(&self, chat_key: &str, tool_name: &str, input: &serde_json::Value) -> bool;
}

/// No human-in-the-loop channel wired up: every approval-gated call is
/// denied immediately rather than left hanging for the full timeout.
pub struct DenyApprovalHook;

#[async_trait]
impl ApprovalHook for DenyApprovalHook {
    async fn request_approval(&self, _chat_key: &str, _tool_name: &str, _input: &serde_json::Value) -> bool {
        false
    }
}

/// Drives one run end-to-end for whatever owns it (`agentlane-context` in
/// this kernel, directly via `AgentRunner`).
pub struct Agent {
    pub provider: Arc<dyn LlmProvider>,
    pub tools: Vec<Box<dyn Tool>>,
    pub providers: Arc<ProviderRegistry>,
    pub router: Arc<ChatKeyRouter>,
    pub root_dir: std::path::PathBuf,
    pub run_config: RunConfig,
    pub maintenance: Arc<dyn MaintenanceHook>,
    pub approval: Arc<dyn ApprovalHook>,
}

#[async_trait]
impl AgentRunner for Agent {
    async fn run(
        &self,
        chat_key: &str,
        text: &str,
        drain: &dyn Drainer,
        cancel: CancellationToken,
    ) -> agentlane_core::Result<()> {
        let result = self.run_inner(chat_key, text, drain, cancel).await;
        result.map_err(Into::into)
    }
}

impl Agent {
    /// `text` names the turn that triggered this run for logging purposes
    /// only — the query itself is whatever `ContextManager::append_user_message`
    /// already wrote to history before this run was scheduled.
    async fn run_inner(
        &self,
        chat_key: &str,
        _text: &str,
        drain: &dyn Drainer,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let key = ChatKey::parse(chat_key).map_err(|e| AgentError::BadChatKey(e.0))?;
        let store = Arc::new(TranscriptStore::new(&self.root_dir, key.clone()));

        let ctx = RunContext::new(
            key,
            self.root_dir.clone(),
            self.router.clone(),
            store.clone(),
            self.run_config.max_chat_send_per_run,
        );

        let result = self.run_steps(&ctx, drain, &cancel).await;

        ctx.terminal.lock().await.close_all().await;
        self.maintenance.on_write(chat_key, store).await;

        result
    }

    async fn run_steps(
        &self,
        ctx: &RunContext,
        drain: &dyn Drainer,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        let aggregate = self.providers.aggregate(ctx).await;
        for skill in &aggregate.loaded_skills {
            ctx.add_loaded_skill(skill.clone());
        }
        let system = build_system_prompt(&aggregate);

        let loaded = ctx.store.load_all()?;
        let mut turns: Vec<ChatTurn> =
            loaded.messages.iter().map(|m| ChatTurn { role: m.role, parts: m.parts.clone() }).collect();

        let tools = filter_active(&self.tools, &aggregate.active_tools);
        let definitions = to_definitions(&tools);

        // Parts accumulated across every step of this run — the single
        // in-flight assistant message SPEC_FULL §4.6 step 4 describes.
        // Persisted once, in full, when the run finalizes.
        let mut accumulated_parts: Vec<MessagePart> = Vec::new();
        let mut truncated = false;
        let mut ended = false;

        for step in 0..self.run_config.step_budget {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }

            if let Some(batch) = drain.drain_merged().await {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let merged = ctx.store.create_user_text_message(batch.text, now_ms, None, None, batch.message_id, batch.thread_id, None);
                ctx.store.append(&merged).await?;
                turns.push(ChatTurn { role: Role::User, parts: merged.parts });
            }

            let request = ChatRequest {
                model: self.run_config.default_model.clone(),
                system: system.clone(),
                turns: turns.clone(),
                max_tokens: 4096,
                tools: definitions.clone(),
            };

            let response = match self.send_with_retries(&request).await {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "llm transport exhausted retry budget");
                    accumulated_parts.push(MessagePart::text(format!("I hit an error: {e}")));
                    ended = true;
                    break;
                }
            };

            if !response.text.is_empty() {
                accumulated_parts.push(MessagePart::text(response.text.clone()));
            }

            if response.stop_reason == StopReason::EndTurn {
                ended = true;
                break;
            }

            let mut assistant_parts = Vec::new();
            if !response.text.is_empty() {
                assistant_parts.push(MessagePart::text(response.text));
            }
            for call in &response.tool_calls {
                let call_part = MessagePart::ToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    args: call.input.clone(),
                };
                assistant_parts.push(call_part.clone());
                accumulated_parts.push(call_part);
            }
            turns.push(ChatTurn { role: Role::Assistant, parts: assistant_parts });

            let mut result_parts = Vec::new();
            for call in &response.tool_calls {
                let tool = tools.iter().find(|t| t.name() == call.name);
                let result = match tool {
                    Some(t) if t.needs_approval(&call.input) => self.run_approved(*t, call, ctx).await,
                    Some(t) => t.execute(call.input.clone(), ctx).await,
                    None => crate::tools::ToolResult::error(format!("unknown tool: {}", call.name)),
                };
                let result_part = MessagePart::ToolResult {
                    tool_call_id: call.id.clone(),
                    output: serde_json::json!({ "content": result.content }),
                    is_error: result.is_error,
                };
                result_parts.push(result_part.clone());
                accumulated_parts.push(result_part);
            }
            turns.push(ChatTurn { role: Role::User, parts: result_parts });

            if step + 1 == self.run_config.step_budget {
                truncated = true;
            }
        }

        if !ended {
            truncated = true;
            if accumulated_parts.is_empty() {
                accumulated_parts.push(MessagePart::text("I ran out of steps before finishing this task."));
            }
        }
        if truncated {
            warn!(chat_key = %ctx.chat_key, "run truncated by step budget");
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        let assistant_msg = ctx
            .store
            .create_assistant_text_message(accumulated_parts, now_ms, Some(ctx.request_id.as_str().to_string()))
            .with_truncated(truncated);
        ctx.store.append(&assistant_msg).await?;

        Ok(())
    }

    /// Waits up to `RunConfig::approval_timeout_secs` for `self.approval` to
    /// resolve; a denial or a timeout both become a rejected tool result
    /// rather than aborting the run (SPEC_FULL §5).
    async fn run_approved(&self, tool: &dyn Tool, call: &crate::provider::ToolCall, ctx: &RunContext) -> crate::tools::ToolResult {
        let wait = Duration::from_secs(self.run_config.approval_timeout_secs);
        match tokio::time::timeout(wait, self.approval.request_approval(ctx.chat_key.as_str(), &call.name, &call.input)).await {
            Ok(true) => tool.execute(call.input.clone(), ctx).await,
            Ok(false) => crate::tools::ToolResult::error(format!("tool call to {} was rejected by the approver", call.name)),
            Err(_) => {
                warn!(tool = %call.name, "approval wait timed out");
                crate::tools::ToolResult::error(agentlane_core::AgentlaneError::ApprovalTimeout.to_string())
            }
        }
    }

    async fn send_with_retries(&self, request: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
        let mut attempt = 0;
        loop {
            match self.provider.send(request).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < self.run_config.llm_retry_budget => {
                    attempt += 1;
                    let backoff_ms = 250u64.saturating_mul(1 << attempt.min(4));
                    warn!(attempt, error = %e, "llm send failed, retrying");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn build_system_prompt(aggregate: &crate::providers::AggregateOutput) -> String {
    let mut out = String::from("You are an autonomous agent. Use the available tools to help the user.");
    for message in &aggregate.messages {
        out.push_str("\n\n");
        out.push_str(message);
    }
    if !aggregate.loaded_skills.is_empty() {
        out.push_str("\n\n## Active skills\n");
        for skill in &aggregate.loaded_skills {
            out.push_str(&format!("- {}: {}\n", skill.name, skill.content.lines().next().unwrap_or("")));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{ProviderOutput, ProviderOutputError, SystemPromptProvider};
    use crate::tools::ToolResult;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        responses: std::sync::Mutex<Vec<crate::provider::ChatResponse>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<crate::provider::ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ProviderError::Unavailable("no more canned responses".into()));
            }
            Ok(responses.remove(0))
        }
    }

    struct NullDrainer;
    #[async_trait]
    impl Drainer for NullDrainer {
        async fn drain_merged(&self) -> Option<agentlane_scheduler::DrainedBatch> {
            None
        }
    }

    struct EchoTool;
    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, _input: serde_json::Value, _ctx: &RunContext) -> ToolResult {
            ToolResult::success("echoed")
        }
    }

    fn agent(responses: Vec<crate::provider::ChatResponse>, tools: Vec<Box<dyn Tool>>, root: &std::path::Path) -> Agent {
        let registry = Arc::new(agentlane_channels::EgressRegistry::new());
        let router = Arc::new(ChatKeyRouter::new(registry));
        Agent {
            provider: Arc::new(FixedProvider { responses: std::sync::Mutex::new(responses), calls: AtomicUsize::new(0) }),
            tools,
            providers: Arc::new(ProviderRegistry::new()),
            router,
            root_dir: root.to_path_buf(),
            run_config: RunConfig { step_budget: 5, llm_retry_budget: 1, ..RunConfig::default() },
            maintenance: Arc::new(NoopMaintenanceHook),
            approval: Arc::new(DenyApprovalHook),
        }
    }

    fn end_turn(text: &str) -> crate::provider::ChatResponse {
        crate::provider::ChatResponse {
            text: text.to_string(),
            model: "test".into(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: StopReason::EndTurn,
            tool_calls: vec![],
        }
    }

    /// Stands in for `ContextManager::append_user_message`, which persists
    /// the inbound turn before the scheduler ever dequeues it.
    async fn seed_user_turn(dir: &std::path::Path, chat_key: &str, text: &str) {
        let store = TranscriptStore::new(dir, ChatKey::parse(chat_key).unwrap());
        let msg = store.create_user_text_message(text, 0, None, None, None, None, None);
        store.append(&msg).await.unwrap();
    }

    #[tokio::test]
    async fn run_with_no_tool_calls_persists_assistant_reply() {
        let dir = tempfile::TempDir::new().unwrap();
        seed_user_turn(dir.path(), "telegram-chat-1", "hi").await;
        let agent = agent(vec![end_turn("hello there")], vec![], dir.path());
        agent.run("telegram-chat-1", "hi", &NullDrainer, CancellationToken::new()).await.unwrap();

        let store = TranscriptStore::new(dir.path(), ChatKey::parse("telegram-chat-1").unwrap());
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[1].text_content(), "hello there");
    }

    #[tokio::test]
    async fn s6_tool_error_becomes_tool_result_part_and_run_completes() {
        struct FailingTool;
        #[async_trait]
        impl Tool for FailingTool {
            fn name(&self) -> &str {
                "chat_send"
            }
            fn description(&self) -> &str {
                "fails"
            }
            fn input_schema(&self) -> serde_json::Value {
                serde_json::json!({})
            }
            async fn execute(&self, _input: serde_json::Value, _ctx: &RunContext) -> ToolResult {
                ToolResult::error("network")
            }
        }

        let dir = tempfile::TempDir::new().unwrap();
        let tool_call_response = crate::provider::ChatResponse {
            text: String::new(),
            model: "test".into(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: StopReason::ToolUse,
            tool_calls: vec![crate::provider::ToolCall {
                id: "tc1".into(),
                name: "chat_send".into(),
                input: serde_json::json!({"text": "hi"}),
            }],
        };
        seed_user_turn(dir.path(), "telegram-chat-1", "hi").await;
        let agent = agent(vec![tool_call_response, end_turn("done")], vec![Box::new(FailingTool)], dir.path());
        agent.run("telegram-chat-1", "hi", &NullDrainer, CancellationToken::new()).await.unwrap();

        let store = TranscriptStore::new(dir.path(), ChatKey::parse("telegram-chat-1").unwrap());
        let loaded = store.load_all().unwrap();
        let final_msg = loaded.messages.last().unwrap();
        let tool_result = final_msg.parts.iter().find(|p| matches!(p, MessagePart::ToolResult { .. }));
        match tool_result {
            Some(MessagePart::ToolResult { is_error, .. }) => assert!(is_error),
            _ => panic!("expected a tool-result part on the persisted assistant message"),
        }
        assert!(final_msg.parts.iter().any(|p| matches!(p, MessagePart::ToolCall { .. })));
        assert_eq!(final_msg.text_content(), "done");
        assert!(!final_msg.metadata.truncated);
    }

    struct GatedTool;
    #[async_trait]
    impl Tool for GatedTool {
        fn name(&self) -> &str {
            "exec_command"
        }
        fn description(&self) -> &str {
            "gated"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        fn needs_approval(&self, _input: &serde_json::Value) -> bool {
            true
        }
        async fn execute(&self, _input: serde_json::Value, _ctx: &RunContext) -> ToolResult {
            ToolResult::success("ran")
        }
    }

    struct FixedApprovalHook(bool);
    #[async_trait]
    impl ApprovalHook for FixedApprovalHook {
        async fn request_approval(&self, _chat_key: &str, _tool_name: &str, _input: &serde_json::Value) -> bool {
            self.0
        }
    }

    fn gated_tool_call_response() -> crate::provider::ChatResponse {
        crate::provider::ChatResponse {
            text: String::new(),
            model: "test".into(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: StopReason::ToolUse,
            tool_calls: vec![crate::provider::ToolCall {
                id: "tc1".into(),
                name: "exec_command".into(),
                input: serde_json::json!({}),
            }],
        }
    }

    #[tokio::test]
    async fn approved_gated_call_executes_the_tool() {
        let dir = tempfile::TempDir::new().unwrap();
        seed_user_turn(dir.path(), "telegram-chat-1", "hi").await;
        let mut a = agent(vec![gated_tool_call_response(), end_turn("done")], vec![Box::new(GatedTool)], dir.path());
        a.approval = Arc::new(FixedApprovalHook(true));
        a.run("telegram-chat-1", "hi", &NullDrainer, CancellationToken::new()).await.unwrap();

        let store = TranscriptStore::new(dir.path(), ChatKey::parse("telegram-chat-1").unwrap());
        let loaded = store.load_all().unwrap();
        let final_msg = loaded.messages.last().unwrap();
        match final_msg.parts.iter().find(|p| matches!(p, MessagePart::ToolResult { .. })) {
            Some(MessagePart::ToolResult { is_error, output, .. }) => {
                assert!(!is_error);
                assert_eq!(output["content"], serde_json::json!("ran"));
            }
            _ => panic!("expected a tool-result part"),
        }
    }

    #[tokio::test]
    async fn denied_gated_call_becomes_rejected_tool_result() {
        let dir = tempfile::TempDir::new().unwrap();
        seed_user_turn(dir.path(), "telegram-chat-1", "hi").await;
        let mut a = agent(vec![gated_tool_call_response(), end_turn("done")], vec![Box::new(GatedTool)], dir.path());
        a.approval = Arc::new(FixedApprovalHook(false));
        a.run("telegram-chat-1", "hi", &NullDrainer, CancellationToken::new()).await.unwrap();

        let store = TranscriptStore::new(dir.path(), ChatKey::parse("telegram-chat-1").unwrap());
        let loaded = store.load_all().unwrap();
        let final_msg = loaded.messages.last().unwrap();
        match final_msg.parts.iter().find(|p| matches!(p, MessagePart::ToolResult { .. })) {
            Some(MessagePart::ToolResult { is_error, .. }) => assert!(is_error),
            _ => panic!("expected a tool-result part"),
        }
    }

    #[tokio::test]
    async fn exhausting_step_budget_marks_truncated_reply() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool_call_response = crate::provider::ChatResponse {
            text: String::new(),
            model: "test".into(),
            tokens_in: 0,
            tokens_out: 0,
            stop_reason: StopReason::ToolUse,
            tool_calls: vec![crate::provider::ToolCall { id: "tc1".into(), name: "echo".into(), input: serde_json::json!({}) }],
        };
        seed_user_turn(dir.path(), "telegram-chat-1", "hi").await;
        let responses = std::iter::repeat_with(|| tool_call_response.clone()).take(5).collect();
        let mut a = agent(responses, vec![Box::new(EchoTool)], dir.path());
        a.run_config.step_budget = 3;
        a.run("telegram-chat-1", "hi", &NullDrainer, CancellationToken::new()).await.unwrap();

        let store = TranscriptStore::new(dir.path(), ChatKey::parse("telegram-chat-1").unwrap());
        let loaded = store.load_all().unwrap();
        let final_msg = loaded.messages.last().unwrap();
        assert!(final_msg.metadata.truncated);
        assert!(final_msg.parts.iter().any(|p| matches!(p, MessagePart::ToolCall { .. })));
    }

    #[tokio::test]
    async fn system_prompt_aggregates_provider_messages() {
        struct Fixed;
        #[async_trait]
        impl SystemPromptProvider for Fixed {
            fn id(&self) -> &str {
                "p1"
            }
            async fn provide(&self, _ctx: &RunContext) -> Result<ProviderOutput, ProviderOutputError> {
                Ok(ProviderOutput { messages: vec!["extra context".into()], active_tools: None, loaded_skills: vec![] })
            }
        }

        let dir = tempfile::TempDir::new().unwrap();
        seed_user_turn(dir.path(), "telegram-chat-1", "hi").await;
        let mut a = agent(vec![end_turn("ok")], vec![], dir.path());
        let providers = ProviderRegistry::new();
        providers.register(Arc::new(Fixed));
        a.providers = Arc::new(providers);
        a.run("telegram-chat-1", "hi", &NullDrainer, CancellationToken::new()).await.unwrap();
        // no panic + run completes is sufficient; prompt content isn't persisted separately.
    }
}
