//! The Tool Set (SPEC_FULL §4.5): a map `toolName → Tool`, where a `Tool`
//! has an input schema, an `execute` function, and an optional
//! `needs_approval` predicate. Tools receive the run's `RunContext`
//! explicitly (SPEC_FULL §9's reframing of the ambient async-local context).

pub mod chat;
pub mod shell;
pub mod skill;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RunContext;
use crate::provider::ToolDefinition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self { content: content.into(), is_error: false }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { content: message.into(), is_error: true }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> serde_json::Value;

    /// Whether this call must wait for out-of-band approval before running.
    /// Default `false`; MCP pass-through tools and shell primitives keep the
    /// default, matching SPEC_FULL §4.5's "approval defaults to false".
    fn needs_approval(&self, _input: &serde_json::Value) -> bool {
        false
    }

    async fn execute(&self, input: serde_json::Value, ctx: &RunContext) -> ToolResult;
}

/// Builds the tool whitelist a step's LLM call is allowed to see: every tool
/// if `active_tools` is `None` (unrestricted), otherwise the intersection
/// plus shell session primitives, which SPEC_FULL §4.6 step 3 says are
/// always allowed regardless of what providers declared.
pub fn filter_active<'a>(tools: &'a [Box<dyn Tool>], active_tools: &Option<std::collections::HashSet<String>>) -> Vec<&'a dyn Tool> {
    const ALWAYS_ALLOWED: &[&str] = &["exec_command", "write_stdin", "close_shell"];
    match active_tools {
        None => tools.iter().map(|t| t.as_ref()).collect(),
        Some(allowed) => tools
            .iter()
            .map(|t| t.as_ref())
            .filter(|t| allowed.contains(t.name()) || ALWAYS_ALLOWED.contains(&t.name()))
            .collect(),
    }
}

pub fn to_definitions(tools: &[&dyn Tool]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy(&'static str);
    #[async_trait]
    impl Tool for Dummy {
        fn name(&self) -> &str {
            self.0
        }
        fn description(&self) -> &str {
            "dummy"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({})
        }
        async fn execute(&self, _input: serde_json::Value, _ctx: &RunContext) -> ToolResult {
            ToolResult::success("")
        }
    }

    #[test]
    fn unrestricted_when_no_provider_declared_active_tools() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(Dummy("chat_send")), Box::new(Dummy("skill_load"))];
        let filtered = filter_active(&tools, &None);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn shell_primitives_always_allowed_even_when_not_declared() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(Dummy("chat_send")), Box::new(Dummy("exec_command"))];
        let active = Some(["chat_send".to_string()].into_iter().collect());
        let filtered = filter_active(&tools, &active);
        let names: Vec<_> = filtered.iter().map(|t| t.name()).collect();
        assert!(names.contains(&"chat_send"));
        assert!(names.contains(&"exec_command"));
    }

    #[test]
    fn non_declared_non_shell_tool_is_excluded() {
        let tools: Vec<Box<dyn Tool>> = vec![Box::new(Dummy("chat_send")), Box::new(Dummy("skill_load"))];
        let active = Some(["chat_send".to_string()].into_iter().collect());
        let filtered = filter_active(&tools, &active);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name(), "chat_send");
    }
}
