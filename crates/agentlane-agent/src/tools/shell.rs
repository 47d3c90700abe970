use async_trait::async_trait;

use agentlane_terminal::SessionId;

use crate::context::RunContext;

use super::{Tool, ToolResult};

/// `exec_command(cmd)` — opens a new shell session on the run's own
/// `TerminalManager` and runs `cmd` in it. Sessions are process-scoped,
/// owned by the run, and forcibly closed on run termination
/// (SPEC_FULL §4.5; ownership detail recorded in DESIGN.md).
pub struct ExecCommandTool;

#[async_trait]
impl Tool for ExecCommandTool {
    fn name(&self) -> &str {
        "exec_command"
    }

    fn description(&self) -> &str {
        "Run a shell command in a fresh session and return its output."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "cmd": { "type": "string" },
                "shell": { "type": "string" },
                "cwd": { "type": "string" },
            },
            "required": ["cmd"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &RunContext) -> ToolResult {
        let cmd = match input.get("cmd").and_then(|v| v.as_str()) {
            Some(c) if !c.is_empty() => c,
            _ => return ToolResult::error("missing required parameter: cmd"),
        };
        let shell = input.get("shell").and_then(|v| v.as_str());
        let cwd = input.get("cwd").and_then(|v| v.as_str());

        let mut terminal = ctx.terminal.lock().await;
        match terminal.exec_command(cmd, shell, cwd).await {
            Ok((id, output)) => ToolResult::success(format!("[session {id}]\n{output}")),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// `write_stdin(sessionId, data)` — writes to an open session then polls for
/// the output that settled after the write.
pub struct WriteStdinTool;

#[async_trait]
impl Tool for WriteStdinTool {
    fn name(&self) -> &str {
        "write_stdin"
    }

    fn description(&self) -> &str {
        "Write input to an open shell session and return the output it produced."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "sessionId": { "type": "string" },
                "data": { "type": "string" },
            },
            "required": ["sessionId", "data"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &RunContext) -> ToolResult {
        let session_id = match input.get("sessionId").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: sessionId"),
        };
        let data = match input.get("data").and_then(|v| v.as_str()) {
            Some(d) => d,
            None => return ToolResult::error("missing required parameter: data"),
        };
        let id = SessionId::from(session_id);

        let terminal = ctx.terminal.lock().await;
        match terminal.write_stdin(&id, data).await {
            Ok(output) => ToolResult::success(output),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// `close_shell(sessionId)`.
pub struct CloseShellTool;

#[async_trait]
impl Tool for CloseShellTool {
    fn name(&self) -> &str {
        "close_shell"
    }

    fn description(&self) -> &str {
        "Close an open shell session."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "sessionId": { "type": "string" } },
            "required": ["sessionId"],
        })
    }

    async fn execute(&self, input: serde_json::Value, ctx: &RunContext) -> ToolResult {
        let session_id = match input.get("sessionId").and_then(|v| v.as_str()) {
            Some(s) => s,
            None => return ToolResult::error("missing required parameter: sessionId"),
        };
        let id = SessionId::from(session_id);

        let mut terminal = ctx.terminal.lock().await;
        match terminal.close_shell(&id).await {
            Ok(()) => ToolResult::success("closed"),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
