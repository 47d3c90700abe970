//! `TerminalManager` — owns and multiplexes the PTY shell sessions opened by
//! a single agent run.
//!
//! Sessions are run-scoped: the run owns this manager, and `close_all` is
//! called on run termination (completion, cancellation, or failure) so no
//! shell process outlives the run that spawned it.

use crate::{
    error::{Result, TerminalError},
    safety,
    session::ShellSession,
    truncate,
    types::{SessionId, SessionInfo},
};
use std::collections::HashMap;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Delay between writing input and reading back accumulated output. Long
/// enough for a shell prompt to echo the immediate result of a command
/// without blocking the tool call on long-running output.
const POLL_SETTLE: Duration = Duration::from_millis(300);

/// Manages the PTY sessions opened by one run.
pub struct TerminalManager {
    sessions: HashMap<SessionId, ShellSession>,
}

impl TerminalManager {
    /// Create an empty manager with no open sessions.
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Open a new PTY session and return its `SessionId`.
    ///
    /// # Arguments
    ///
    /// * `shell` – shell binary path (defaults to `$SHELL` or `/bin/bash`).
    /// * `cwd`   – starting directory (defaults to the process's cwd).
    pub async fn create_session(
        &mut self,
        shell: Option<&str>,
        cwd: Option<&str>,
    ) -> Result<SessionId> {
        let shell = shell
            .map(str::to_string)
            .or_else(|| std::env::var("SHELL").ok())
            .unwrap_or_else(|| "/bin/bash".to_string());

        let cwd = cwd
            .map(str::to_string)
            .or_else(|| {
                std::env::current_dir()
                    .ok()
                    .and_then(|p| p.to_str().map(str::to_string))
            })
            .unwrap_or_else(|| "/".to_string());

        let id = SessionId::new();
        let session = ShellSession::new(&shell, &cwd)?;

        info!("opened shell session {} (shell={shell}, cwd={cwd})", id);
        self.sessions.insert(id.clone(), session);
        Ok(id)
    }

    /// Open a session, safety-check `command`, and run it. Returns the new
    /// session's id (left open for further `write_stdin` interaction) plus
    /// whatever output accumulated before the settle delay elapsed.
    ///
    /// # Errors
    ///
    /// `CommandBlocked` if the safety checker rejects `command`.
    pub async fn exec_command(
        &mut self,
        command: &str,
        shell: Option<&str>,
        cwd: Option<&str>,
    ) -> Result<(SessionId, String)> {
        safety::check_command(command)
            .map_err(|reason| TerminalError::CommandBlocked { reason })?;

        let id = self.create_session(shell, cwd).await?;
        self.write(&id, command).await?;
        self.write(&id, "\n").await?;
        sleep(POLL_SETTLE).await;
        let output = self.read(&id).await?;
        Ok((id, truncate::middle_trim(&output, truncate::MAX_OUTPUT_CHARS)))
    }

    /// Send `input` to the specified session's stdin.
    pub async fn write(&self, id: &SessionId, input: &str) -> Result<()> {
        let session = self.get_session(id)?;
        debug!("write {} bytes to session {id}", input.len());
        session.write(input)
    }

    /// Write `data` to an already-open session and return whatever output
    /// accumulates before the settle delay elapses — the poll pattern used
    /// for interacting with prompts (password entry, confirmation, etc.).
    pub async fn write_stdin(&self, id: &SessionId, data: &str) -> Result<String> {
        self.write(id, data).await?;
        sleep(POLL_SETTLE).await;
        let output = self.read(id).await?;
        Ok(truncate::middle_trim(&output, truncate::MAX_OUTPUT_CHARS))
    }

    /// Drain and return all buffered output from the session.
    pub async fn read(&self, id: &SessionId) -> Result<String> {
        let session = self.get_session(id)?;
        session.read()
    }

    /// Send a kill signal to the session's shell and remove it from the map.
    pub async fn close_shell(&mut self, id: &SessionId) -> Result<()> {
        let session = self.get_session(id)?;
        session.kill()?;
        self.sessions.remove(id);
        info!("closed shell session {id}");
        Ok(())
    }

    /// Forcibly close every open session. Called when the run that owns this
    /// manager terminates, so that no shell process survives past its run.
    pub async fn close_all(&mut self) {
        let ids: Vec<SessionId> = self.sessions.keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.close_shell(&id).await {
                warn!("failed to close session {id} during shutdown: {e}");
            }
        }
    }

    /// Return metadata snapshots for all tracked sessions.
    pub fn list(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|(id, s)| SessionInfo {
                id: id.clone(),
                shell: s.shell.clone(),
                cwd: s.cwd.clone(),
                created_at: s.created_at,
                is_alive: s.is_alive(),
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn get_session(&self, id: &SessionId) -> Result<&ShellSession> {
        self.sessions
            .get(id)
            .ok_or_else(|| TerminalError::SessionNotFound(id.to_string()))
    }
}

impl Default for TerminalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exec_command_runs_and_captures_output() {
        let mut mgr = TerminalManager::new();
        let (id, output) = mgr
            .exec_command("echo hello-agentlane", Some("/bin/sh"), None)
            .await
            .unwrap();
        assert!(mgr.list().iter().any(|s| s.id == id));
        assert!(output.contains("hello-agentlane"));
    }

    #[tokio::test]
    async fn exec_command_rejects_unsafe_command() {
        let mut mgr = TerminalManager::new();
        let err = mgr.exec_command("sudo rm -rf /", None, None).await.unwrap_err();
        assert!(matches!(err, TerminalError::CommandBlocked { .. }));
        assert!(mgr.list().is_empty());
    }

    #[tokio::test]
    async fn write_stdin_interacts_with_open_session() {
        let mut mgr = TerminalManager::new();
        let id = mgr.create_session(Some("/bin/sh"), None).await.unwrap();
        let output = mgr.write_stdin(&id, "echo ping\n").await.unwrap();
        assert!(output.contains("ping"));
    }

    #[tokio::test]
    async fn close_shell_removes_session() {
        let mut mgr = TerminalManager::new();
        let id = mgr.create_session(Some("/bin/sh"), None).await.unwrap();
        mgr.close_shell(&id).await.unwrap();
        assert!(mgr.list().is_empty());
        let err = mgr.write(&id, "echo x\n").await.unwrap_err();
        assert!(matches!(err, TerminalError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn close_all_clears_every_session() {
        let mut mgr = TerminalManager::new();
        mgr.create_session(Some("/bin/sh"), None).await.unwrap();
        mgr.create_session(Some("/bin/sh"), None).await.unwrap();
        assert_eq!(mgr.list().len(), 2);
        mgr.close_all().await;
        assert!(mgr.list().is_empty());
    }
}
