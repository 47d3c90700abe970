//! The couple of System-Prompt Providers the daemon registers at startup
//! (SPEC_FULL §10.5). Neither constrains `activeTools` or loads skills —
//! they only contribute messages, same as the teacher's lowest-friction
//! hooks.

use async_trait::async_trait;

use agentlane_agent::{ProviderOutput, ProviderOutputError, RunContext, SystemPromptProvider};

/// Announces the agent's role. Runs first (`order` below the 1000 default)
/// so its message appears ahead of anything workspace-specific.
pub struct IdentityProvider;

#[async_trait]
impl SystemPromptProvider for IdentityProvider {
    fn id(&self) -> &str {
        "identity"
    }

    fn order(&self) -> i64 {
        100
    }

    async fn provide(&self, _ctx: &RunContext) -> Result<ProviderOutput, ProviderOutputError> {
        Ok(ProviderOutput {
            messages: vec!["You are Agentlane, an assistant with shell and chat tools available.".to_string()],
            active_tools: None,
            loaded_skills: vec![],
        })
    }
}

/// Tells the model where it's running, so `exec_command` calls can use
/// sensible relative paths.
pub struct WorkspaceRootProvider;

#[async_trait]
impl SystemPromptProvider for WorkspaceRootProvider {
    fn id(&self) -> &str {
        "workspace-root"
    }

    async fn provide(&self, ctx: &RunContext) -> Result<ProviderOutput, ProviderOutputError> {
        Ok(ProviderOutput {
            messages: vec![format!("Workspace root: {}", ctx.root_dir.display())],
            active_tools: None,
            loaded_skills: vec![],
        })
    }
}
