//! Wires C1–C8 together behind `RuntimeConfig` (SPEC_FULL §10.5). Not a
//! production server loop: real platform polling is out of scope (§1), so
//! `main` only offers a one-shot `run-once` CLI useful for local testing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use agentlane_agent::{Agent, DenyApprovalHook, HttpProvider, NoopMaintenanceHook, ProviderRegistry};
use agentlane_channels::EgressRegistry;
use agentlane_context::{ContextManager, EnqueueParams};
use agentlane_core::RuntimeConfig;
use agentlane_router::ChatKeyRouter;

mod providers;

#[derive(Parser)]
#[command(name = "agentlane-daemon")]
struct Cli {
    /// Path to an `agentlane.toml`; falls back to the default search path.
    #[arg(long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue one turn, wait for the lane to drain, print the reply.
    RunOnce {
        #[arg(long)]
        chat_key: String,
        #[arg(long)]
        text: String,
        #[arg(long)]
        thread_id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = RuntimeConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({}), using defaults", e);
        RuntimeConfig::default()
    });
    let root_dir = PathBuf::from(&config.root_dir);

    let egress = Arc::new(EgressRegistry::new());
    let router = Arc::new(ChatKeyRouter::new(egress));

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let base_url = std::env::var("OPENAI_BASE_URL").ok();
    let provider = Arc::new(HttpProvider::new(api_key, base_url));

    let providers = Arc::new(ProviderRegistry::new());
    providers.register(Arc::new(providers::IdentityProvider));
    providers.register(Arc::new(providers::WorkspaceRootProvider));

    let tools: Vec<Box<dyn agentlane_agent::Tool>> = vec![
        Box::new(agentlane_agent::tools::shell::ExecCommandTool),
        Box::new(agentlane_agent::tools::shell::WriteStdinTool),
        Box::new(agentlane_agent::tools::shell::CloseShellTool),
        Box::new(agentlane_agent::tools::skill::SkillLoadTool),
        Box::new(agentlane_agent::tools::chat::ChatSendTool),
        Box::new(agentlane_agent::tools::chat::ChatContactSendTool),
    ];

    let agent = Arc::new(Agent {
        provider,
        tools,
        providers,
        router,
        root_dir: root_dir.clone(),
        run_config: config.run.clone(),
        maintenance: Arc::new(NoopMaintenanceHook),
        approval: Arc::new(DenyApprovalHook),
    });

    let ctx = ContextManager::new(root_dir, agent, config.scheduler.clone());

    match cli.command {
        Command::RunOnce { chat_key, text, thread_id } => {
            ctx.enqueue(EnqueueParams { chat_key: chat_key.clone(), text, thread_id, ..Default::default() })
                .await?;

            while ctx.is_busy() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            let store = ctx.get_history_store(&chat_key)?;
            let loaded = store.load_all()?;
            match loaded.messages.iter().rev().find(|m| m.role == agentlane_core::Role::Assistant) {
                Some(msg) => println!("{}", msg.text_content()),
                None => info!("run finished with no assistant reply"),
            }
        }
    }

    Ok(())
}
