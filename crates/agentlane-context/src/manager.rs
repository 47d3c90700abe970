//! The Context Manager (SPEC_FULL §4.8): the single entry point platform
//! adapters call into. Owns the chatKey → `TranscriptStore` cache and the
//! one shared `Agent`, and is the thing that persists an inbound turn before
//! handing it to the Lane Scheduler.
//!
//! Grounded on the teacher's own top-level request-entry-point module: one
//! façade object a platform listener calls `enqueue` on, with lazily-built,
//! cached per-chat resources underneath.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use agentlane_agent::Agent;
use agentlane_core::ChatKey;
use agentlane_scheduler::{AgentRunner, EnqueueOutcome, LaneScheduler, PendingMessage, SchedulerStats};
use agentlane_transcript::TranscriptStore;
use tracing::warn;

use crate::error::{ContextError, Result};

/// Parameters for `ContextManager::enqueue` / `append_user_message`.
#[derive(Debug, Clone, Default)]
pub struct EnqueueParams {
    pub chat_key: String,
    pub text: String,
    pub actor_id: Option<String>,
    pub actor_name: Option<String>,
    pub message_id: Option<String>,
    pub thread_id: Option<String>,
    pub request_id: Option<String>,
    pub chat_type: Option<String>,
}

/// Owns the cached `TranscriptStore`s and the single shared `Agent` behind
/// one `LaneScheduler`.
///
/// SPEC_FULL's `getAgent(chatKey)` implies one agent instance per chat key;
/// this kernel's `Agent` (unlike the teacher's) carries no chat-key-specific
/// state — it builds its own `TranscriptStore` and `RunContext` fresh inside
/// `run()` from the chatKey it's handed — so `get_agent` returns the same
/// shared instance for every chat key rather than maintaining a per-key
/// cache. `clear_agent` is consequently a documented no-op.
pub struct ContextManager {
    root_dir: PathBuf,
    agent: Arc<Agent>,
    scheduler: Arc<LaneScheduler>,
    stores: Mutex<HashMap<String, Arc<TranscriptStore>>>,
}

impl ContextManager {
    pub fn new(root_dir: PathBuf, agent: Arc<Agent>, scheduler_config: agentlane_core::config::SchedulerConfig) -> Self {
        let scheduler = LaneScheduler::new(scheduler_config, agent.clone() as Arc<dyn AgentRunner>);
        Self { root_dir, agent, scheduler, stores: Mutex::new(HashMap::new()) }
    }

    /// Returns the shared agent. The `chat_key` argument exists to match
    /// SPEC_FULL's named operation; see the no-per-key-cache note above.
    pub fn get_agent(&self, _chat_key: &str) -> Arc<Agent> {
        self.agent.clone()
    }

    pub fn get_history_store(&self, chat_key: &str) -> Result<Arc<TranscriptStore>> {
        let mut stores = self.stores.lock().unwrap();
        if let Some(store) = stores.get(chat_key) {
            return Ok(store.clone());
        }

        let store = if let Some((task_id, timestamp)) = agentlane_transcript::path::is_task_run_key(chat_key) {
            Arc::new(TranscriptStore::new_task_run(&self.root_dir, task_id, timestamp))
        } else {
            let key = ChatKey::parse(chat_key).map_err(|e| ContextError::BadChatKey(e.0))?;
            Arc::new(TranscriptStore::new(&self.root_dir, key))
        };
        stores.insert(chat_key.to_string(), store.clone());
        Ok(store)
    }

    /// Persists the inbound turn with its reply-thread metadata, then fires
    /// the maintenance hook detached — its failure must never fail the
    /// enqueue (SPEC_FULL §4.9).
    pub async fn append_user_message(&self, params: &EnqueueParams) -> Result<()> {
        let store = self.get_history_store(&params.chat_key)?;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let msg = store.create_user_text_message(
            params.text.clone(),
            now_ms,
            params.actor_id.clone(),
            params.actor_name.clone(),
            params.message_id.clone(),
            params.thread_id.clone(),
            params.request_id.clone(),
        );
        store.append(&msg).await?;

        let chat_key = params.chat_key.clone();
        let store_for_hook = store.clone();
        let maintenance = self.agent.maintenance.clone();
        tokio::spawn(async move {
            maintenance.on_write(&chat_key, store_for_hook).await;
        });

        Ok(())
    }

    pub async fn enqueue(&self, params: EnqueueParams) -> Result<EnqueueOutcome> {
        self.append_user_message(&params).await?;
        Ok(self.scheduler.enqueue(
            &params.chat_key,
            PendingMessage {
                text: params.text,
                thread_id: params.thread_id,
                chat_type: params.chat_type,
                message_id: params.message_id,
            },
        ))
    }

    /// No-op: see the struct-level note. Kept so the Context Manager's API
    /// surface matches SPEC_FULL §4.8.
    pub fn clear_agent(&self, _chat_key: Option<&str>) {
        warn!("clear_agent called; this kernel's Agent is a stateless singleton, nothing to drop");
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.stats()
    }
}
