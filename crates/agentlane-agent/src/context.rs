//! Explicit per-run context threaded through the run loop and passed to
//! every tool invocation — the systems-language replacement for the
//! teacher's ambient async-local request context (SPEC_FULL §9: "Per-run
//! async-local context").

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use agentlane_core::{ChatKey, RequestId, SkillRecord};
use agentlane_router::ChatKeyRouter;
use agentlane_terminal::TerminalManager;
use agentlane_transcript::TranscriptStore;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

/// Everything a tool or system-prompt provider needs about the run it's
/// executing inside, built once per dequeued lane turn and dropped when the
/// run finalizes.
pub struct RunContext {
    pub chat_key: ChatKey,
    pub request_id: RequestId,
    pub root_dir: PathBuf,
    pub router: Arc<ChatKeyRouter>,
    pub store: Arc<TranscriptStore>,
    /// Owned by this run; forcibly closed when the run ends (SPEC_FULL §4.5,
    /// §8 invariant 5: cancellation never leaves a shell session open).
    pub terminal: AsyncMutex<TerminalManager>,
    pub cancel: CancellationToken,
    pub max_chat_send_per_run: u32,

    loaded_skills: std::sync::Mutex<BTreeMap<String, SkillRecord>>,
    chat_send_state: std::sync::Mutex<ChatSendState>,
}

#[derive(Default)]
struct ChatSendState {
    calls: u32,
    fingerprints: HashSet<String>,
}

impl RunContext {
    pub fn new(
        chat_key: ChatKey,
        root_dir: PathBuf,
        router: Arc<ChatKeyRouter>,
        store: Arc<TranscriptStore>,
        max_chat_send_per_run: u32,
    ) -> Self {
        Self {
            chat_key,
            request_id: RequestId::new(),
            root_dir,
            router,
            store,
            terminal: AsyncMutex::new(TerminalManager::new()),
            cancel: CancellationToken::new(),
            max_chat_send_per_run,
            loaded_skills: std::sync::Mutex::new(BTreeMap::new()),
            chat_send_state: std::sync::Mutex::new(ChatSendState::default()),
        }
    }

    #[cfg(test)]
    pub fn new_for_test(chat_key: ChatKey) -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        // Leak the tempdir for the lifetime of the test context; tests are
        // short-lived processes and this keeps the signature simple.
        std::mem::forget(dir);
        let registry = Arc::new(agentlane_channels::EgressRegistry::new());
        let router = Arc::new(ChatKeyRouter::new(registry));
        let store = Arc::new(TranscriptStore::new(&root, chat_key.clone()));
        Self::new(chat_key, root, router, store, 3)
    }

    pub fn add_loaded_skill(&self, skill: SkillRecord) {
        self.loaded_skills.lock().unwrap().insert(skill.id.clone(), skill);
    }

    pub fn loaded_skills(&self) -> Vec<SkillRecord> {
        self.loaded_skills.lock().unwrap().values().cloned().collect()
    }

    /// Returns `true` the first `max_chat_send_per_run` times a distinct
    /// `(text)` fingerprint is seen; `false` once the budget or the
    /// dedupe set rejects the call (SPEC_FULL §4.5, §8 invariant 6).
    pub fn try_reserve_chat_send(&self, fingerprint: &str) -> bool {
        let mut state = self.chat_send_state.lock().unwrap();
        if state.fingerprints.contains(fingerprint) {
            return false;
        }
        if state.calls >= self.max_chat_send_per_run {
            return false;
        }
        state.calls += 1;
        state.fingerprints.insert(fingerprint.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlane_core::Channel;

    fn key() -> ChatKey {
        ChatKey::new(Channel::Telegram, "1", None, None).unwrap()
    }

    #[test]
    fn chat_send_budget_rejects_past_the_limit() {
        let ctx = RunContext::new_for_test(key());
        assert!(ctx.try_reserve_chat_send("a"));
        assert!(ctx.try_reserve_chat_send("b"));
        assert!(ctx.try_reserve_chat_send("c"));
        assert!(!ctx.try_reserve_chat_send("d"));
    }

    #[test]
    fn chat_send_dedupes_identical_fingerprint_within_budget() {
        let ctx = RunContext::new_for_test(key());
        assert!(ctx.try_reserve_chat_send("same"));
        assert!(!ctx.try_reserve_chat_send("same"));
    }
}
