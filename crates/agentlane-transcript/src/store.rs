use crate::atomic::write_atomic;
use crate::error::{Result, TranscriptError};
use crate::path::{
    archive_dir_in, archive_path_in, history_path_in, meta_path_in, messages_dir, task_run_messages_dir,
};
use crate::types::{CompactionOutcome, LoadedMessages};
use agentlane_core::{
    new_message_id, ChatKey, Message, MessageKind, MessageMetadata, MessagePart, MessageSource, MessagesMeta,
    Role, SourceRange,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Where a store's files live: either the usual chatKey-derived layout, or
/// the isolated `task-run:<taskId>:<timestamp>` audit path (SPEC_FULL §4.8).
/// Task runs have no platform to reply to, so they never round-trip through
/// `ChatKey` — they carry their own id pair instead.
enum StoreLocation {
    Chat(ChatKey),
    TaskRun { task_id: String, timestamp: String },
}

impl StoreLocation {
    fn key_string(&self) -> String {
        match self {
            StoreLocation::Chat(key) => key.as_str().to_string(),
            StoreLocation::TaskRun { task_id, timestamp } => format!("task-run:{task_id}:{timestamp}"),
        }
    }
}

/// Owns the on-disk JSONL transcript and `meta.json` sidecar for exactly one
/// chat key (or task run). A per-store async mutex serializes
/// `append`/`compact` so history.jsonl append order always matches real-time
/// arrival order.
pub struct TranscriptStore {
    root: PathBuf,
    location: StoreLocation,
    write_lock: Arc<Mutex<()>>,
}

impl TranscriptStore {
    pub fn new(root: impl Into<PathBuf>, chat_key: ChatKey) -> Self {
        TranscriptStore { root: root.into(), location: StoreLocation::Chat(chat_key), write_lock: Arc::new(Mutex::new(())) }
    }

    /// Isolated audit log for one task execution; see `StoreLocation::TaskRun`.
    pub fn new_task_run(root: impl Into<PathBuf>, task_id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        TranscriptStore {
            root: root.into(),
            location: StoreLocation::TaskRun { task_id: task_id.into(), timestamp: timestamp.into() },
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn chat_key(&self) -> Option<&ChatKey> {
        match &self.location {
            StoreLocation::Chat(key) => Some(key),
            StoreLocation::TaskRun { .. } => None,
        }
    }

    fn dir(&self) -> PathBuf {
        match &self.location {
            StoreLocation::Chat(key) => messages_dir(&self.root, key),
            StoreLocation::TaskRun { task_id, timestamp } => task_run_messages_dir(&self.root, task_id, timestamp),
        }
    }

    fn history_path(&self) -> PathBuf {
        history_path_in(&self.dir())
    }

    fn meta_path(&self) -> PathBuf {
        meta_path_in(&self.dir())
    }

    pub fn create_user_text_message(
        &self,
        text: impl Into<String>,
        now_ms: i64,
        actor_id: Option<String>,
        actor_name: Option<String>,
        message_id: Option<String>,
        thread_id: Option<String>,
        request_id: Option<String>,
    ) -> Message {
        match &self.location {
            StoreLocation::Chat(key) => Message::new_user_text(
                key,
                text,
                now_ms,
                actor_id,
                actor_name,
                message_id,
                thread_id,
                request_id,
            ),
            StoreLocation::TaskRun { task_id, .. } => Message {
                id: new_message_id(),
                role: Role::User,
                parts: vec![MessagePart::text(text)],
                metadata: MessageMetadata {
                    v: 1,
                    ts: now_ms,
                    chat_key: self.location.key_string(),
                    channel: "task-run".to_string(),
                    target_id: task_id.clone(),
                    actor_id,
                    actor_name,
                    message_id,
                    thread_id,
                    target_type: None,
                    request_id,
                    kind: MessageKind::Normal,
                    source: MessageSource::Ingress,
                    source_range: None,
                    truncated: false,
                },
            },
        }
    }

    pub fn create_assistant_text_message(
        &self,
        parts: Vec<MessagePart>,
        now_ms: i64,
        request_id: Option<String>,
    ) -> Message {
        match &self.location {
            StoreLocation::Chat(key) => Message::new_assistant_text(key, parts, now_ms, request_id),
            StoreLocation::TaskRun { task_id, .. } => Message {
                id: new_message_id(),
                role: Role::Assistant,
                parts,
                metadata: MessageMetadata {
                    v: 1,
                    ts: now_ms,
                    chat_key: self.location.key_string(),
                    channel: "task-run".to_string(),
                    target_id: task_id.clone(),
                    actor_id: None,
                    actor_name: None,
                    message_id: None,
                    thread_id: None,
                    target_type: None,
                    request_id,
                    kind: MessageKind::Normal,
                    source: MessageSource::Egress,
                    source_range: None,
                    truncated: false,
                },
            },
        }
    }

    #[instrument(skip(self, msg), fields(chat_key = %self.location.key_string()))]
    pub async fn append(&self, msg: &Message) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        std::fs::create_dir_all(self.dir())?;
        let line = serde_json::to_string(msg)?;
        append_line(&self.history_path(), &line)?;
        let mut meta = self.load_meta_locked()?;
        meta.cached_total += 1;
        self.save_meta_locked(&meta)?;
        Ok(())
    }

    #[instrument(skip(self), fields(chat_key = %self.location.key_string()))]
    pub fn load_all(&self) -> Result<LoadedMessages> {
        self.load_range_from_lines(0, usize::MAX)
    }

    pub fn load_range(&self, start: usize, end: usize) -> Result<LoadedMessages> {
        self.load_range_from_lines(start, end)
    }

    fn load_range_from_lines(&self, start: usize, end: usize) -> Result<LoadedMessages> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(LoadedMessages { messages: Vec::new(), skipped_malformed: 0 });
        }
        let contents = std::fs::read_to_string(&path)?;
        let mut messages = Vec::new();
        let mut skipped = 0usize;
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if idx < start {
                continue;
            }
            if idx >= end {
                break;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!(chat_key = %self.location.key_string(), line = idx, error = %e, "skipping malformed transcript line");
                    skipped += 1;
                }
            }
        }
        Ok(LoadedMessages { messages, skipped_malformed: skipped })
    }

    /// O(1) via the cached counter in `meta.json`; recomputed if it
    /// disagrees with the actual line count (e.g. after manual edits).
    pub fn total_message_count(&self) -> Result<usize> {
        let meta = self.load_meta_locked()?;
        let actual = self.count_lines()?;
        if meta.cached_total != actual {
            let mut fixed = meta;
            fixed.cached_total = actual;
            self.save_meta_locked(&fixed)?;
            return Ok(actual);
        }
        Ok(meta.cached_total)
    }

    fn count_lines(&self) -> Result<usize> {
        let path = self.history_path();
        if !path.exists() {
            return Ok(0);
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(contents.lines().filter(|l| !l.trim().is_empty()).count())
    }

    pub fn load_meta(&self) -> Result<MessagesMeta> {
        self.load_meta_locked()
    }

    fn load_meta_locked(&self) -> Result<MessagesMeta> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(match &self.location {
                StoreLocation::Chat(key) => MessagesMeta::new(key, 30, 16_000),
                StoreLocation::TaskRun { .. } => MessagesMeta {
                    v: 1,
                    chat_key: self.location.key_string(),
                    pinned_skill_ids: Default::default(),
                    last_archive_id: None,
                    keep_last_messages: 30,
                    max_input_tokens_approx: 16_000,
                    cached_total: 0,
                },
            });
        }
        let contents = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_meta_locked(&self, meta: &MessagesMeta) -> Result<()> {
        std::fs::create_dir_all(self.dir())?;
        let json = serde_json::to_string_pretty(meta)?;
        write_atomic(&self.meta_path(), json.as_bytes())?;
        Ok(())
    }

    #[instrument(skip(self, ids), fields(chat_key = %self.location.key_string()))]
    pub async fn set_pinned_skill_ids(&self, ids: std::collections::BTreeSet<String>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut meta = self.load_meta_locked()?;
        meta.pinned_skill_ids = ids;
        self.save_meta_locked(&meta)
    }

    /// Folds the oldest prefix beyond `keep_tail` into one summary message.
    /// A no-op (returns `CompactionOutcome::noop`) when there is nothing new
    /// to archive beyond what a previous compaction already folded — this is
    /// what makes `compact; compact` idempotent.
    #[instrument(skip(self), fields(chat_key = %self.location.key_string()))]
    pub async fn compact(&self, keep_tail: usize, target_tokens: usize) -> Result<CompactionOutcome> {
        let _guard = self.write_lock.lock().await;
        let loaded = self.load_range_from_lines(0, usize::MAX)?;
        let all = loaded.messages;
        let total = all.len();
        if total <= keep_tail {
            return Ok(CompactionOutcome::noop(total));
        }
        let archive_count = total - keep_tail;
        let to_archive = &all[..archive_count];
        if to_archive.len() == 1 && to_archive[0].metadata.kind == MessageKind::Summary {
            return Ok(CompactionOutcome::noop(total));
        }

        let from_id = to_archive[0]
            .metadata
            .source_range
            .as_ref()
            .map(|sr| sr.from_id.clone())
            .unwrap_or_else(|| to_archive[0].id.clone());
        let to_id = to_archive.last().unwrap().id.clone();
        let count: usize = to_archive
            .iter()
            .map(|m| m.metadata.source_range.as_ref().map(|sr| sr.count).unwrap_or(1))
            .sum();

        let budget_chars = target_tokens.saturating_mul(APPROX_CHARS_PER_TOKEN);
        let summary_text = fold_summary_text(to_archive, budget_chars);
        let archive_id = new_message_id();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let range = SourceRange { from_id, to_id, count };
        let summary = match &self.location {
            StoreLocation::Chat(key) => Message::new_summary(key, summary_text, now_ms, range),
            StoreLocation::TaskRun { task_id, .. } => Message {
                id: new_message_id(),
                role: Role::Assistant,
                parts: vec![MessagePart::text(summary_text)],
                metadata: MessageMetadata {
                    v: 1,
                    ts: now_ms,
                    chat_key: self.location.key_string(),
                    channel: "task-run".to_string(),
                    target_id: task_id.clone(),
                    actor_id: None,
                    actor_name: None,
                    message_id: None,
                    thread_id: None,
                    target_type: None,
                    request_id: None,
                    kind: MessageKind::Summary,
                    source: MessageSource::Compact,
                    source_range: Some(range),
                    truncated: false,
                },
            },
        };

        let archive_lines: String = to_archive
            .iter()
            .map(|m| serde_json::to_string(m).map(|s| format!("{s}\n")))
            .collect::<std::result::Result<String, _>>()?;
        std::fs::create_dir_all(archive_dir_in(&self.dir()))?;
        write_atomic(&archive_path_in(&self.dir(), &archive_id), archive_lines.as_bytes())?;

        let mut new_history = String::new();
        new_history.push_str(&serde_json::to_string(&summary)?);
        new_history.push('\n');
        for m in &all[archive_count..] {
            new_history.push_str(&serde_json::to_string(m)?);
            new_history.push('\n');
        }
        write_atomic(&self.history_path(), new_history.as_bytes())?;

        let total_after = 1 + (total - archive_count);
        let mut meta = self.load_meta_locked()?;
        meta.last_archive_id = Some(archive_id.clone());
        meta.cached_total = total_after;
        self.save_meta_locked(&meta)?;

        Ok(CompactionOutcome {
            compacted: true,
            archive_id: Some(archive_id),
            archived_count: archive_count,
            total_after,
        })
    }
}

fn fold_summary_text(messages: &[Message], budget_chars: usize) -> String {
    let mut out = String::new();
    for m in messages {
        let line = format!("[{}] {}", m.role, m.text_content());
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&line);
    }
    if budget_chars > 0 && out.chars().count() > budget_chars {
        let truncated: String = out.chars().take(budget_chars).collect();
        format!("{truncated}\n…(truncated)")
    } else {
        out
    }
}

fn append_line(path: &std::path::Path, line: &str) -> Result<()> {
    use std::fs::OpenOptions;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentlane_core::Channel;
    use tempfile::TempDir;

    fn store() -> (TempDir, TranscriptStore) {
        let dir = TempDir::new().unwrap();
        let key = ChatKey::new(Channel::Telegram, "1", None, None).unwrap();
        let store = TranscriptStore::new(dir.path(), key);
        (dir, store)
    }

    #[tokio::test]
    async fn append_then_load_all_round_trips() {
        let (_d, store) = store();
        let msg = store.create_user_text_message("hi", 0, None, None, None, None, None);
        store.append(&msg).await.unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].text_content(), "hi");
        assert_eq!(loaded.skipped_malformed, 0);
    }

    #[tokio::test]
    async fn total_message_count_matches_appended_messages() {
        let (_d, store) = store();
        for i in 0..5 {
            let msg = store.create_user_text_message(format!("m{i}"), 0, None, None, None, None, None);
            store.append(&msg).await.unwrap();
        }
        assert_eq!(store.total_message_count().unwrap(), 5);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let (_d, store) = store();
        let msg = store.create_user_text_message("ok", 0, None, None, None, None, None);
        store.append(&msg).await.unwrap();
        std::fs::create_dir_all(store.dir()).unwrap();
        let mut f = std::fs::OpenOptions::new().append(true).open(store.history_path()).unwrap();
        use std::io::Write as _;
        writeln!(f, "{{not valid json").unwrap();
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.skipped_malformed, 1);
    }

    #[tokio::test]
    async fn compaction_scenario_s5() {
        let (_d, store) = store();
        for i in 0..10 {
            let msg = store.create_user_text_message(format!("m{i}"), i as i64, None, None, None, None, None);
            store.append(&msg).await.unwrap();
        }
        let outcome = store.compact(4, 16_000).await.unwrap();
        assert!(outcome.compacted);
        assert_eq!(outcome.archived_count, 6);
        assert_eq!(outcome.total_after, 5);
        assert_eq!(store.total_message_count().unwrap(), 5);

        let archive_id = outcome.archive_id.unwrap();
        let archive_contents = std::fs::read_to_string(archive_path_in(&store.dir(), &archive_id)).unwrap();
        assert_eq!(archive_contents.lines().count(), 6);
    }

    #[tokio::test]
    async fn task_run_store_isolates_its_directory_and_metadata() {
        let dir = TempDir::new().unwrap();
        let store = TranscriptStore::new_task_run(dir.path(), "build-42", "1710000000");
        let msg = store.create_user_text_message("go", 0, None, None, None, None, None);
        assert_eq!(msg.metadata.chat_key, "task-run:build-42:1710000000");
        store.append(&msg).await.unwrap();

        assert!(dir.path().join(".ship").join("task").join("build-42").join("1710000000").join("history.jsonl").exists());
        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(loaded.messages[0].text_content(), "go");
        assert!(store.chat_key().is_none());
    }

    #[tokio::test]
    async fn compaction_is_idempotent() {
        let (_d, store) = store();
        for i in 0..10 {
            let msg = store.create_user_text_message(format!("m{i}"), i as i64, None, None, None, None, None);
            store.append(&msg).await.unwrap();
        }
        let first = store.compact(4, 16_000).await.unwrap();
        assert!(first.compacted);
        let second = store.compact(4, 16_000).await.unwrap();
        assert!(!second.compacted);
        assert_eq!(second.total_after, first.total_after);
    }

    #[tokio::test]
    async fn set_pinned_skill_ids_persists_to_meta() {
        let (_d, store) = store();
        let mut ids = std::collections::BTreeSet::new();
        ids.insert("skill-a".to_string());
        store.set_pinned_skill_ids(ids.clone()).await.unwrap();
        let meta = store.load_meta().unwrap();
        assert_eq!(meta.pinned_skill_ids, ids);
    }
}
