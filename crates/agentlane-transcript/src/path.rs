use agentlane_core::ChatKey;
use std::path::{Path, PathBuf};

/// `<root>/.ship/context/<encodedChatKey>/messages/`
pub fn messages_dir(root: &Path, chat_key: &ChatKey) -> PathBuf {
    root.join(".ship").join("context").join(chat_key.encoded()).join("messages")
}

pub fn history_path(root: &Path, chat_key: &ChatKey) -> PathBuf {
    history_path_in(&messages_dir(root, chat_key))
}

pub fn meta_path(root: &Path, chat_key: &ChatKey) -> PathBuf {
    meta_path_in(&messages_dir(root, chat_key))
}

pub fn archive_dir(root: &Path, chat_key: &ChatKey) -> PathBuf {
    archive_dir_in(&messages_dir(root, chat_key))
}

pub fn archive_path(root: &Path, chat_key: &ChatKey, archive_id: &str) -> PathBuf {
    archive_path_in(&messages_dir(root, chat_key), archive_id)
}

/// Same four layouts, but rooted at a directory already resolved by the
/// caller — the piece a `task-run` store shares with a chatKey-backed one.
pub fn history_path_in(messages_dir: &Path) -> PathBuf {
    messages_dir.join("history.jsonl")
}

pub fn meta_path_in(messages_dir: &Path) -> PathBuf {
    messages_dir.join("meta.json")
}

pub fn archive_dir_in(messages_dir: &Path) -> PathBuf {
    messages_dir.join("archive")
}

pub fn archive_path_in(messages_dir: &Path, archive_id: &str) -> PathBuf {
    archive_dir_in(messages_dir).join(format!("{archive_id}.jsonl"))
}

/// `task-run:<taskId>:<timestamp>` keeps an isolated audit trail under
/// `.ship/task/<taskId>/<timestamp>/` instead of `.ship/context/<chatKey>/`.
/// This is recognized purely as a string prefix — it never round-trips
/// through `ChatKey::parse` since task runs have no platform to reply to.
pub fn task_run_messages_dir(root: &Path, task_id: &str, timestamp: &str) -> PathBuf {
    root.join(".ship").join("task").join(task_id).join(timestamp)
}

pub fn is_task_run_key(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("task-run:")?;
    let (task_id, timestamp) = rest.split_once(':')?;
    if task_id.is_empty() || timestamp.is_empty() {
        return None;
    }
    Some((task_id.to_string(), timestamp.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_run_key_parses_id_and_timestamp() {
        let (id, ts) = is_task_run_key("task-run:build-42:1710000000").unwrap();
        assert_eq!(id, "build-42");
        assert_eq!(ts, "1710000000");
    }

    #[test]
    fn non_task_run_key_returns_none() {
        assert!(is_task_run_key("telegram-chat-1").is_none());
    }
}
