use agentlane_core::Message;

/// Result of a `compact` call. `compacted=false` means the store was already
/// within budget and nothing was rewritten (idempotent no-op).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionOutcome {
    pub compacted: bool,
    pub archive_id: Option<String>,
    pub archived_count: usize,
    pub total_after: usize,
}

impl CompactionOutcome {
    pub fn noop(total: usize) -> Self {
        CompactionOutcome { compacted: false, archive_id: None, archived_count: 0, total_after: total }
    }
}

/// A loaded window of history plus whether any lines were skipped because
/// they failed to parse as a `Message`.
#[derive(Debug, Clone)]
pub struct LoadedMessages {
    pub messages: Vec<Message>,
    pub skipped_malformed: usize,
}
