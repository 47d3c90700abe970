//! Lane state: one FIFO queue of pending user turns per chatKey.

use std::collections::VecDeque;

/// A user turn waiting to be processed by its lane's worker.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub text: String,
    pub thread_id: Option<String>,
    pub chat_type: Option<String>,
    pub message_id: Option<String>,
}

/// One chatKey's FIFO queue plus its correction-merge state.
#[derive(Debug, Default)]
pub struct Lane {
    pub pending: VecDeque<PendingMessage>,
    pub running: bool,
    pub correction_round: u32,
}

/// Result of a successful `enqueue` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub lane_position: usize,
    pub lane_pending: usize,
    pub pending_total: usize,
}

/// A batch of pending messages drained and merged into one synthetic turn.
#[derive(Debug, Clone)]
pub struct DrainedBatch {
    pub drained: usize,
    pub text: String,
    pub thread_id: Option<String>,
    pub chat_type: Option<String>,
    pub message_id: Option<String>,
}

/// Observability snapshot returned by `LaneScheduler::stats`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub lane_count: usize,
    pub running: usize,
    pub pending_total: usize,
}
