//! `LaneScheduler` — one FIFO worker per chatKey, up to `maxConcurrency`
//! lanes running at once. In-memory only: lane state does not survive a
//! process restart, by design (see DESIGN.md, Open Question 1).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agentlane_core::config::SchedulerConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::runner::{AgentRunner, Drainer};
use crate::types::{DrainedBatch, EnqueueOutcome, Lane, PendingMessage, SchedulerStats};

/// Drains up to `max_merged` pending messages out of one lane, concatenating
/// them into a single synthetic turn. Shared by the mid-run drain callback
/// (`AgentRunner::run`'s `drain` argument) and the post-run correction round.
struct LaneDrainer {
    lane: Arc<Mutex<Lane>>,
    max_merged: usize,
}

#[async_trait::async_trait]
impl Drainer for LaneDrainer {
    async fn drain_merged(&self) -> Option<DrainedBatch> {
        let mut lane = self.lane.lock().unwrap();
        if lane.pending.is_empty() {
            return None;
        }
        let take = self.max_merged.min(lane.pending.len());
        let batch: Vec<PendingMessage> = lane.pending.drain(..take).collect();
        drop(lane);

        let text = batch
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let last = batch.last().expect("take > 0 checked above");
        Some(DrainedBatch {
            drained: batch.len(),
            text,
            thread_id: last.thread_id.clone(),
            chat_type: last.chat_type.clone(),
            message_id: last.message_id.clone(),
        })
    }
}

struct LaneState {
    lane: Arc<Mutex<Lane>>,
    cancel: Mutex<Option<CancellationToken>>,
}

pub struct LaneScheduler {
    lanes: Mutex<HashMap<String, Arc<LaneState>>>,
    running: AtomicUsize,
    config: SchedulerConfig,
    runner: Arc<dyn AgentRunner>,
}

impl LaneScheduler {
    pub fn new(config: SchedulerConfig, runner: Arc<dyn AgentRunner>) -> Arc<Self> {
        Arc::new(Self {
            lanes: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            config,
            runner,
        })
    }

    fn lane_state(&self, chat_key: &str) -> Arc<LaneState> {
        let mut lanes = self.lanes.lock().unwrap();
        lanes
            .entry(chat_key.to_string())
            .or_insert_with(|| {
                Arc::new(LaneState {
                    lane: Arc::new(Mutex::new(Lane::default())),
                    cancel: Mutex::new(None),
                })
            })
            .clone()
    }

    #[instrument(skip(self, msg), fields(chat_key = %chat_key))]
    pub fn enqueue(self: &Arc<Self>, chat_key: &str, msg: PendingMessage) -> EnqueueOutcome {
        let state = self.lane_state(chat_key);
        let (lane_position, lane_pending, should_spawn) = {
            let mut lane = state.lane.lock().unwrap();
            lane.pending.push_back(msg);
            let lane_pending = lane.pending.len();
            let should_spawn = !lane.running && self.running.load(Ordering::SeqCst) < self.config.max_concurrency;
            if should_spawn {
                lane.running = true;
            }
            (lane_pending, lane_pending, should_spawn)
        };

        if should_spawn {
            self.running.fetch_add(1, Ordering::SeqCst);
            let scheduler = Arc::clone(self);
            let chat_key = chat_key.to_string();
            tokio::spawn(async move {
                scheduler.run_lane(chat_key, state).await;
            });
        }

        EnqueueOutcome {
            lane_position,
            lane_pending,
            pending_total: self.pending_total(),
        }
    }

    /// Drop a lane's cancellation token into effect, cancelling its active
    /// run cooperatively. Pending items are left untouched — use `clear_lane`
    /// to discard them too.
    pub fn cancel_lane(&self, chat_key: &str) {
        let lanes = self.lanes.lock().unwrap();
        if let Some(state) = lanes.get(chat_key) {
            if let Some(token) = state.cancel.lock().unwrap().as_ref() {
                token.cancel();
            }
        }
    }

    /// Discard every pending (not yet started) message in a lane.
    pub fn clear_lane(&self, chat_key: &str) {
        let lanes = self.lanes.lock().unwrap();
        if let Some(state) = lanes.get(chat_key) {
            state.lane.lock().unwrap().pending.clear();
        }
    }

    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::SeqCst) > 0
    }

    pub fn stats(&self) -> SchedulerStats {
        let lanes = self.lanes.lock().unwrap();
        SchedulerStats {
            lane_count: lanes.len(),
            running: self.running.load(Ordering::SeqCst),
            pending_total: lanes.values().map(|s| s.lane.lock().unwrap().pending.len()).sum(),
        }
    }

    fn pending_total(&self) -> usize {
        self.lanes
            .lock()
            .unwrap()
            .values()
            .map(|s| s.lane.lock().unwrap().pending.len())
            .sum()
    }

    async fn run_lane(self: Arc<Self>, chat_key: String, state: Arc<LaneState>) {
        let drainer = LaneDrainer {
            lane: Arc::clone(&state.lane),
            max_merged: self.config.correction_max_merged_messages,
        };

        loop {
            let head = { state.lane.lock().unwrap().pending.pop_front() };
            let Some(msg) = head else { break };

            let token = CancellationToken::new();
            *state.cancel.lock().unwrap() = Some(token.clone());

            if let Err(e) = self.runner.run(&chat_key, &msg.text, &drainer, token).await {
                warn!(%chat_key, error = %e, "lane run failed");
            }

            let should_correct = {
                let mut lane = state.lane.lock().unwrap();
                if self.config.enable_correction_merge
                    && lane.correction_round < self.config.correction_max_rounds
                    && !lane.pending.is_empty()
                {
                    lane.correction_round += 1;
                    true
                } else {
                    lane.correction_round = 0;
                    false
                }
            };

            if should_correct {
                if let Some(batch) = drainer.drain_merged().await {
                    let token = CancellationToken::new();
                    *state.cancel.lock().unwrap() = Some(token.clone());
                    if let Err(e) = self.runner.run(&chat_key, &batch.text, &drainer, token).await {
                        warn!(%chat_key, error = %e, "lane correction run failed");
                    }
                }
            }
        }

        *state.cancel.lock().unwrap() = None;
        { state.lane.lock().unwrap().running = false; }
        self.running.fetch_sub(1, Ordering::SeqCst);
        info!(%chat_key, "lane drained, worker exiting");

        self.wake_idle_lane();
    }

    fn wake_idle_lane(self: &Arc<Self>) {
        if self.running.load(Ordering::SeqCst) >= self.config.max_concurrency {
            return;
        }
        let candidate = {
            let lanes = self.lanes.lock().unwrap();
            lanes.iter().find_map(|(key, state)| {
                let mut lane = state.lane.lock().unwrap();
                if !lane.running && !lane.pending.is_empty() {
                    lane.running = true;
                    Some((key.clone(), Arc::clone(state)))
                } else {
                    None
                }
            })
        };
        if let Some((chat_key, state)) = candidate {
            self.running.fetch_add(1, Ordering::SeqCst);
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                scheduler.run_lane(chat_key, state).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::{Mutex as AsyncMutex, Notify};

    fn msg(text: &str) -> PendingMessage {
        PendingMessage {
            text: text.to_string(),
            thread_id: None,
            chat_type: None,
            message_id: None,
        }
    }

    /// Records every `run` invocation (in call order) and appends a
    /// `"user:{text}"` / `"asst:{text}"` pair to a shared transcript log,
    /// mirroring the real run loop's single append-per-run behavior.
    struct RecordingRunner {
        transcript: AsyncMutex<Vec<String>>,
        gate: Notify,
        release: AsyncMutex<bool>,
    }

    impl RecordingRunner {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                transcript: AsyncMutex::new(Vec::new()),
                gate: Notify::new(),
                release: AsyncMutex::new(true),
            })
        }
    }

    #[async_trait::async_trait]
    impl AgentRunner for RecordingRunner {
        async fn run(
            &self,
            _chat_key: &str,
            text: &str,
            _drain: &dyn Drainer,
            _cancel: CancellationToken,
        ) -> agentlane_core::Result<()> {
            self.transcript.lock().await.push(format!("user:{text}"));
            if !*self.release.lock().await {
                self.gate.notified().await;
            }
            self.transcript.lock().await.push(format!("asst:{text}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn s1_serializes_within_a_chat_key() {
        let runner = RecordingRunner::new();
        let scheduler = LaneScheduler::new(
            SchedulerConfig {
                max_concurrency: 4,
                ..Default::default()
            },
            runner.clone(),
        );

        scheduler.enqueue("telegram-chat-42", msg("A"));
        scheduler.enqueue("telegram-chat-42", msg("B"));

        for _ in 0..50 {
            if !scheduler.is_busy() && scheduler.stats().pending_total == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let log = runner.transcript.lock().await.clone();
        assert_eq!(log, vec!["user:A", "asst:A", "user:B", "asst:B"]);
    }

    #[tokio::test]
    async fn s2_correction_merge_folds_pending_into_one_turn() {
        let runner = RecordingRunner::new();
        *runner.release.lock().await = false;

        let scheduler = LaneScheduler::new(
            SchedulerConfig {
                max_concurrency: 4,
                enable_correction_merge: true,
                correction_max_rounds: 2,
                correction_max_merged_messages: 5,
            },
            runner.clone(),
        );

        scheduler.enqueue("telegram-chat-9", msg("plan a trip"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        scheduler.enqueue("telegram-chat-9", msg("actually make it 2 days"));
        scheduler.enqueue("telegram-chat-9", msg("budget 500"));

        *runner.release.lock().await = true;
        runner.gate.notify_one();

        for _ in 0..50 {
            if !scheduler.is_busy() && scheduler.stats().pending_total == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let log = runner.transcript.lock().await.clone();
        assert_eq!(
            log,
            vec![
                "user:plan a trip",
                "asst:plan a trip",
                "user:actually make it 2 days\n---\nbudget 500",
                "asst:actually make it 2 days\n---\nbudget 500",
            ]
        );
    }

    #[tokio::test]
    async fn enqueue_into_empty_lane_with_zero_concurrency_starts_no_worker() {
        let runner = RecordingRunner::new();
        let scheduler = LaneScheduler::new(
            SchedulerConfig {
                max_concurrency: 0,
                ..Default::default()
            },
            runner.clone(),
        );
        scheduler.enqueue("telegram-chat-1", msg("hello"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runner.transcript.lock().await.is_empty());
        assert_eq!(scheduler.stats().pending_total, 1);
    }
}
