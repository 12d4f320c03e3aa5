//! Podcast job finite state machine trait.
//!
//! Adapted from the conversation FSM contract this workspace used to ship
//! (tagged event/action enums, checkpoint/restore for recovery, per-state
//! metrics) and retargeted at the podcast generation job described in
//! spec §4.11: `QUEUED -> GENERATING(retrieval/script/parse/audio/store) ->
//! COMPLETED|FAILED|CANCELLED`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::PodcastStatus;

/// Events that drive a podcast job forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PodcastEvent {
    Enqueued,
    RetrievalStarted,
    RetrievalCompleted { chunk_count: usize },
    ScriptStarted,
    ScriptCompleted { word_count: usize },
    ParseStarted,
    ParseCompleted { turn_count: usize },
    AudioStarted,
    AudioTurnSynthesized { turn_index: usize, total_turns: usize },
    AudioCompleted,
    StoreStarted,
    StoreCompleted { audio_url: String, audio_size: u64 },
    Failed { reason: String },
    Cancelled,
}

/// Side effects the runner executes after a transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PodcastAction {
    ReportProgress { pct: u8, step: String },
    DeleteStoredAudio { audio_url: String },
    RecordError { message: String },
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PodcastFsmError {
    #[error("invalid transition from {from:?} with event {event}")]
    InvalidTransition { from: PodcastStatus, event: String },

    #[error("no checkpoint at index {0}")]
    NoCheckpoint(usize),

    #[error("job already in terminal state {0:?}")]
    AlreadyTerminal(PodcastStatus),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastCheckpoint {
    pub index: usize,
    pub status: PodcastStatus,
    pub progress_pct: u8,
    pub current_step: String,
    pub context: HashMap<String, serde_json::Value>,
}

#[async_trait]
pub trait PodcastFsm: Send + Sync {
    fn status(&self) -> PodcastStatus;

    fn progress_pct(&self) -> u8;

    /// Apply an event, producing the actions to execute. Implementations
    /// update internal state before returning; progress is required to be
    /// monotonically non-decreasing across calls.
    fn apply(&mut self, event: PodcastEvent) -> Result<Vec<PodcastAction>, PodcastFsmError>;

    fn checkpoint(&mut self) -> PodcastCheckpoint;

    fn restore(&mut self, checkpoint_index: usize) -> Result<(), PodcastFsmError>;

    fn checkpoints(&self) -> &[PodcastCheckpoint];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_round_trips_status() {
        let cp = PodcastCheckpoint {
            index: 0,
            status: PodcastStatus::Generating,
            progress_pct: 30,
            current_step: "retrieval".into(),
            context: HashMap::new(),
        };
        let json = serde_json::to_string(&cp).unwrap();
        let back: PodcastCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.progress_pct, 30);
        assert_eq!(back.status, PodcastStatus::Generating);
    }
}
