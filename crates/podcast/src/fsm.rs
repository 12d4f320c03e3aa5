//! [`PodcastFsm`] implementation for a single job: the progress-band state
//! machine described in spec §4.11.

use std::collections::HashMap;

use ragflow_core::{PodcastAction, PodcastCheckpoint, PodcastEvent, PodcastFsm, PodcastFsmError, PodcastStatus};

pub struct JobFsm {
    status: PodcastStatus,
    progress_pct: u8,
    current_step: String,
    checkpoints: Vec<PodcastCheckpoint>,
}

impl JobFsm {
    pub fn new() -> Self {
        Self {
            status: PodcastStatus::Queued,
            progress_pct: 0,
            current_step: "queued".to_string(),
            checkpoints: Vec::new(),
        }
    }

    fn advance(&mut self, status: PodcastStatus, pct: u8, step: &str) -> Vec<PodcastAction> {
        self.status = status;
        self.progress_pct = self.progress_pct.max(pct);
        self.current_step = step.to_string();
        vec![PodcastAction::ReportProgress { pct: self.progress_pct, step: self.current_step.clone() }]
    }
}

impl Default for JobFsm {
    fn default() -> Self {
        Self::new()
    }
}

impl PodcastFsm for JobFsm {
    fn status(&self) -> PodcastStatus {
        self.status
    }

    fn progress_pct(&self) -> u8 {
        self.progress_pct
    }

    fn apply(&mut self, event: PodcastEvent) -> Result<Vec<PodcastAction>, PodcastFsmError> {
        if self.status.is_terminal() {
            return Err(PodcastFsmError::AlreadyTerminal(self.status));
        }

        let actions = match event {
            PodcastEvent::Enqueued => self.advance(PodcastStatus::Queued, 0, "queued"),
            PodcastEvent::RetrievalStarted => self.advance(PodcastStatus::Generating, 0, "retrieval"),
            PodcastEvent::RetrievalCompleted { .. } => self.advance(PodcastStatus::Generating, 30, "retrieval"),
            PodcastEvent::ScriptStarted => self.advance(PodcastStatus::Generating, 30, "script"),
            PodcastEvent::ScriptCompleted { .. } => self.advance(PodcastStatus::Generating, 40, "script"),
            PodcastEvent::ParseStarted => self.advance(PodcastStatus::Generating, 40, "parse"),
            PodcastEvent::ParseCompleted { .. } => self.advance(PodcastStatus::Generating, 50, "parse"),
            PodcastEvent::AudioStarted => self.advance(PodcastStatus::Generating, 50, "audio"),
            PodcastEvent::AudioTurnSynthesized { turn_index, total_turns } => {
                let span = 40u32; // 50..90
                let done = if total_turns == 0 { span } else { span * (turn_index as u32 + 1) / total_turns as u32 };
                self.advance(PodcastStatus::Generating, 50 + done.min(span) as u8, "audio")
            }
            PodcastEvent::AudioCompleted => self.advance(PodcastStatus::Generating, 90, "audio"),
            PodcastEvent::StoreStarted => self.advance(PodcastStatus::Generating, 90, "store"),
            PodcastEvent::StoreCompleted { .. } => self.advance(PodcastStatus::Completed, 100, "completed"),
            PodcastEvent::Failed { reason } => {
                let mut actions = self.advance(PodcastStatus::Failed, self.progress_pct, "failed");
                actions.push(PodcastAction::RecordError { message: reason });
                actions
            }
            PodcastEvent::Cancelled => self.advance(PodcastStatus::Cancelled, self.progress_pct, "cancelled"),
        };

        Ok(actions)
    }

    fn checkpoint(&mut self) -> PodcastCheckpoint {
        let cp = PodcastCheckpoint {
            index: self.checkpoints.len(),
            status: self.status,
            progress_pct: self.progress_pct,
            current_step: self.current_step.clone(),
            context: HashMap::new(),
        };
        self.checkpoints.push(cp.clone());
        cp
    }

    fn restore(&mut self, checkpoint_index: usize) -> Result<(), PodcastFsmError> {
        let cp = self.checkpoints.get(checkpoint_index).ok_or(PodcastFsmError::NoCheckpoint(checkpoint_index))?;
        self.status = cp.status;
        self.progress_pct = cp.progress_pct;
        self.current_step = cp.current_step.clone();
        Ok(())
    }

    fn checkpoints(&self) -> &[PodcastCheckpoint] {
        &self.checkpoints
    }
}

impl JobFsm {
    pub fn current_step(&self) -> &str {
        &self.current_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_bands_match_spec() {
        let mut fsm = JobFsm::new();
        fsm.apply(PodcastEvent::RetrievalStarted).unwrap();
        fsm.apply(PodcastEvent::RetrievalCompleted { chunk_count: 10 }).unwrap();
        assert_eq!(fsm.progress_pct(), 30);
        fsm.apply(PodcastEvent::ScriptCompleted { word_count: 500 }).unwrap();
        assert_eq!(fsm.progress_pct(), 40);
        fsm.apply(PodcastEvent::ParseCompleted { turn_count: 4 }).unwrap();
        assert_eq!(fsm.progress_pct(), 50);
        fsm.apply(PodcastEvent::AudioCompleted).unwrap();
        assert_eq!(fsm.progress_pct(), 90);
        fsm.apply(PodcastEvent::StoreCompleted { audio_url: "mem://x".into(), audio_size: 10 }).unwrap();
        assert_eq!(fsm.progress_pct(), 100);
        assert_eq!(fsm.status(), PodcastStatus::Completed);
    }

    #[test]
    fn progress_never_decreases_across_audio_turns() {
        let mut fsm = JobFsm::new();
        fsm.apply(PodcastEvent::RetrievalCompleted { chunk_count: 1 }).unwrap();
        fsm.apply(PodcastEvent::ScriptCompleted { word_count: 1 }).unwrap();
        fsm.apply(PodcastEvent::ParseCompleted { turn_count: 4 }).unwrap();
        fsm.apply(PodcastEvent::AudioStarted).unwrap();
        let mut last = fsm.progress_pct();
        for i in 0..4 {
            fsm.apply(PodcastEvent::AudioTurnSynthesized { turn_index: i, total_turns: 4 }).unwrap();
            assert!(fsm.progress_pct() >= last);
            last = fsm.progress_pct();
        }
    }

    #[test]
    fn cannot_apply_events_after_terminal() {
        let mut fsm = JobFsm::new();
        fsm.apply(PodcastEvent::Failed { reason: "boom".into() }).unwrap();
        assert!(fsm.apply(PodcastEvent::RetrievalStarted).is_err());
    }

    #[test]
    fn checkpoint_restore_round_trips() {
        let mut fsm = JobFsm::new();
        fsm.apply(PodcastEvent::RetrievalCompleted { chunk_count: 1 }).unwrap();
        let cp = fsm.checkpoint();
        fsm.apply(PodcastEvent::ScriptCompleted { word_count: 1 }).unwrap();
        assert_eq!(fsm.progress_pct(), 40);
        fsm.restore(cp.index).unwrap();
        assert_eq!(fsm.progress_pct(), 30);
    }
}
