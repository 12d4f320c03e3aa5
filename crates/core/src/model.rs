//! Shared data model (spec §3): chunks, query results, sessions, messages,
//! usage accounting, pipeline config, podcast jobs and voices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A fragment of an ingested document, produced by ingestion and read-only
/// to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub doc_id: Uuid,
    pub collection_id: Uuid,
    pub text: String,
    pub embedding: Option<Vec<f32>>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub page: Option<u32>,
    pub section: Option<String>,
    pub offset: usize,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl Chunk {
    /// `text` non-empty is the only invariant the core can check; embedding
    /// dimension against the collection's embedder is checked by the store.
    pub fn is_valid(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Where a [`QueryResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Vector,
    Rerank,
    Hybrid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SearchSource,
}

/// Sorts a result set by score descending, stable (ties keep insertion order).
pub fn sort_by_score_desc(results: &mut [QueryResult]) {
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Paused,
    Archived,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: Uuid,
    pub user_id: Uuid,
    pub collection_id: Uuid,
    pub name: String,
    pub status: SessionStatus,
    pub context_window_size: u32,
    pub max_messages: u32,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn accepts_writes(&self) -> bool {
        self.status != SessionStatus::Expired && self.message_count < self.max_messages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Question,
    Answer,
    FollowUp,
    Clarification,
    System,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub sources: Option<Vec<Uuid>>,
    pub usage: Option<LLMUsage>,
    pub warnings: Option<Vec<TokenWarning>>,
    pub cot_steps: Option<Vec<String>>,
    pub config: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub metadata: MessageMetadata,
}

/// Derived per-request view over the message log; never persisted.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub session_id: Option<Uuid>,
    pub window_text: String,
    pub relevant_doc_ids: Vec<Uuid>,
    pub entities: HashMap<String, usize>,
    pub last_turns: Vec<Message>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageService {
    Search,
    Conversation,
    Cot,
    QuestionGen,
    PodcastScript,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub model_id: String,
    pub service: UsageService,
    pub at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<Uuid>,
}

impl LLMUsage {
    pub fn sum_tokens<'a>(usages: impl IntoIterator<Item = &'a LLMUsage>) -> u32 {
        usages.into_iter().map(|u| u.total_tokens).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenWarningKind {
    Approaching70,
    Approaching85,
    At95,
    ConversationTooLong,
    ContextTruncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarningSeverity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenWarning {
    pub kind: TokenWarningKind,
    pub current: u32,
    pub limit: u32,
    pub pct: f32,
    pub severity: WarningSeverity,
    pub suggested_action: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub user_id: Uuid,
    pub provider: String,
    pub model_id: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k_retrieval: u32,
    pub top_k_final: u32,
    pub rerank_enabled: bool,
    pub rerank_model: String,
    pub cot_enabled: bool,
    pub cot_max_depth: u32,
    pub cot_quality_threshold: f32,
    pub cot_max_retries: u32,
}

impl PipelineConfig {
    /// Defaults are constants, not inferred (spec §4.13).
    pub fn default_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            provider: "claude".to_string(),
            model_id: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
            top_p: 0.9,
            top_k_retrieval: 100,
            top_k_final: 10,
            rerank_enabled: true,
            rerank_model: "default".to_string(),
            cot_enabled: true,
            cot_max_depth: 3,
            cot_quality_threshold: 0.6,
            cot_max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DurationBucket {
    Short,
    Medium,
    Long,
    Extended,
}

impl DurationBucket {
    pub fn minutes(self) -> u32 {
        match self {
            DurationBucket::Short => 5,
            DurationBucket::Medium => 15,
            DurationBucket::Long => 30,
            DurationBucket::Extended => 60,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        match minutes {
            5 => Some(DurationBucket::Short),
            15 => Some(DurationBucket::Medium),
            30 => Some(DurationBucket::Long),
            60 => Some(DurationBucket::Extended),
            _ => None,
        }
    }

    pub fn retrieval_top_k(self) -> u32 {
        match self {
            DurationBucket::Short => 30,
            DurationBucket::Medium => 50,
            DurationBucket::Long => 75,
            DurationBucket::Extended => 100,
        }
    }

    pub fn target_word_count(self) -> u32 {
        self.minutes() * 150
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Ogg,
    Flac,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PodcastStatus {
    Queued,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl PodcastStatus {
    /// Terminal states never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PodcastStatus::Completed | PodcastStatus::Failed | PodcastStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodcastJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub collection_id: Uuid,
    pub title: String,
    pub duration_bucket: DurationBucket,
    pub host_voice: String,
    pub expert_voice: String,
    pub format: AudioFormat,
    pub status: PodcastStatus,
    pub progress_pct: u8,
    pub current_step: String,
    pub audio_url: Option<String>,
    pub audio_size: Option<u64>,
    pub transcript: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl PodcastJob {
    pub fn invariants_hold(&self) -> bool {
        match self.status {
            PodcastStatus::Completed => self.audio_url.is_some(),
            PodcastStatus::Failed => self.error.is_some(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoiceStatus {
    Uploading,
    Processing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub status: VoiceStatus,
    pub provider_name: String,
    pub provider_voice_id: Option<String>,
    pub sample_ref: String,
    pub times_used: u32,
    pub quality_score: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_rejects_writes_when_full() {
        let mut session = make_session();
        session.message_count = session.max_messages;
        assert!(!session.accepts_writes());
    }

    #[test]
    fn session_rejects_writes_when_expired() {
        let mut session = make_session();
        session.status = SessionStatus::Expired;
        assert!(!session.accepts_writes());
    }

    #[test]
    fn podcast_invariants() {
        let mut job = make_job();
        job.status = PodcastStatus::Completed;
        assert!(!job.invariants_hold());
        job.audio_url = Some("https://example/a.mp3".into());
        assert!(job.invariants_hold());
    }

    #[test]
    fn sort_is_descending_and_stable_on_ties() {
        let c = make_chunk();
        let mut results = vec![
            QueryResult { chunk: c.clone(), score: 0.2, source: SearchSource::Vector },
            QueryResult { chunk: c.clone(), score: 0.9, source: SearchSource::Vector },
            QueryResult { chunk: c, score: 0.9, source: SearchSource::Vector },
        ];
        sort_by_score_desc(&mut results);
        assert_eq!(results[0].score, 0.9);
        assert_eq!(results[1].score, 0.9);
        assert_eq!(results[2].score, 0.2);
    }

    fn make_session() -> ConversationSession {
        ConversationSession {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            name: "test".into(),
            status: SessionStatus::Active,
            context_window_size: 8000,
            max_messages: 50,
            message_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn make_chunk() -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            doc_id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            text: "hello".into(),
            embedding: None,
            metadata: ChunkMetadata::default(),
        }
    }

    fn make_job() -> PodcastJob {
        PodcastJob {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            title: "t".into(),
            duration_bucket: DurationBucket::Short,
            host_voice: "nova".into(),
            expert_voice: "onyx".into(),
            format: AudioFormat::Mp3,
            status: PodcastStatus::Queued,
            progress_pct: 0,
            current_step: "queued".into(),
            audio_url: None,
            audio_size: None,
            transcript: None,
            error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        }
    }
}
