//! Shared domain types, provider traits and the error taxonomy for the RAG
//! query-time backend.
//!
//! Other crates depend on this one and nothing else in the workspace
//! depends on them; it is the foundation every other crate builds on.

pub mod error;
pub mod model;
pub mod traits;

pub use error::{Error, ErrorKind, Result};
pub use model::{
    AudioFormat, Chunk, ChunkMetadata, ConversationContext, ConversationSession, DurationBucket,
    LLMUsage, Message, MessageMetadata, MessageRole, MessageType, PipelineConfig, PodcastJob,
    PodcastStatus, QueryResult, SearchSource, SessionStatus, TokenWarning, TokenWarningKind,
    UsageService, Voice, VoiceStatus, WarningSeverity,
};
pub use traits::{
    Embedder, GenerateChunk, GenerateParams, LanguageModel, PodcastAction, PodcastCheckpoint,
    PodcastEvent, PodcastFsm, PodcastFsmError, ProviderError, ProviderErrorKind, ProviderKind,
    RerankCandidate, RerankResult, Reranker, TextToSpeech,
};
