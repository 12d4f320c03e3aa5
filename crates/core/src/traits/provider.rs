//! Minimal capability contracts implemented by every provider kind (spec
//! §4.1): async_trait, `Send + Sync`, results carrying usage straight from
//! the provider response, never estimated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::LLMUsage;

/// Coarse classification the registry attaches to construction/call
/// failures. The registry itself never retries; this just tells the caller
/// what kind of failure it is dealing with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Auth,
    RateLimit,
    Timeout,
    BadRequest,
    Transient,
    Permanent,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Llm,
    Embed,
    Rerank,
    Tts,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

pub struct GenerateChunk {
    pub text: String,
    pub is_final: bool,
}

/// Text-generation provider. `generate`/`stream` both report provider-side
/// usage.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<(String, LLMUsage), ProviderError>;

    async fn stream(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<tokio::sync::mpsc::Receiver<GenerateChunk>, ProviderError>;

    fn model_id(&self) -> &str;

    /// Token budget the model accepts in one prompt.
    fn context_window(&self) -> u32;

    async fn validate(&self) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    fn model_id(&self) -> &str;

    async fn validate(&self) -> Result<(), ProviderError>;
}

#[derive(Debug, Clone)]
pub struct RerankCandidate {
    pub id: uuid::Uuid,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct RerankResult {
    pub id: uuid::Uuid,
    pub score: f32,
}

/// Cross-encoder scoring; CPU-bound, so implementations dispatch the actual
/// scoring work to `tokio::task::spawn_blocking` internally.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, ProviderError>;

    fn model_id(&self) -> &str;

    async fn validate(&self) -> Result<(), ProviderError>;
}

use crate::model::AudioFormat;

#[async_trait]
pub trait TextToSpeech: Send + Sync {
    async fn clone_voice(
        &self,
        sample_bytes: &[u8],
        name: &str,
        description: Option<&str>,
    ) -> Result<String, ProviderError>;

    async fn synthesize_turn(
        &self,
        voice_id: &str,
        text: &str,
        speed: f32,
        pitch: f32,
        format: AudioFormat,
    ) -> Result<Vec<u8>, ProviderError>;

    async fn delete_voice(&self, provider_voice_id: &str) -> Result<(), ProviderError>;

    fn provider_name(&self) -> &str;

    async fn validate(&self) -> Result<(), ProviderError>;
}
