//! Factory + per-key singleton cache of LLM, embedding, reranker and TTS
//! providers (spec §4.1).
//!
//! Grounded on `llm/src/factory.rs`'s `LlmFactory`/`LlmProviderConfig`:
//! construction dispatches on a provider enum, reads credentials from the
//! environment, and wraps the concrete backend behind the shared trait.
//! The cache itself follows the double-checked-locking shape described in
//! spec §4.1 and §5 ("ProviderRegistry map is protected by a mutex on
//! write; reads after first construction are lock-free").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use ragflow_core::{
    Embedder, LanguageModel, ProviderError, ProviderErrorKind, ProviderKind, Reranker,
    TextToSpeech,
};

use crate::claude::ClaudeLanguageModel;
use crate::embed::HttpEmbedder;
use crate::rerank::HttpReranker;
use crate::tts::{ElevenLabsTts, OpenAiTts};

/// How long a failed construction is cached before the next `get()` retries
/// (SPEC_FULL.md ambient-stack decision; spec.md only requires "a short
/// back-off window").
const VALIDATION_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProviderKey {
    kind: ProviderKind,
    model_id: String,
}

/// Per-key cache entry shared by every provider kind: a constructed
/// provider, or a recent construction failure still inside its back-off
/// window (spec.md: "failure is cached for a short back-off window then
/// retried on next call").
enum Cached<T> {
    Ready(T),
    Failed { at: Instant, kind: ProviderErrorKind },
}

/// Registry configuration: which concrete backend to build for a given
/// `model_id`. Kept intentionally simple — static registration at process
/// start, no runtime reflection (spec §9 "Dynamic provider dispatch").
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub anthropic_api_key: Option<String>,
    pub embedding_endpoint: Option<String>,
    pub embedding_api_key: Option<String>,
    pub rerank_endpoint: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl RegistryConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            embedding_endpoint: std::env::var("RAGFLOW_EMBEDDING_ENDPOINT").ok(),
            embedding_api_key: std::env::var("RAGFLOW_EMBEDDING_API_KEY").ok(),
            rerank_endpoint: std::env::var("RAGFLOW_RERANK_ENDPOINT").ok(),
            elevenlabs_api_key: std::env::var("ELEVENLABS_API_KEY").ok(),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
        }
    }
}

pub struct ProviderRegistry {
    config: RegistryConfig,
    llms: RwLock<HashMap<ProviderKey, Cached<Arc<dyn LanguageModel>>>>,
    embedders: RwLock<HashMap<ProviderKey, Cached<Arc<dyn Embedder>>>>,
    rerankers: RwLock<HashMap<ProviderKey, Cached<Arc<dyn Reranker>>>>,
    tts: RwLock<HashMap<ProviderKey, Cached<Arc<dyn TextToSpeech>>>>,
}

impl ProviderRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            llms: RwLock::new(HashMap::new()),
            embedders: RwLock::new(HashMap::new()),
            rerankers: RwLock::new(HashMap::new()),
            tts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_llm(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, ProviderError> {
        let key = ProviderKey { kind: ProviderKind::Llm, model_id: model_id.to_string() };

        if let Some(cached) = self.llms.read().get(&key) {
            match cached {
                Cached::Ready(provider) => return Ok(provider.clone()),
                Cached::Failed { at, kind } => {
                    if at.elapsed() < VALIDATION_BACKOFF {
                        return Err(ProviderError::new(*kind, "provider in back-off window"));
                    }
                }
            }
        }

        // Double-checked: re-check under the write lock before constructing,
        // so concurrent callers racing to build the same key don't both pay
        // the validation cost.
        {
            let guard = self.llms.write();
            if let Some(Cached::Ready(provider)) = guard.get(&key) {
                return Ok(provider.clone());
            }
        }

        let provider = self.construct_llm(model_id).await;
        let mut guard = self.llms.write();
        match provider {
            Ok(provider) => {
                guard.insert(key, Cached::Ready(provider.clone()));
                tracing::debug!(model_id, "llm provider constructed");
                Ok(provider)
            }
            Err(err) => {
                tracing::warn!(model_id, error = %err, "llm provider construction failed");
                guard.insert(key, Cached::Failed { at: Instant::now(), kind: err.kind });
                Err(err)
            }
        }
    }

    async fn construct_llm(&self, model_id: &str) -> Result<Arc<dyn LanguageModel>, ProviderError> {
        let api_key = self.config.anthropic_api_key.clone().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::Auth, "ANTHROPIC_API_KEY not configured")
        })?;
        let provider: Arc<dyn LanguageModel> =
            Arc::new(ClaudeLanguageModel::new(api_key, model_id.to_string()));
        provider.validate().await?;
        Ok(provider)
    }

    pub async fn get_embedder(&self, model_id: &str) -> Result<Arc<dyn Embedder>, ProviderError> {
        let key = ProviderKey { kind: ProviderKind::Embed, model_id: model_id.to_string() };

        if let Some(cached) = self.embedders.read().get(&key) {
            match cached {
                Cached::Ready(provider) => return Ok(provider.clone()),
                Cached::Failed { at, kind } => {
                    if at.elapsed() < VALIDATION_BACKOFF {
                        return Err(ProviderError::new(*kind, "provider in back-off window"));
                    }
                }
            }
        }

        {
            let guard = self.embedders.write();
            if let Some(Cached::Ready(provider)) = guard.get(&key) {
                return Ok(provider.clone());
            }
        }

        let provider = self.construct_embedder(model_id).await;
        let mut guard = self.embedders.write();
        match provider {
            Ok(provider) => {
                guard.insert(key, Cached::Ready(provider.clone()));
                tracing::debug!(model_id, "embedder provider constructed");
                Ok(provider)
            }
            Err(err) => {
                tracing::warn!(model_id, error = %err, "embedder provider construction failed");
                guard.insert(key, Cached::Failed { at: Instant::now(), kind: err.kind });
                Err(err)
            }
        }
    }

    async fn construct_embedder(&self, model_id: &str) -> Result<Arc<dyn Embedder>, ProviderError> {
        let endpoint = self.config.embedding_endpoint.clone().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::Auth, "embedding endpoint not configured")
        })?;
        let provider: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(
            endpoint,
            self.config.embedding_api_key.clone(),
            model_id.to_string(),
        ));
        provider.validate().await?;
        Ok(provider)
    }

    pub async fn get_reranker(&self, model_id: &str) -> Result<Arc<dyn Reranker>, ProviderError> {
        let key = ProviderKey { kind: ProviderKind::Rerank, model_id: model_id.to_string() };

        if let Some(cached) = self.rerankers.read().get(&key) {
            match cached {
                Cached::Ready(provider) => return Ok(provider.clone()),
                Cached::Failed { at, kind } => {
                    if at.elapsed() < VALIDATION_BACKOFF {
                        return Err(ProviderError::new(*kind, "provider in back-off window"));
                    }
                }
            }
        }

        {
            let guard = self.rerankers.write();
            if let Some(Cached::Ready(provider)) = guard.get(&key) {
                return Ok(provider.clone());
            }
        }

        let provider = self.construct_reranker(model_id).await;
        let mut guard = self.rerankers.write();
        match provider {
            Ok(provider) => {
                guard.insert(key, Cached::Ready(provider.clone()));
                tracing::debug!(model_id, "reranker provider constructed");
                Ok(provider)
            }
            Err(err) => {
                tracing::warn!(model_id, error = %err, "reranker provider construction failed");
                guard.insert(key, Cached::Failed { at: Instant::now(), kind: err.kind });
                Err(err)
            }
        }
    }

    async fn construct_reranker(&self, model_id: &str) -> Result<Arc<dyn Reranker>, ProviderError> {
        let endpoint = self.config.rerank_endpoint.clone().ok_or_else(|| {
            ProviderError::new(ProviderErrorKind::Auth, "rerank endpoint not configured")
        })?;
        let provider: Arc<dyn Reranker> = Arc::new(HttpReranker::new(endpoint, model_id.to_string()));
        provider.validate().await?;
        Ok(provider)
    }

    /// `model_id` doubles as the provider selector for TTS: `"elevenlabs:<voice>"`
    /// style prefixes route to ElevenLabs, anything else to the default
    /// OpenAI-compatible provider (scenario E names exactly these two).
    pub async fn get_tts(&self, provider_name: &str) -> Result<Arc<dyn TextToSpeech>, ProviderError> {
        let key = ProviderKey { kind: ProviderKind::Tts, model_id: provider_name.to_string() };

        if let Some(cached) = self.tts.read().get(&key) {
            match cached {
                Cached::Ready(provider) => return Ok(provider.clone()),
                Cached::Failed { at, kind } => {
                    if at.elapsed() < VALIDATION_BACKOFF {
                        return Err(ProviderError::new(*kind, "provider in back-off window"));
                    }
                }
            }
        }

        {
            let guard = self.tts.write();
            if let Some(Cached::Ready(provider)) = guard.get(&key) {
                return Ok(provider.clone());
            }
        }

        let provider = self.construct_tts(provider_name).await;
        let mut guard = self.tts.write();
        match provider {
            Ok(provider) => {
                guard.insert(key, Cached::Ready(provider.clone()));
                tracing::debug!(provider_name, "tts provider constructed");
                Ok(provider)
            }
            Err(err) => {
                tracing::warn!(provider_name, error = %err, "tts provider construction failed");
                guard.insert(key, Cached::Failed { at: Instant::now(), kind: err.kind });
                Err(err)
            }
        }
    }

    async fn construct_tts(&self, provider_name: &str) -> Result<Arc<dyn TextToSpeech>, ProviderError> {
        let provider: Arc<dyn TextToSpeech> = match provider_name {
            "elevenlabs" => {
                let api_key = self.config.elevenlabs_api_key.clone().ok_or_else(|| {
                    ProviderError::new(ProviderErrorKind::Auth, "ELEVENLABS_API_KEY not configured")
                })?;
                Arc::new(ElevenLabsTts::new(api_key))
            }
            _ => {
                let api_key = self.config.openai_api_key.clone().ok_or_else(|| {
                    ProviderError::new(ProviderErrorKind::Auth, "OPENAI_API_KEY not configured")
                })?;
                Arc::new(OpenAiTts::new(api_key))
            }
        };
        provider.validate().await?;
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_surface_as_auth_error() {
        let registry = ProviderRegistry::new(RegistryConfig {
            anthropic_api_key: None,
            embedding_endpoint: None,
            embedding_api_key: None,
            rerank_endpoint: None,
            elevenlabs_api_key: None,
            openai_api_key: None,
        });
        let err = registry.get_llm("claude-sonnet-4-20250514").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::Auth);
    }

    #[tokio::test]
    async fn failed_construction_is_cached_for_the_backoff_window() {
        let registry = ProviderRegistry::new(RegistryConfig {
            anthropic_api_key: None,
            embedding_endpoint: None,
            embedding_api_key: None,
            rerank_endpoint: None,
            elevenlabs_api_key: None,
            openai_api_key: None,
        });
        let _ = registry.get_llm("claude-sonnet-4-20250514").await;
        let key = ProviderKey { kind: ProviderKind::Llm, model_id: "claude-sonnet-4-20250514".into() };
        let cached = registry.llms.read();
        assert!(matches!(cached.get(&key), Some(Cached::Failed { .. })));
    }

    #[tokio::test]
    async fn failed_embedder_construction_is_also_cached_for_the_backoff_window() {
        let registry = ProviderRegistry::new(RegistryConfig {
            anthropic_api_key: None,
            embedding_endpoint: None,
            embedding_api_key: None,
            rerank_endpoint: None,
            elevenlabs_api_key: None,
            openai_api_key: None,
        });
        let _ = registry.get_embedder("default").await;
        let key = ProviderKey { kind: ProviderKind::Embed, model_id: "default".into() };
        let cached = registry.embedders.read();
        assert!(matches!(cached.get(&key), Some(Cached::Failed { .. })));
    }
}
