//! Shared application state (spec §6): every collaborator an HTTP handler
//! needs, held behind `Arc` so cloning `AppState` into an axum handler is
//! cheap. Settings are wrapped in `RwLock` to support hot-reload; every
//! other collaborator is `Arc`-wrapped and immutable for the life of the
//! process.

use std::sync::Arc;

use parking_lot::RwLock;

use ragflow_config::{ConfigStore, PromptTemplateStore, Settings};
use ragflow_llm::ProviderRegistry;
use ragflow_persistence::{PodcastJobStore, SessionStore, TokenUsageStore, VoiceStore};
use ragflow_podcast::{BlobStore, JobQueue};
use ragflow_rag::VectorStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub registry: Arc<ProviderRegistry>,
    pub config_store: Arc<dyn ConfigStore>,
    pub templates: Arc<dyn PromptTemplateStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub podcast_jobs: Arc<dyn PodcastJobStore>,
    pub voices: Arc<dyn VoiceStore>,
    pub token_usage: Arc<dyn TokenUsageStore>,
    pub blob_store: Arc<dyn BlobStore>,
    pub podcast_queue: Arc<JobQueue>,
}

#[allow(clippy::too_many_arguments)]
impl AppState {
    pub fn new(
        settings: Settings,
        registry: Arc<ProviderRegistry>,
        config_store: Arc<dyn ConfigStore>,
        templates: Arc<dyn PromptTemplateStore>,
        vector_store: Arc<dyn VectorStore>,
        sessions: Arc<dyn SessionStore>,
        podcast_jobs: Arc<dyn PodcastJobStore>,
        voices: Arc<dyn VoiceStore>,
        token_usage: Arc<dyn TokenUsageStore>,
        blob_store: Arc<dyn BlobStore>,
        podcast_queue: Arc<JobQueue>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(settings)),
            registry,
            config_store,
            templates,
            vector_store,
            sessions,
            podcast_jobs,
            voices,
            token_usage,
            blob_store,
            podcast_queue,
        }
    }

    pub fn reload_config(&self, settings: Settings) {
        *self.config.write() = settings;
    }
}
