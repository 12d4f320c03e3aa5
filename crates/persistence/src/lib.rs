//! ScyllaDB persistence layer for the RAG query-time backend.
//!
//! Provides the durable counterpart of every entity in the persisted
//! state layout (spec §6): `pipeline_configs`, `conversation_sessions`,
//! `conversation_messages`, `podcast_jobs` (+ a `podcast_jobs_by_user`
//! side table), `voices`, `token_usage`. Prompt templates stay
//! process-local in `ragflow-config` — its `PromptTemplateStore` trait is
//! synchronous by design (spec §4.5 doesn't require durability for
//! overrides), so a ScyllaDB-backed implementation would need to block on
//! I/O inside a sync call; not worth it for a store this small.

pub mod client;
pub mod config_store;
pub mod error;
pub mod podcast_jobs;
pub mod schema;
pub mod sessions;
pub mod token_usage;
pub mod voices;

pub use client::{ScyllaClient, ScyllaConfig};
pub use config_store::ScyllaConfigStore;
pub use error::PersistenceError;
pub use podcast_jobs::{PodcastJobStore, ScyllaPodcastJobStore};
pub use sessions::{ScyllaSessionStore, SessionStore};
pub use token_usage::{ScyllaTokenUsageStore, TokenUsageStore};
pub use voices::{ScyllaVoiceStore, VoiceStore};

/// Connects, ensures schema, and wires every store against the shared
/// client.
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        config_store: ScyllaConfigStore::new(client.clone()),
        sessions: ScyllaSessionStore::new(client.clone()),
        podcast_jobs: ScyllaPodcastJobStore::new(client.clone()),
        voices: ScyllaVoiceStore::new(client.clone()),
        token_usage: ScyllaTokenUsageStore::new(client),
    })
}

/// Combined persistence layer with every durable store.
#[derive(Clone)]
pub struct PersistenceLayer {
    pub config_store: ScyllaConfigStore,
    pub sessions: ScyllaSessionStore,
    pub podcast_jobs: ScyllaPodcastJobStore,
    pub voices: ScyllaVoiceStore,
    pub token_usage: ScyllaTokenUsageStore,
}
