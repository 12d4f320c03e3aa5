//! Process entry point: loads configuration, wires every collaborator
//! behind [`AppState`], and serves the router until a shutdown signal
//! arrives.
//!
//! File-then-env settings load with `eprintln!` fallback logging before
//! tracing is up, then `init_tracing`, `init_metrics`, persistence init,
//! and graceful shutdown on ctrl_c/SIGTERM. Persistence is always-on;
//! Qdrant collections are assumed provisioned out of band.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use ragflow_config::{load_settings, InMemoryPromptTemplateStore, Settings};
use ragflow_llm::{ProviderRegistry, RegistryConfig};
use ragflow_podcast::{InMemoryBlobStore, JobQueue, QueueDeps};
use ragflow_rag::{DistanceMetric, QdrantVectorStore};
use ragflow_server::{create_router, init_metrics, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("RAGFLOW_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            eprintln!("loaded configuration (env: {})", env.as_deref().unwrap_or("development"));
            settings
        }
        Err(e) => {
            eprintln!("warning: failed to load config: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&config);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting ragflow-server");
    tracing::info!(environment = ?config.environment, "configuration loaded");

    let _metrics_handle = init_metrics();
    tracing::info!("initialized Prometheus metrics at /metrics");

    tracing::info!(
        hosts = ?config.persistence.scylla_hosts,
        keyspace = %config.persistence.keyspace,
        "initializing ScyllaDB persistence layer"
    );
    let scylla_config = ragflow_persistence::ScyllaConfig::from(&config.persistence);
    let persistence = ragflow_persistence::init(scylla_config).await?;

    let vector_store = init_vector_store().await?;
    tracing::info!("vector store client initialized");

    let registry = Arc::new(ProviderRegistry::new(RegistryConfig::from_env()));
    let config_store: Arc<dyn ragflow_config::ConfigStore> = Arc::new(persistence.config_store);
    let templates: Arc<dyn ragflow_config::PromptTemplateStore> =
        Arc::new(InMemoryPromptTemplateStore::with_defaults());
    // No durable blob store backend exists in this workspace yet; podcast
    // audio lives in process memory until one is added (see DESIGN.md).
    let blob_store: Arc<dyn ragflow_podcast::BlobStore> = Arc::new(InMemoryBlobStore::new());

    let podcast_jobs: Arc<dyn ragflow_persistence::PodcastJobStore> = Arc::new(persistence.podcast_jobs);
    let sessions: Arc<dyn ragflow_persistence::SessionStore> = Arc::new(persistence.sessions);
    let voices: Arc<dyn ragflow_persistence::VoiceStore> = Arc::new(persistence.voices);
    let token_usage: Arc<dyn ragflow_persistence::TokenUsageStore> = Arc::new(persistence.token_usage);

    let recovered = JobQueue::recover(podcast_jobs.as_ref()).await?;
    if recovered > 0 {
        tracing::info!(recovered, "recovered orphaned podcast jobs from a previous run");
    }

    let (podcast_queue, _progress_rx) = JobQueue::start(QueueDeps {
        registry: registry.clone(),
        config_store: config_store.clone(),
        templates: templates.clone(),
        vector_store: vector_store.clone(),
        podcast_jobs: podcast_jobs.clone(),
        voices: voices.clone(),
        blob_store: blob_store.clone(),
    });

    let state = AppState::new(
        config.clone(),
        registry,
        config_store,
        templates,
        vector_store,
        sessions,
        podcast_jobs,
        voices,
        token_usage,
        blob_store,
        Arc::new(podcast_queue),
    );

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("ragflow={level},tower_http=debug").into()
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if config.observability.json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}

async fn init_vector_store() -> Result<Arc<dyn ragflow_rag::VectorStore>, Box<dyn std::error::Error>> {
    let endpoint = ragflow_config::constants::endpoints::QDRANT_URL.clone();
    let api_key = std::env::var("QDRANT_API_KEY").ok();

    tracing::info!(%endpoint, "connecting to Qdrant");
    let mut builder = qdrant_client::Qdrant::from_url(endpoint.as_str());
    if let Some(key) = api_key {
        builder = builder.api_key(key);
    }
    let client = builder.build()?;

    Ok(Arc::new(QdrantVectorStore::new(client, DistanceMetric::Cosine)))
}
