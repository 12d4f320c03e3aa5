//! Axum router and HTTP handlers (spec §6): `/api/search`, conversation
//! sessions, podcast generation/status/audio, and health/ready/metrics.
//!
//! Router layering order: `auth -> Extension(config) -> trace ->
//! compression -> cors -> with_state`. Handlers are thin extractors over
//! `State<AppState>` with JSON in/out.

use std::collections::HashMap;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use futures::stream;
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use ragflow_agent::{ConversationContextManager, HeuristicTokenCounter};
use ragflow_config::apply_request_overrides;
use ragflow_core::{
    AudioFormat, ChunkMetadata, ConversationSession, DurationBucket, Error, ErrorKind, LLMUsage,
    Message, MessageMetadata, MessageRole, MessageType, PodcastJob, PodcastStatus, QueryResult,
    SessionStatus, TokenWarning,
};
use ragflow_pipeline::cot_engine::ReasoningStep;
use ragflow_pipeline::search_pipeline::{self, PartialFailure, SearchPipelineDeps, SearchRequest};

use crate::audio_range::{parse_range, RangeOutcome};
use crate::auth::auth_middleware;
use crate::state::AppState;

const STREAM_CHUNK_SIZE: usize = 64 * 1024;
const DEFAULT_CONTEXT_WINDOW_MESSAGES: usize = 20;

pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);
    let config_extension = Extension(state.config.clone());

    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        .route("/api/search", post(search))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session))
        .route("/api/sessions/:id/messages", post(append_message))
        .route("/api/podcasts", post(generate_podcast))
        .route("/api/podcasts/:id", get(podcast_status))
        .route("/api/podcasts/:id/audio", get(podcast_audio))
        .layer(axum::middleware::from_fn(auth_middleware))
        .layer(config_extension)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

fn build_cors_layer(state: &AppState) -> CorsLayer {
    let config = state.config.read();
    if !config.server.cors_enabled {
        tracing::warn!("CORS is disabled; allowing any origin");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> =
        config.server.cors_origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()).collect();

    let origins = if origins.is_empty() {
        vec![HeaderValue::from_static("http://localhost:3000")]
    } else {
        origins
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::RANGE])
}

/// Uniform JSON error envelope mapping [`ragflow_core::ErrorKind`] to an
/// HTTP status the way spec §7 describes the taxonomy.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Permission => StatusCode::FORBIDDEN,
            ErrorKind::ProviderAuth => StatusCode::BAD_GATEWAY,
            ErrorKind::ProviderRateLimit | ErrorKind::ProviderTransient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::ProviderPermanent => StatusCode::BAD_GATEWAY,
            ErrorKind::Quality => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Cancelled => StatusCode::from_u16(499).unwrap(),
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        }));
        (status, body).into_response()
    }
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.get_embedder("default").await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e.message, "readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics() -> impl IntoResponse {
    match crate::metrics::render() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

// ---------------------------------------------------------------------
// /api/search
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchRequestDto {
    question: String,
    collection_id: Uuid,
    user_id: Uuid,
    session_id: Option<Uuid>,
    config: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct DocumentDto {
    id: Uuid,
    name: String,
    score: f32,
}

#[derive(Debug, Serialize)]
struct QueryResultDto {
    chunk_id: Uuid,
    text: String,
    score: f32,
}

#[derive(Debug, Serialize)]
struct ReasoningStepDto {
    step_type: String,
    summary: String,
    quality: f32,
}

impl From<&ReasoningStep> for ReasoningStepDto {
    fn from(step: &ReasoningStep) -> Self {
        Self { step_type: format!("{:?}", step.step_type), summary: step.summary.clone(), quality: step.quality }
    }
}

#[derive(Debug, Serialize)]
struct SearchMetadataDto {
    pipeline_id: Uuid,
    search_method: String,
    token_usage: LLMUsage,
    token_warning: Option<TokenWarning>,
    cot_steps: Option<Vec<ReasoningStepDto>>,
}

#[derive(Debug, Serialize)]
struct SearchResponseDto {
    answer: String,
    documents: Vec<DocumentDto>,
    query_results: Vec<QueryResultDto>,
    execution_time_ms: u128,
    metadata: SearchMetadataDto,
}

fn document_name(metadata: &ChunkMetadata) -> String {
    metadata.section.clone().unwrap_or_else(|| "untitled".to_string())
}

fn score_by_chunk(query_results: &[QueryResult]) -> HashMap<Uuid, f32> {
    query_results.iter().map(|r| (r.chunk.id, r.score)).collect()
}

async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequestDto>,
) -> Result<Response, ApiError> {
    if req.question.trim().is_empty() {
        return Err(Error::Validation("question must not be empty".to_string()).into());
    }

    let mut config = state.config_store.get(req.user_id).await?;
    if let Some(overrides) = &req.config {
        config = apply_request_overrides(&config, overrides);
    }

    let llm = state.registry.get_llm(&config.model_id).await.map_err(|e| Error::ProviderPermanent(e.message))?;
    let embedder =
        state.registry.get_embedder("default").await.map_err(|e| Error::ProviderPermanent(e.message))?;
    let reranker = if config.rerank_enabled {
        state.registry.get_reranker(&config.rerank_model).await.ok()
    } else {
        None
    };

    let history = match req.session_id {
        Some(session_id) => {
            let messages = state.sessions.recent_messages(session_id, DEFAULT_CONTEXT_WINDOW_MESSAGES as i32).await?;
            Some(messages)
        }
        None => None,
    };

    let deps = SearchPipelineDeps {
        config_store: state.config_store.as_ref(),
        templates: state.templates.as_ref(),
        vector_store: state.vector_store.as_ref(),
        embedder: embedder.as_ref(),
        llm: llm.as_ref(),
        reranker: reranker.as_deref(),
    };

    let outcome = search_pipeline::run(
        &deps,
        SearchRequest {
            question: &req.question,
            collection_id: req.collection_id,
            user_id: req.user_id,
            session_history: history.as_deref(),
            config_overrides: req.config.clone(),
        },
    )
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(PartialFailure { message, documents, query_results }) => {
            let scores = score_by_chunk(&query_results);
            let body = serde_json::json!({
                "error": message,
                "kind": "provider_transient",
                "documents": documents.iter().map(|c| DocumentDto {
                    id: c.id,
                    name: document_name(&c.metadata),
                    score: scores.get(&c.id).copied().unwrap_or(0.0),
                }).collect::<Vec<_>>(),
                "query_results": query_results.iter().map(|r| QueryResultDto {
                    chunk_id: r.chunk.id,
                    text: r.chunk.text.clone(),
                    score: r.score,
                }).collect::<Vec<_>>(),
            });
            return Ok((StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response());
        }
    };

    if let Some(session_id) = req.session_id {
        let now = chrono::Utc::now();
        let question_msg = Message {
            id: Uuid::new_v4(),
            session_id,
            role: MessageRole::User,
            kind: MessageType::Question,
            content: req.question.clone(),
            created_at: now,
            metadata: MessageMetadata::default(),
        };
        let answer_msg = Message {
            id: Uuid::new_v4(),
            session_id,
            role: MessageRole::Assistant,
            kind: MessageType::Answer,
            content: outcome.answer.clone(),
            created_at: chrono::Utc::now(),
            metadata: MessageMetadata {
                sources: Some(outcome.documents.iter().map(|c| c.id).collect()),
                usage: Some(outcome.metadata.token_usage.clone()),
                warnings: outcome.metadata.token_warning.clone().map(|w| vec![w]),
                cot_steps: outcome
                    .metadata
                    .cot_steps
                    .as_ref()
                    .map(|steps| steps.iter().map(|s| s.summary.clone()).collect()),
                config: None,
            },
        };
        state.sessions.append_message(session_id, question_msg).await?;
        state.sessions.append_message(session_id, answer_msg).await?;
    }

    let scores = score_by_chunk(&outcome.query_results);
    let response = SearchResponseDto {
        answer: outcome.answer,
        documents: outcome
            .documents
            .iter()
            .map(|c| DocumentDto { id: c.id, name: document_name(&c.metadata), score: scores.get(&c.id).copied().unwrap_or(0.0) })
            .collect(),
        query_results: outcome
            .query_results
            .iter()
            .map(|r| QueryResultDto { chunk_id: r.chunk.id, text: r.chunk.text.clone(), score: r.score })
            .collect(),
        execution_time_ms: outcome.execution_time.as_millis(),
        metadata: SearchMetadataDto {
            pipeline_id: outcome.metadata.pipeline_id,
            search_method: outcome.metadata.search_method,
            token_usage: outcome.metadata.token_usage,
            token_warning: outcome.metadata.token_warning,
            cot_steps: outcome.metadata.cot_steps.as_ref().map(|steps| steps.iter().map(ReasoningStepDto::from).collect()),
        },
    };

    Ok(Json(response).into_response())
}

// ---------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateSessionDto {
    user_id: Uuid,
    collection_id: Uuid,
    name: Option<String>,
    context_window_size: Option<u32>,
    max_messages: Option<u32>,
}

const DEFAULT_SESSION_CONTEXT_WINDOW: u32 = 8_000;
const DEFAULT_SESSION_MAX_MESSAGES: u32 = 200;

async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionDto>,
) -> Result<Json<ConversationSession>, ApiError> {
    let now = chrono::Utc::now();
    let session = ConversationSession {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        collection_id: req.collection_id,
        name: req.name.unwrap_or_else(|| "untitled session".to_string()),
        status: SessionStatus::Active,
        context_window_size: req.context_window_size.unwrap_or(DEFAULT_SESSION_CONTEXT_WINDOW),
        max_messages: req.max_messages.unwrap_or(DEFAULT_SESSION_MAX_MESSAGES),
        message_count: 0,
        created_at: now,
        updated_at: now,
    };
    state.sessions.create(&session).await?;
    Ok(Json(session))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ConversationSession>, ApiError> {
    let session = state.sessions.get(id).await?.ok_or_else(|| Error::NotFound(format!("session {id}")))?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
struct ConversationMessageRequestDto {
    content: String,
    role: MessageRole,
    #[serde(rename = "type")]
    kind: MessageType,
    metadata: Option<ConversationMessageMetadataDto>,
}

#[derive(Debug, Deserialize)]
struct ConversationMessageMetadataDto {
    config_metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct ConversationMessageResponseDto {
    message: Message,
    token_warning: Option<TokenWarning>,
}

async fn append_message(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<ConversationMessageRequestDto>,
) -> Result<Json<ConversationMessageResponseDto>, ApiError> {
    let session = state.sessions.get(session_id).await?.ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;

    // Config overrides attached to a plain message append have no
    // pipeline to flow into; validate the whitelist for observability
    // only, discarding the merged config (spec §4.9/§4.13).
    if let Some(metadata) = &req.metadata {
        if let Some(overrides) = &metadata.config_metadata {
            let base = state.config_store.get(session.user_id).await?;
            let _ = apply_request_overrides(&base, overrides);
        }
    }

    let message = Message {
        id: Uuid::new_v4(),
        session_id,
        role: req.role,
        kind: req.kind,
        content: req.content,
        created_at: chrono::Utc::now(),
        metadata: MessageMetadata::default(),
    };
    state.sessions.append_message(session_id, message.clone()).await?;

    let history = state.sessions.recent_messages(session_id, DEFAULT_CONTEXT_WINDOW_MESSAGES as i32).await?;
    let counter = HeuristicTokenCounter::for_model_family("default");
    let manager = ConversationContextManager::new(&counter);
    let built = manager.build(&history, DEFAULT_CONTEXT_WINDOW_MESSAGES, session.context_window_size, &message.content);

    Ok(Json(ConversationMessageResponseDto { message, token_warning: built.warning }))
}

// ---------------------------------------------------------------------
// Podcasts
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PodcastGenerateRequestDto {
    user_id: Uuid,
    collection_id: Uuid,
    duration: u32,
    format: String,
    host_voice: String,
    expert_voice: String,
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct PodcastStatusResponseDto {
    job_id: Uuid,
    status: PodcastStatus,
    progress_pct: u8,
    current_step: Option<String>,
    audio_url: Option<String>,
    audio_size_bytes: Option<u64>,
    transcript: Option<String>,
    error: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<PodcastJob> for PodcastStatusResponseDto {
    fn from(job: PodcastJob) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            progress_pct: job.progress_pct,
            current_step: Some(job.current_step),
            audio_url: job.audio_url,
            audio_size_bytes: job.audio_size,
            transcript: job.transcript,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

fn parse_format(format: &str) -> Result<AudioFormat, Error> {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => Ok(AudioFormat::Mp3),
        "wav" => Ok(AudioFormat::Wav),
        "ogg" => Ok(AudioFormat::Ogg),
        "flac" => Ok(AudioFormat::Flac),
        other => Err(Error::Validation(format!("unsupported audio format '{other}'"))),
    }
}

async fn generate_podcast(
    State(state): State<AppState>,
    Json(req): Json<PodcastGenerateRequestDto>,
) -> Result<Json<PodcastStatusResponseDto>, ApiError> {
    let duration_bucket = DurationBucket::from_minutes(req.duration)
        .ok_or_else(|| Error::Validation(format!("duration must be one of 5, 15, 30, 60 minutes, got {}", req.duration)))?;
    let format = parse_format(&req.format)?;

    let now = chrono::Utc::now();
    let job = PodcastJob {
        id: Uuid::new_v4(),
        user_id: req.user_id,
        collection_id: req.collection_id,
        title: req.title.unwrap_or_else(|| "untitled podcast".to_string()),
        duration_bucket,
        host_voice: req.host_voice,
        expert_voice: req.expert_voice,
        format,
        status: PodcastStatus::Queued,
        progress_pct: 0,
        current_step: "queued".to_string(),
        audio_url: None,
        audio_size: None,
        transcript: None,
        error: None,
        created_at: now,
        updated_at: now,
        completed_at: None,
    };

    state.podcast_queue.submit(job.clone()).await?;
    Ok(Json(job.into()))
}

async fn podcast_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PodcastStatusResponseDto>, ApiError> {
    let job = state.podcast_jobs.get(id).await?.ok_or_else(|| Error::NotFound(format!("podcast job {id}")))?;
    Ok(Json(job.into()))
}

async fn podcast_audio(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: axum::http::HeaderMap,
) -> Result<Response, ApiError> {
    let job = state.podcast_jobs.get(id).await?.ok_or_else(|| Error::NotFound(format!("podcast job {id}")))?;
    let audio_url = job.audio_url.ok_or_else(|| Error::Validation(format!("podcast job {id} has no audio yet")))?;

    let bytes = state
        .blob_store
        .get(&audio_url)
        .await
        .map_err(|e| Error::Internal(format!("failed to read podcast audio: {e}")))?;
    let total = bytes.len() as u64;
    let content_type = mime_for_format(job.format);

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());
    match parse_range(range_header, total) {
        RangeOutcome::Unsatisfiable => Ok((
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{total}"))],
        )
            .into_response()),
        RangeOutcome::Full => {
            let body = stream_body(bytes);
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_LENGTH, total.to_string()),
                ],
                body,
            )
                .into_response())
        }
        RangeOutcome::Partial { start, end } => {
            let slice = bytes[start as usize..=end as usize].to_vec();
            let length = slice.len() as u64;
            let body = stream_body(slice);
            Ok((
                StatusCode::PARTIAL_CONTENT,
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (header::ACCEPT_RANGES, "bytes".to_string()),
                    (header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}")),
                    (header::CONTENT_LENGTH, length.to_string()),
                ],
                body,
            )
                .into_response())
        }
    }
}

fn mime_for_format(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "audio/mpeg",
        AudioFormat::Wav => "audio/wav",
        AudioFormat::Ogg => "audio/ogg",
        AudioFormat::Flac => "audio/flac",
    }
}

fn stream_body(bytes: Vec<u8>) -> Body {
    let chunks: Vec<Result<axum::body::Bytes, std::io::Error>> =
        bytes.chunks(STREAM_CHUNK_SIZE).map(|c| Ok(axum::body::Bytes::copy_from_slice(c))).collect();
    Body::from_stream(stream::iter(chunks))
}
