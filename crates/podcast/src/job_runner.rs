//! PodcastJobRunner (C11, spec §4.11): retrieve -> script -> parse ->
//! audio -> store, driven by the [`JobFsm`] state machine, with
//! compensating cleanup on failure.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use ragflow_config::{ConfigStore, PromptTemplateStore, PODCAST_SCRIPT};
use ragflow_core::{
    AudioFormat, Error, GenerateParams, PipelineConfig, PodcastEvent,
    PodcastFsm, PodcastJob, PodcastStatus, Result,
};
use ragflow_llm::ProviderRegistry;
use ragflow_persistence::{PodcastJobStore, VoiceStore};
use ragflow_pipeline::search_pipeline::{self, SearchPipelineDeps, SearchRequest};
use ragflow_rag::VectorStore;

use crate::blob_store::BlobStore;
use crate::fsm::JobFsm;
use crate::script_parser;
use crate::stitch;
use crate::voice_resolution;

/// Wraps a real [`ConfigStore`] and substitutes `top_k_retrieval` /
/// `cot_enabled` for the duration of one internal C10 call, without
/// mutating the user's persisted config (spec §4.11: "top_k_retrieval
/// scaled to duration bucket ... and CoT disabled").
struct RetrievalOnlyConfigStore<'a> {
    inner: &'a dyn ConfigStore,
    top_k_retrieval: u32,
}

#[async_trait]
impl ConfigStore for RetrievalOnlyConfigStore<'_> {
    async fn get(&self, user_id: Uuid) -> Result<PipelineConfig> {
        let mut config = self.inner.get(user_id).await?;
        config.top_k_retrieval = self.top_k_retrieval;
        config.cot_enabled = false;
        Ok(config)
    }

    async fn put(&self, config: PipelineConfig) -> Result<()> {
        self.inner.put(config).await
    }
}

pub struct JobRunnerDeps<'a> {
    pub registry: &'a ProviderRegistry,
    pub config_store: &'a dyn ConfigStore,
    pub templates: &'a dyn PromptTemplateStore,
    pub vector_store: &'a dyn VectorStore,
    pub podcast_jobs: &'a dyn PodcastJobStore,
    pub voices: &'a dyn VoiceStore,
    pub blob_store: &'a dyn BlobStore,
}

/// Summarization prompt fed to the internal C10 call; there is no literal
/// user question for a podcast, so a fixed synthesis question stands in.
const SUMMARY_QUESTION: &str =
    "Provide a comprehensive summary of the key topics, facts, and insights in this collection.";

pub async fn run(deps: &JobRunnerDeps<'_>, mut job: PodcastJob) -> Result<PodcastJob> {
    let mut fsm = JobFsm::new();
    let mut stored_audio_url: Option<String> = None;

    let outcome = run_inner(deps, &mut job, &mut fsm, &mut stored_audio_url).await;

    match outcome {
        Ok(job) => Ok(job),
        Err(err) => {
            if let Some(url) = stored_audio_url.take() {
                if let Err(cleanup_err) = deps.blob_store.delete(&url).await {
                    tracing::warn!(error = %cleanup_err, url, "failed to clean up orphaned podcast audio");
                }
            }
            let _ = fsm.apply(PodcastEvent::Failed { reason: err.to_string() });
            job.status = PodcastStatus::Failed;
            job.progress_pct = fsm.progress_pct();
            job.error = Some(err.to_string());
            job.updated_at = chrono::Utc::now();
            deps.podcast_jobs.update(&job).await?;
            Err(err)
        }
    }
}

async fn run_inner(
    deps: &JobRunnerDeps<'_>,
    job: &mut PodcastJob,
    fsm: &mut JobFsm,
    stored_audio_url: &mut Option<String>,
) -> Result<PodcastJob> {
    job.status = PodcastStatus::Generating;

    // --- Retrieval ---
    fsm.apply(PodcastEvent::RetrievalStarted).map_err(|e| Error::Internal(e.to_string()))?;
    report_progress(deps, job, fsm).await?;

    let retrieval_config_store =
        RetrievalOnlyConfigStore { inner: deps.config_store, top_k_retrieval: job.duration_bucket.retrieval_top_k() };
    let llm_model_id = deps.config_store.get(job.user_id).await?.model_id;
    let llm = deps
        .registry
        .get_llm(&llm_model_id)
        .await
        .map_err(|e| Error::ProviderPermanent(e.message))?;
    let embedder = deps
        .registry
        .get_embedder("default")
        .await
        .map_err(|e| Error::ProviderPermanent(e.message))?;

    let search_deps = SearchPipelineDeps {
        config_store: &retrieval_config_store,
        templates: deps.templates,
        vector_store: deps.vector_store,
        embedder: embedder.as_ref(),
        llm: llm.as_ref(),
        reranker: None,
    };
    let search_outcome = search_pipeline::run(
        &search_deps,
        SearchRequest {
            question: SUMMARY_QUESTION,
            collection_id: job.collection_id,
            user_id: job.user_id,
            session_history: None,
            config_overrides: None,
        },
    )
    .await
    .map_err(|partial| Error::Validation(partial.message))?;

    if search_outcome.documents.is_empty() {
        return Err(Error::Validation("collection has no retrievable documents".to_string()));
    }

    fsm.apply(PodcastEvent::RetrievalCompleted { chunk_count: search_outcome.documents.len() })
        .map_err(|e| Error::Internal(e.to_string()))?;
    report_progress(deps, job, fsm).await?;

    // --- Script ---
    fsm.apply(PodcastEvent::ScriptStarted).map_err(|e| Error::Internal(e.to_string()))?;
    let material = search_outcome
        .documents
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n");
    let mut vars = HashMap::new();
    vars.insert("target_words".to_string(), job.duration_bucket.target_word_count().to_string());
    vars.insert("context".to_string(), material);
    let prompt = deps.templates.render(PODCAST_SCRIPT, Some(job.user_id), &vars)?;
    let (script, _usage) = llm
        .generate(&prompt, &GenerateParams { max_tokens: 4096, temperature: 0.6, top_p: 0.9 })
        .await
        .map_err(|e| Error::ProviderPermanent(e.message))?;

    fsm.apply(PodcastEvent::ScriptCompleted { word_count: script.split_whitespace().count() })
        .map_err(|e| Error::Internal(e.to_string()))?;
    report_progress(deps, job, fsm).await?;

    // --- Parse ---
    fsm.apply(PodcastEvent::ParseStarted).map_err(|e| Error::Internal(e.to_string()))?;
    let turns = script_parser::parse(&script).map_err(|e| Error::Validation(e.to_string()))?;
    job.transcript = Some(script_parser::serialize(&turns));
    fsm.apply(PodcastEvent::ParseCompleted { turn_count: turns.len() }).map_err(|e| Error::Internal(e.to_string()))?;
    report_progress(deps, job, fsm).await?;

    // --- Audio ---
    // Provider instances themselves are cached by `ProviderRegistry`, keyed
    // by provider name, so resolving per turn here still constructs each
    // backend exactly once per job (scenario E).
    fsm.apply(PodcastEvent::AudioStarted).map_err(|e| Error::Internal(e.to_string()))?;
    let mut clips = Vec::with_capacity(turns.len());
    for (i, turn) in turns.iter().enumerate() {
        let voice_id = match turn.speaker {
            script_parser::Speaker::Host => &job.host_voice,
            script_parser::Speaker::Expert => &job.expert_voice,
        };
        let resolved = voice_resolution::resolve(deps.registry, deps.voices, job.user_id, voice_id).await?;
        let clip = resolved
            .provider
            .synthesize_turn(&resolved.provider_voice_id, &turn.text, 1.0, 1.0, AudioFormat::Wav)
            .await
            .map_err(|e| Error::ProviderPermanent(e.message))?;
        clips.push(clip);
        fsm.apply(PodcastEvent::AudioTurnSynthesized { turn_index: i, total_turns: turns.len() })
            .map_err(|e| Error::Internal(e.to_string()))?;
        report_progress(deps, job, fsm).await?;
    }
    let stitched = stitch::stitch(&clips, job.format).map_err(|e| Error::Internal(e.to_string()))?;
    fsm.apply(PodcastEvent::AudioCompleted).map_err(|e| Error::Internal(e.to_string()))?;
    report_progress(deps, job, fsm).await?;

    // --- Store ---
    fsm.apply(PodcastEvent::StoreStarted).map_err(|e| Error::Internal(e.to_string()))?;
    let content_type = match job.format {
        AudioFormat::Mp3 => "audio/mpeg",
        AudioFormat::Wav => "audio/wav",
        AudioFormat::Ogg => "audio/ogg",
        AudioFormat::Flac => "audio/flac",
    };
    let audio_size = stitched.len() as u64;
    let url = deps
        .blob_store
        .put(&format!("podcast-{}", job.id), stitched, content_type)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;
    *stored_audio_url = Some(url.clone());
    job.audio_url = Some(url.clone());
    job.audio_size = Some(audio_size);
    fsm.apply(PodcastEvent::StoreCompleted { audio_url: url, audio_size })
        .map_err(|e| Error::Internal(e.to_string()))?;

    job.status = PodcastStatus::Completed;
    job.progress_pct = fsm.progress_pct();
    job.completed_at = Some(chrono::Utc::now());
    job.updated_at = chrono::Utc::now();
    deps.podcast_jobs.update(job).await?;

    Ok(job.clone())
}

async fn report_progress(deps: &JobRunnerDeps<'_>, job: &mut PodcastJob, fsm: &JobFsm) -> Result<()> {
    job.status = fsm.status();
    job.progress_pct = fsm.progress_pct();
    job.current_step = fsm.current_step().to_string();
    job.updated_at = chrono::Utc::now();
    deps.podcast_jobs.update(job).await
}

/// Marks non-terminal jobs orphaned by a crashed worker as FAILED (spec
/// §4.12), run once at process startup before the queue accepts new work.
pub async fn recover_orphaned_jobs(podcast_jobs: &dyn PodcastJobStore) -> Result<usize> {
    let orphans = podcast_jobs.list_non_terminal().await?;
    let count = orphans.len();
    for mut job in orphans {
        job.status = PodcastStatus::Failed;
        job.error = Some("worker loss".to_string());
        job.updated_at = chrono::Utc::now();
        podcast_jobs.update(&job).await?;
    }
    if count > 0 {
        tracing::warn!(count, "recovered podcast jobs orphaned by a crashed worker");
    }
    Ok(count)
}
