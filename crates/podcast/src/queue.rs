//! JobQueue & Progress (C12, spec §4.12): a bounded in-process worker pool
//! on top of the durable `podcast_jobs` store, publishing `{job_id, pct,
//! step}` progress events.
//!
//! A bounded `tokio::sync::mpsc` channel drained by `tokio::spawn`ed
//! background tasks in a fixed worker pool pulling off a shared queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use ragflow_config::{ConfigStore, PromptTemplateStore};
use ragflow_core::{Error, PodcastJob, PodcastStatus, Result};
use ragflow_llm::ProviderRegistry;
use ragflow_persistence::{PodcastJobStore, VoiceStore};
use ragflow_rag::VectorStore;

use crate::blob_store::BlobStore;
use crate::job_runner::{self, JobRunnerDeps};
use crate::voice_resolution;

pub const DEFAULT_MAX_CONCURRENT_PER_USER: usize = 3;
/// spec.md leaves the exact minimum undefined ("collection must have ≥
/// `min_documents`"); one retrievable chunk is the smallest collection a
/// podcast can meaningfully summarize.
pub const DEFAULT_MIN_DOCUMENTS: usize = 1;
const QUEUE_CAPACITY: usize = 256;
const WORKER_COUNT: usize = 4;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub pct: u8,
    pub step: String,
}

/// Shared, `Clone`-able collaborators every worker needs; built once at
/// process start and handed to each spawned worker task.
pub struct QueueDeps {
    pub registry: Arc<ProviderRegistry>,
    pub config_store: Arc<dyn ConfigStore>,
    pub templates: Arc<dyn PromptTemplateStore>,
    pub vector_store: Arc<dyn VectorStore>,
    pub podcast_jobs: Arc<dyn PodcastJobStore>,
    pub voices: Arc<dyn VoiceStore>,
    pub blob_store: Arc<dyn BlobStore>,
}

pub struct JobQueue {
    sender: mpsc::Sender<Uuid>,
    deps: Arc<QueueDeps>,
}

impl JobQueue {
    /// Spawns the fixed worker pool and returns the queue handle plus the
    /// progress observer channel.
    pub fn start(deps: QueueDeps) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let deps = Arc::new(deps);
        let (sender, receiver) = mpsc::channel::<Uuid>(QUEUE_CAPACITY);
        let (progress_tx, progress_rx) = mpsc::channel::<ProgressEvent>(QUEUE_CAPACITY);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker_id in 0..WORKER_COUNT {
            let receiver = receiver.clone();
            let deps = deps.clone();
            let progress_tx = progress_tx.clone();
            tokio::spawn(async move {
                loop {
                    let job_id = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };
                    let Some(job_id) = job_id else { break };
                    tracing::debug!(worker_id, %job_id, "podcast worker picked up job");
                    run_job(&deps, job_id, &progress_tx).await;
                }
            });
        }

        (Self { sender, deps }, progress_rx)
    }

    /// Validates and enqueues a new job (spec §4.11 "Validation at
    /// submission"). Fails fast and synchronously; nothing is enqueued on
    /// error.
    pub async fn submit(&self, job: PodcastJob) -> Result<()> {
        self.validate(&job).await?;
        self.deps.podcast_jobs.create(&job).await?;
        self.sender
            .try_send(job.id)
            .map_err(|_| Error::Validation("podcast job queue is at capacity".to_string()))
    }

    /// Runs the startup recovery pass (spec §4.12) before the queue is
    /// opened to new submissions.
    pub async fn recover(podcast_jobs: &dyn PodcastJobStore) -> Result<usize> {
        job_runner::recover_orphaned_jobs(podcast_jobs).await
    }

    async fn validate(&self, job: &PodcastJob) -> Result<()> {
        let active = self.deps.podcast_jobs.active_count_for_user(job.user_id).await?;
        if active >= DEFAULT_MAX_CONCURRENT_PER_USER {
            return Err(Error::Validation(format!(
                "user already has {active} podcast jobs in progress (max {DEFAULT_MAX_CONCURRENT_PER_USER})"
            )));
        }

        voice_resolution::validate(self.deps.voices.as_ref(), job.user_id, &job.host_voice).await?;
        voice_resolution::validate(self.deps.voices.as_ref(), job.user_id, &job.expert_voice).await?;

        let embedder = self
            .deps
            .registry
            .get_embedder("default")
            .await
            .map_err(|e| Error::ProviderPermanent(e.message))?;
        let probe = embedder
            .embed(&["podcast collection size probe".to_string()])
            .await
            .map_err(|e| Error::ProviderPermanent(e.message))?;
        let query_vec = probe.into_iter().next().unwrap_or_default();
        let sample = self
            .deps
            .vector_store
            .search(job.collection_id, &query_vec, DEFAULT_MIN_DOCUMENTS, None)
            .await?;
        if sample.len() < DEFAULT_MIN_DOCUMENTS {
            return Err(Error::Validation(format!(
                "collection has fewer than {DEFAULT_MIN_DOCUMENTS} documents"
            )));
        }

        Ok(())
    }
}

async fn run_job(deps: &QueueDeps, job_id: Uuid, progress_tx: &mpsc::Sender<ProgressEvent>) {
    let job = match deps.podcast_jobs.get(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            tracing::error!(%job_id, "queued job vanished from the store");
            return;
        }
        Err(err) => {
            tracing::error!(%job_id, error = %err, "failed to load queued job");
            return;
        }
    };

    let runner_deps = JobRunnerDeps {
        registry: deps.registry.as_ref(),
        config_store: deps.config_store.as_ref(),
        templates: deps.templates.as_ref(),
        vector_store: deps.vector_store.as_ref(),
        podcast_jobs: deps.podcast_jobs.as_ref(),
        voices: deps.voices.as_ref(),
        blob_store: deps.blob_store.as_ref(),
    };

    let _ = progress_tx
        .send(ProgressEvent { job_id, pct: 0, step: "queued".to_string() })
        .await;

    match job_runner::run(&runner_deps, job).await {
        Ok(job) => {
            let _ = progress_tx
                .send(ProgressEvent { job_id, pct: job.progress_pct, step: "completed".to_string() })
                .await;
        }
        Err(err) => {
            tracing::warn!(%job_id, error = %err, "podcast job failed");
            let _ = progress_tx.send(ProgressEvent { job_id, pct: 0, step: "failed".to_string() }).await;
        }
    }
}

/// Cancels a queued-or-generating job: transitions it to CANCELLED and
/// runs the same cleanup path as a failure (spec §5). The worker loop
/// itself has no preemption point mid-job in this design, so cancellation
/// only takes effect between steps the next time progress is persisted —
/// submitters are expected to poll status rather than assume immediacy.
pub async fn cancel(podcast_jobs: &dyn PodcastJobStore, job_id: Uuid) -> Result<()> {
    let mut job = podcast_jobs.get(job_id).await?.ok_or_else(|| Error::NotFound(format!("podcast job {job_id}")))?;
    if job.status.is_terminal() {
        return Err(Error::Validation(format!("job {job_id} is already in a terminal state")));
    }
    job.status = PodcastStatus::Cancelled;
    job.error = Some("cancelled by submitter".to_string());
    job.updated_at = chrono::Utc::now();
    podcast_jobs.update(&job).await
}
