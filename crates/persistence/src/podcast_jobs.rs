//! ScyllaDB-backed [`PodcastJob`] store (spec §3, §4.11, §4.12). The
//! `podcast_jobs_by_user` side table exists purely to answer "how many
//! non-terminal jobs does this user have" without a full scan, for the
//! `max_concurrent_per_user` admission check in C11.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragflow_core::{
    AudioFormat, DurationBucket, Error, PodcastJob, PodcastStatus, Result,
};
use scylla::{FromRow, SerializeRow};
use uuid::Uuid;

use crate::client::ScyllaClient;

#[derive(SerializeRow)]
struct PodcastJobInsertRow<'a> {
    id: Uuid,
    user_id: Uuid,
    collection_id: Uuid,
    title: &'a str,
    duration_bucket: &'static str,
    host_voice: &'a str,
    expert_voice: &'a str,
    format: &'static str,
    status: &'static str,
    progress_pct: i32,
    current_step: &'a str,
    audio_url: &'a Option<String>,
    audio_size: Option<i64>,
    transcript: &'a Option<String>,
    error: &'a Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

#[derive(FromRow)]
struct PodcastJobSelectRow {
    id: Uuid,
    user_id: Uuid,
    collection_id: Uuid,
    title: String,
    duration_bucket: String,
    host_voice: String,
    expert_voice: String,
    format: String,
    status: String,
    progress_pct: i32,
    current_step: String,
    audio_url: Option<String>,
    audio_size: Option<i64>,
    transcript: Option<String>,
    error: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

#[async_trait]
pub trait PodcastJobStore: Send + Sync {
    async fn create(&self, job: &PodcastJob) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<PodcastJob>>;
    async fn update(&self, job: &PodcastJob) -> Result<()>;
    async fn active_count_for_user(&self, user_id: Uuid) -> Result<usize>;

    /// Every job not in a terminal status, used once at process startup to
    /// fail jobs orphaned by a crashed worker (spec §4.12: "the system is
    /// not required to resume mid-job").
    async fn list_non_terminal(&self) -> Result<Vec<PodcastJob>>;
}

#[derive(Clone)]
pub struct ScyllaPodcastJobStore {
    client: ScyllaClient,
}

impl ScyllaPodcastJobStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

fn bucket_str(bucket: DurationBucket) -> &'static str {
    match bucket {
        DurationBucket::Short => "SHORT",
        DurationBucket::Medium => "MEDIUM",
        DurationBucket::Long => "LONG",
        DurationBucket::Extended => "EXTENDED",
    }
}

fn bucket_from_str(s: &str) -> DurationBucket {
    match s {
        "MEDIUM" => DurationBucket::Medium,
        "LONG" => DurationBucket::Long,
        "EXTENDED" => DurationBucket::Extended,
        _ => DurationBucket::Short,
    }
}

fn format_str(format: AudioFormat) -> &'static str {
    match format {
        AudioFormat::Mp3 => "mp3",
        AudioFormat::Wav => "wav",
        AudioFormat::Ogg => "ogg",
        AudioFormat::Flac => "flac",
    }
}

fn format_from_str(s: &str) -> AudioFormat {
    match s {
        "wav" => AudioFormat::Wav,
        "ogg" => AudioFormat::Ogg,
        "flac" => AudioFormat::Flac,
        _ => AudioFormat::Mp3,
    }
}

fn status_str(status: PodcastStatus) -> &'static str {
    match status {
        PodcastStatus::Queued => "QUEUED",
        PodcastStatus::Generating => "GENERATING",
        PodcastStatus::Completed => "COMPLETED",
        PodcastStatus::Failed => "FAILED",
        PodcastStatus::Cancelled => "CANCELLED",
    }
}

fn status_from_str(s: &str) -> PodcastStatus {
    match s {
        "GENERATING" => PodcastStatus::Generating,
        "COMPLETED" => PodcastStatus::Completed,
        "FAILED" => PodcastStatus::Failed,
        "CANCELLED" => PodcastStatus::Cancelled,
        _ => PodcastStatus::Queued,
    }
}

#[async_trait]
impl PodcastJobStore for ScyllaPodcastJobStore {
    async fn create(&self, job: &PodcastJob) -> Result<()> {
        let insert = format!(
            "INSERT INTO {}.podcast_jobs (
                id, user_id, collection_id, title, duration_bucket, host_voice, expert_voice,
                format, status, progress_pct, current_step, audio_url, audio_size, transcript,
                error, created_at, updated_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                insert,
                PodcastJobInsertRow {
                    id: job.id,
                    user_id: job.user_id,
                    collection_id: job.collection_id,
                    title: &job.title,
                    duration_bucket: bucket_str(job.duration_bucket),
                    host_voice: &job.host_voice,
                    expert_voice: &job.expert_voice,
                    format: format_str(job.format),
                    status: status_str(job.status),
                    progress_pct: job.progress_pct as i32,
                    current_step: &job.current_step,
                    audio_url: &job.audio_url,
                    audio_size: job.audio_size.map(|s| s as i64),
                    transcript: &job.transcript,
                    error: &job.error,
                    created_at: job.created_at.timestamp_millis(),
                    updated_at: job.updated_at.timestamp_millis(),
                    completed_at: job.completed_at.map(|t| t.timestamp_millis()),
                },
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let by_user = format!(
            "INSERT INTO {}.podcast_jobs_by_user (user_id, created_at, id, status) VALUES (?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(by_user, (job.user_id, job.created_at.timestamp_millis(), job.id, status_str(job.status)))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<PodcastJob>> {
        let query = format!(
            "SELECT id, user_id, collection_id, title, duration_bucket, host_voice, expert_voice,
                    format, status, progress_pct, current_step, audio_url, audio_size, transcript,
                    error, created_at, updated_at, completed_at
             FROM {}.podcast_jobs WHERE id = ?",
            self.client.keyspace()
        );
        let result =
            self.client.session().query_unpaged(query, (id,)).await.map_err(|e| Error::Internal(e.to_string()))?;

        let Some(rows) = result.rows else { return Ok(None) };
        let Some(row) = rows.into_iter().next() else { return Ok(None) };

        let PodcastJobSelectRow {
            id,
            user_id,
            collection_id,
            title,
            duration_bucket,
            host_voice,
            expert_voice,
            format,
            status,
            progress_pct,
            current_step,
            audio_url,
            audio_size,
            transcript,
            error,
            created_at,
            updated_at,
            completed_at,
        } = row.into_typed().map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Some(PodcastJob {
            id,
            user_id,
            collection_id,
            title,
            duration_bucket: bucket_from_str(&duration_bucket),
            host_voice,
            expert_voice,
            format: format_from_str(&format),
            status: status_from_str(&status),
            progress_pct: progress_pct as u8,
            current_step,
            audio_url,
            audio_size: audio_size.map(|s| s as u64),
            transcript,
            error,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
            completed_at: completed_at.and_then(DateTime::from_timestamp_millis),
        }))
    }

    async fn update(&self, job: &PodcastJob) -> Result<()> {
        let update = format!(
            "UPDATE {}.podcast_jobs SET status = ?, progress_pct = ?, current_step = ?,
                audio_url = ?, audio_size = ?, transcript = ?, error = ?, updated_at = ?,
                completed_at = ?
             WHERE id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                update,
                (
                    status_str(job.status),
                    job.progress_pct as i32,
                    &job.current_step,
                    &job.audio_url,
                    job.audio_size.map(|s| s as i64),
                    &job.transcript,
                    &job.error,
                    job.updated_at.timestamp_millis(),
                    job.completed_at.map(|t| t.timestamp_millis()),
                    job.id,
                ),
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let by_user = format!(
            "UPDATE {}.podcast_jobs_by_user SET status = ? WHERE user_id = ? AND created_at = ? AND id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(by_user, (status_str(job.status), job.user_id, job.created_at.timestamp_millis(), job.id))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(())
    }

    async fn active_count_for_user(&self, user_id: Uuid) -> Result<usize> {
        let query = format!(
            "SELECT status FROM {}.podcast_jobs_by_user WHERE user_id = ?",
            self.client.keyspace()
        );
        let result =
            self.client.session().query_unpaged(query, (user_id,)).await.map_err(|e| Error::Internal(e.to_string()))?;

        let mut active = 0usize;
        if let Some(rows) = result.rows {
            for row in rows {
                let (status,): (String,) = row.into_typed().map_err(|e| Error::Internal(e.to_string()))?;
                if !status_from_str(&status).is_terminal() {
                    active += 1;
                }
            }
        }
        Ok(active)
    }

    async fn list_non_terminal(&self) -> Result<Vec<PodcastJob>> {
        let query = format!(
            "SELECT id FROM {}.podcast_jobs WHERE status IN ('QUEUED', 'GENERATING') ALLOW FILTERING",
            self.client.keyspace()
        );
        let result =
            self.client.session().query_unpaged(query, &[]).await.map_err(|e| Error::Internal(e.to_string()))?;

        let mut ids = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (id,): (Uuid,) = row.into_typed().map_err(|e| Error::Internal(e.to_string()))?;
                ids.push(id);
            }
        }

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(job) = self.get(id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}
