//! ScyllaDB-backed [`Voice`] store (spec §3): custom TTS voices, owned
//! per-user, only `READY` voices usable in a podcast job.

use async_trait::async_trait;
use ragflow_core::{Error, Result, Voice, VoiceStatus};
use uuid::Uuid;

use crate::client::ScyllaClient;

#[async_trait]
pub trait VoiceStore: Send + Sync {
    async fn create(&self, voice: &Voice) -> Result<()>;
    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Voice>>;
    async fn update_status(&self, user_id: Uuid, id: Uuid, status: VoiceStatus, provider_voice_id: Option<String>) -> Result<()>;
    async fn increment_times_used(&self, user_id: Uuid, id: Uuid) -> Result<()>;
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Voice>>;
}

#[derive(Clone)]
pub struct ScyllaVoiceStore {
    client: ScyllaClient,
}

impl ScyllaVoiceStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_voice(row: scylla::frame::response::result::Row) -> Result<Voice> {
        let (user_id, id, name, status, provider_name, provider_voice_id, sample_ref, times_used, quality_score): (
            Uuid,
            Uuid,
            String,
            String,
            String,
            Option<String>,
            String,
            i32,
            Option<f32>,
        ) = row.into_typed().map_err(|e| Error::Internal(e.to_string()))?;

        Ok(Voice {
            id,
            user_id,
            name,
            status: status_from_str(&status),
            provider_name,
            provider_voice_id,
            sample_ref,
            times_used: times_used as u32,
            quality_score,
        })
    }
}

fn status_str(status: VoiceStatus) -> &'static str {
    match status {
        VoiceStatus::Uploading => "UPLOADING",
        VoiceStatus::Processing => "PROCESSING",
        VoiceStatus::Ready => "READY",
        VoiceStatus::Failed => "FAILED",
    }
}

fn status_from_str(s: &str) -> VoiceStatus {
    match s {
        "PROCESSING" => VoiceStatus::Processing,
        "READY" => VoiceStatus::Ready,
        "FAILED" => VoiceStatus::Failed,
        _ => VoiceStatus::Uploading,
    }
}

#[async_trait]
impl VoiceStore for ScyllaVoiceStore {
    async fn create(&self, voice: &Voice) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.voices (
                user_id, id, name, status, provider_name, provider_voice_id, sample_ref,
                times_used, quality_score
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    voice.user_id,
                    voice.id,
                    &voice.name,
                    status_str(voice.status),
                    &voice.provider_name,
                    &voice.provider_voice_id,
                    &voice.sample_ref,
                    voice.times_used as i32,
                    voice.quality_score,
                ),
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, user_id: Uuid, id: Uuid) -> Result<Option<Voice>> {
        let query = format!(
            "SELECT user_id, id, name, status, provider_name, provider_voice_id, sample_ref,
                    times_used, quality_score
             FROM {}.voices WHERE user_id = ? AND id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, id))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let Some(rows) = result.rows else { return Ok(None) };
        match rows.into_iter().next() {
            Some(row) => Ok(Some(Self::row_to_voice(row)?)),
            None => Ok(None),
        }
    }

    async fn update_status(&self, user_id: Uuid, id: Uuid, status: VoiceStatus, provider_voice_id: Option<String>) -> Result<()> {
        let query = format!(
            "UPDATE {}.voices SET status = ?, provider_voice_id = ? WHERE user_id = ? AND id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (status_str(status), provider_voice_id, user_id, id))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }

    async fn increment_times_used(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        let voice = self.get(user_id, id).await?.ok_or_else(|| Error::NotFound(format!("voice {id}")))?;
        let query = format!("UPDATE {}.voices SET times_used = ? WHERE user_id = ? AND id = ?", self.client.keyspace());
        self.client
            .session()
            .query_unpaged(query, (voice.times_used as i32 + 1, user_id, id))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Voice>> {
        let query = format!(
            "SELECT user_id, id, name, status, provider_name, provider_voice_id, sample_ref,
                    times_used, quality_score
             FROM {}.voices WHERE user_id = ?",
            self.client.keyspace()
        );
        let result =
            self.client.session().query_unpaged(query, (user_id,)).await.map_err(|e| Error::Internal(e.to_string()))?;
        let mut voices = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                voices.push(Self::row_to_voice(row)?);
            }
        }
        Ok(voices)
    }
}
