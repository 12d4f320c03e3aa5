//! ScyllaDB-backed [`ConfigStore`] (C13, spec §4.13): durable counterpart
//! to `ragflow-config`'s `InMemoryConfigStore`, same "create defaults on
//! first read, last-writer-wins" contract.

use async_trait::async_trait;
use ragflow_config::ConfigStore;
use ragflow_core::{Error, PipelineConfig, Result};
use uuid::Uuid;

use crate::client::ScyllaClient;

#[derive(Clone)]
pub struct ScyllaConfigStore {
    client: ScyllaClient,
}

impl ScyllaConfigStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_config(row: scylla::frame::response::result::Row, user_id: Uuid) -> Result<PipelineConfig> {
        let (
            provider,
            model_id,
            max_tokens,
            temperature,
            top_p,
            top_k_retrieval,
            top_k_final,
            rerank_enabled,
            rerank_model,
            cot_enabled,
            cot_max_depth,
            cot_quality_threshold,
            cot_max_retries,
        ): (String, String, i32, f32, f32, i32, i32, bool, String, bool, i32, f32, i32) = row
            .into_typed()
            .map_err(|e| Error::Internal(e.to_string()))?;

        Ok(PipelineConfig {
            user_id,
            provider,
            model_id,
            max_tokens: max_tokens as u32,
            temperature,
            top_p,
            top_k_retrieval: top_k_retrieval as u32,
            top_k_final: top_k_final as u32,
            rerank_enabled,
            rerank_model,
            cot_enabled,
            cot_max_depth: cot_max_depth as u32,
            cot_quality_threshold,
            cot_max_retries: cot_max_retries as u32,
        })
    }
}

#[async_trait]
impl ConfigStore for ScyllaConfigStore {
    async fn get(&self, user_id: Uuid) -> Result<PipelineConfig> {
        let query = format!(
            "SELECT provider, model_id, max_tokens, temperature, top_p, top_k_retrieval,
                    top_k_final, rerank_enabled, rerank_model, cot_enabled, cot_max_depth,
                    cot_quality_threshold, cot_max_retries
             FROM {}.pipeline_configs WHERE user_id = ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id,))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Self::row_to_config(row, user_id);
            }
        }

        let defaults = PipelineConfig::default_for(user_id);
        self.put(defaults.clone()).await?;
        Ok(defaults)
    }

    async fn put(&self, config: PipelineConfig) -> Result<()> {
        let query = format!(
            "INSERT INTO {}.pipeline_configs (
                user_id, provider, model_id, max_tokens, temperature, top_p, top_k_retrieval,
                top_k_final, rerank_enabled, rerank_model, cot_enabled, cot_max_depth,
                cot_quality_threshold, cot_max_retries
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    config.user_id,
                    &config.provider,
                    &config.model_id,
                    config.max_tokens as i32,
                    config.temperature,
                    config.top_p,
                    config.top_k_retrieval as i32,
                    config.top_k_final as i32,
                    config.rerank_enabled,
                    &config.rerank_model,
                    config.cot_enabled,
                    config.cot_max_depth as i32,
                    config.cot_quality_threshold,
                    config.cot_max_retries as i32,
                ),
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }
}
