//! ScyllaDB-backed, append-only `token_usage` table (spec §3, §6). Records
//! every [`LLMUsage`] the providers return; never estimated, never
//! mutated after insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ragflow_core::{Error, LLMUsage, Result, UsageService};
use uuid::Uuid;

use crate::client::ScyllaClient;

#[async_trait]
pub trait TokenUsageStore: Send + Sync {
    async fn record(&self, usage: &LLMUsage) -> Result<()>;

    /// Most recent usage rows for a user, newest first.
    async fn history_for_user(&self, user_id: Uuid, limit: i32) -> Result<Vec<LLMUsage>>;
}

#[derive(Clone)]
pub struct ScyllaTokenUsageStore {
    client: ScyllaClient,
}

impl ScyllaTokenUsageStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

fn service_str(service: UsageService) -> &'static str {
    match service {
        UsageService::Search => "SEARCH",
        UsageService::Conversation => "CONVERSATION",
        UsageService::Cot => "COT",
        UsageService::QuestionGen => "QUESTION_GEN",
        UsageService::PodcastScript => "PODCAST_SCRIPT",
    }
}

fn service_from_str(s: &str) -> UsageService {
    match s {
        "CONVERSATION" => UsageService::Conversation,
        "COT" => UsageService::Cot,
        "QUESTION_GEN" => UsageService::QuestionGen,
        "PODCAST_SCRIPT" => UsageService::PodcastScript,
        _ => UsageService::Search,
    }
}

#[async_trait]
impl TokenUsageStore for ScyllaTokenUsageStore {
    async fn record(&self, usage: &LLMUsage) -> Result<()> {
        let user_id = usage.user_id.ok_or_else(|| {
            Error::Validation("token usage without a user_id cannot be persisted".to_string())
        })?;
        let query = format!(
            "INSERT INTO {}.token_usage (
                user_id, at, id, prompt_tokens, completion_tokens, total_tokens, model_id,
                service, session_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(
                query,
                (
                    user_id,
                    usage.at.timestamp_millis(),
                    Uuid::new_v4(),
                    usage.prompt_tokens as i32,
                    usage.completion_tokens as i32,
                    usage.total_tokens as i32,
                    &usage.model_id,
                    service_str(usage.service),
                    usage.session_id,
                ),
            )
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(())
    }

    async fn history_for_user(&self, user_id: Uuid, limit: i32) -> Result<Vec<LLMUsage>> {
        let query = format!(
            "SELECT at, prompt_tokens, completion_tokens, total_tokens, model_id, service, session_id
             FROM {}.token_usage WHERE user_id = ? ORDER BY at DESC LIMIT ?",
            self.client.keyspace()
        );
        let result = self
            .client
            .session()
            .query_unpaged(query, (user_id, limit))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let mut usages = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let (at, prompt_tokens, completion_tokens, total_tokens, model_id, service, session_id): (
                    i64,
                    i32,
                    i32,
                    i32,
                    String,
                    String,
                    Option<Uuid>,
                ) = row.into_typed().map_err(|e| Error::Internal(e.to_string()))?;
                usages.push(LLMUsage {
                    prompt_tokens: prompt_tokens as u32,
                    completion_tokens: completion_tokens as u32,
                    total_tokens: total_tokens as u32,
                    model_id,
                    service: service_from_str(&service),
                    at: DateTime::from_timestamp_millis(at).unwrap_or_else(Utc::now),
                    user_id: Some(user_id),
                    session_id,
                });
            }
        }
        Ok(usages)
    }
}
