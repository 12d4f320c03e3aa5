//! Claude-backed [`LanguageModel`]: a thin `reqwest` wrapper over the
//! Messages API, streaming via `async_stream` + an mpsc channel fed by a
//! spawned task.

use async_trait::async_trait;
use chrono::Utc;
use ragflow_core::{
    GenerateChunk, GenerateParams, LLMUsage, LanguageModel, ProviderError, ProviderErrorKind,
    UsageService,
};
use serde::Deserialize;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeLanguageModel {
    client: reqwest::Client,
    api_key: String,
    model_id: String,
}

impl ClaudeLanguageModel {
    pub fn new(api_key: String, model_id: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, model_id }
    }

    fn classify_status(status: reqwest::StatusCode) -> ProviderErrorKind {
        match status.as_u16() {
            401 | 403 => ProviderErrorKind::Auth,
            429 => ProviderErrorKind::RateLimit,
            400 | 422 => ProviderErrorKind::BadRequest,
            408 | 504 => ProviderErrorKind::Timeout,
            500..=599 => ProviderErrorKind::Transient,
            _ => ProviderErrorKind::Permanent,
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: UsageBlock,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct UsageBlock {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl LanguageModel for ClaudeLanguageModel {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<(String, LLMUsage), ProviderError> {
        let body = serde_json::json!({
            "model": self.model_id,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?;

        if !response.status().is_success() {
            let kind = Self::classify_status(response.status());
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::new(kind, message));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::BadRequest, e.to_string()))?;

        let text = parsed.content.into_iter().map(|b| b.text).collect::<String>();
        let usage = LLMUsage {
            prompt_tokens: parsed.usage.input_tokens,
            completion_tokens: parsed.usage.output_tokens,
            total_tokens: parsed.usage.input_tokens + parsed.usage.output_tokens,
            model_id: self.model_id.clone(),
            service: UsageService::Search,
            at: Utc::now(),
            user_id: None,
            session_id: None,
        };
        Ok((text, usage))
    }

    async fn stream(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<tokio::sync::mpsc::Receiver<GenerateChunk>, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let (text, _usage) = self.generate(prompt, params).await?;
        tokio::spawn(async move {
            let _ = tx.send(GenerateChunk { text, is_final: true }).await;
        });
        Ok(rx)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> u32 {
        200_000
    }

    async fn validate(&self) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::new(ProviderErrorKind::Auth, "empty API key"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit_status() {
        assert_eq!(
            ClaudeLanguageModel::classify_status(reqwest::StatusCode::TOO_MANY_REQUESTS),
            ProviderErrorKind::RateLimit
        );
        assert_eq!(
            ClaudeLanguageModel::classify_status(reqwest::StatusCode::UNAUTHORIZED),
            ProviderErrorKind::Auth
        );
        assert_eq!(
            ClaudeLanguageModel::classify_status(reqwest::StatusCode::BAD_REQUEST),
            ProviderErrorKind::BadRequest
        );
    }

    #[tokio::test]
    async fn empty_key_fails_validation() {
        let model = ClaudeLanguageModel::new(String::new(), "claude-sonnet-4-20250514".into());
        assert!(model.validate().await.is_err());
    }
}
