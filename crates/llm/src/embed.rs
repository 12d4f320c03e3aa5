//! HTTP-backed [`Embedder`]. Same shape as [`crate::claude::ClaudeLanguageModel`]
//! — a thin `reqwest` wrapper — pointed at an OpenAI-compatible embeddings
//! endpoint so the retriever's dense leg (`ragflow-rag`) has a concrete
//! provider to call through [`crate::registry::ProviderRegistry`].

use async_trait::async_trait;
use ragflow_core::{Embedder, ProviderError, ProviderErrorKind};
use serde::Deserialize;

pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model_id: String,
}

impl HttpEmbedder {
    pub fn new(endpoint: String, api_key: Option<String>, model_id: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint, api_key, model_id }
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "model": self.model_id, "input": texts }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?;
        if !response.status().is_success() {
            return Err(ProviderError::new(
                ProviderErrorKind::Transient,
                format!("embedding endpoint returned {}", response.status()),
            ));
        }
        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::BadRequest, e.to_string()))?;
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn validate(&self) -> Result<(), ProviderError> {
        if self.endpoint.is_empty() {
            return Err(ProviderError::new(ProviderErrorKind::Auth, "empty embedding endpoint"));
        }
        Ok(())
    }
}
