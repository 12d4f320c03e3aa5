//! HTTP-backed [`Reranker`] — calls out to an external cross-encoder
//! scoring endpoint in a single batched request, matching spec §4.4
//! ("reranker scores all pairs in a single batched call").

use async_trait::async_trait;
use ragflow_core::{ProviderError, ProviderErrorKind, RerankCandidate, RerankResult, Reranker};
use serde::Deserialize;

pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
}

impl HttpReranker {
    pub fn new(endpoint: String, model_id: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint, model_id }
    }
}

#[derive(Deserialize)]
struct RerankResponseItem {
    index: usize,
    score: f32,
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
        top_k: usize,
    ) -> Result<Vec<RerankResult>, ProviderError> {
        let documents: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "model": self.model_id,
                "query": query,
                "documents": documents,
                "top_n": top_k,
            }))
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Transient, e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::new(
                ProviderErrorKind::Transient,
                format!("rerank endpoint returned {}", response.status()),
            ));
        }

        let items: Vec<RerankResponseItem> = response
            .json()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::BadRequest, e.to_string()))?;

        Ok(items
            .into_iter()
            .filter_map(|item| candidates.get(item.index).map(|c| RerankResult { id: c.id, score: item.score }))
            .collect())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn validate(&self) -> Result<(), ProviderError> {
        if self.endpoint.is_empty() {
            return Err(ProviderError::new(ProviderErrorKind::Auth, "empty rerank endpoint"));
        }
        Ok(())
    }
}
