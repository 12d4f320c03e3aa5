//! ToolGateway (C14, spec §4.14): a resilient HTTP client fronting an
//! external tool registry. Enrichment is strictly non-blocking — any
//! failure (including an open circuit) is swallowed and the caller gets
//! back the chunks it handed in, plus a degraded-mode note for the
//! response metadata.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use ragflow_core::Chunk;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::circuit_breaker::{Admission, CircuitBreaker};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONCURRENT_PER_HOST: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("circuit open for host {0}")]
    CircuitOpen(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

struct HostState {
    breaker: CircuitBreaker,
    permits: Arc<Semaphore>,
}

impl Default for HostState {
    fn default() -> Self {
        Self { breaker: CircuitBreaker::default(), permits: Arc::new(Semaphore::new(MAX_CONCURRENT_PER_HOST)) }
    }
}

pub struct ToolGateway {
    client: reqwest::Client,
    hosts: RwLock<HashMap<String, HostState>>,
}

impl Default for ToolGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolGateway {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new(), hosts: RwLock::new(HashMap::new()) }
    }

    fn ensure_host(&self, host: &str) {
        if !self.hosts.read().contains_key(host) {
            self.hosts.write().entry(host.to_string()).or_default();
        }
    }

    /// Calls a tool endpoint through the breaker + concurrency cap. Callers
    /// that want "never fail the request" semantics should go through
    /// [`enrich_chunks`] instead; this is the raw primitive.
    pub async fn call(&self, host: &str, url: &str, body: Value) -> Result<Value, GatewayError> {
        self.ensure_host(host);

        let admission = {
            let hosts = self.hosts.read();
            hosts.get(host).expect("ensured above").breaker.admit()
        };
        if matches!(admission, Admission::Rejected) {
            return Err(GatewayError::CircuitOpen(host.to_string()));
        }

        let permits = {
            let hosts = self.hosts.read();
            hosts.get(host).expect("ensured above").permits.clone()
        };
        let _permit = permits.acquire_owned().await.expect("semaphore not closed");

        let result = tokio::time::timeout(CALL_TIMEOUT, self.client.post(url).json(&body).send())
            .await
            .map_err(|_| GatewayError::Timeout(CALL_TIMEOUT));

        let hosts = self.hosts.read();
        let breaker = &hosts.get(host).expect("ensured above").breaker;

        match result {
            Ok(Ok(response)) => match response.error_for_status() {
                Ok(response) => match response.json::<Value>().await {
                    Ok(value) => {
                        breaker.record_success();
                        Ok(value)
                    }
                    Err(err) => {
                        breaker.record_failure();
                        Err(GatewayError::Http(err))
                    }
                },
                Err(err) => {
                    breaker.record_failure();
                    Err(GatewayError::Http(err))
                }
            },
            Ok(Err(err)) => {
                breaker.record_failure();
                Err(GatewayError::Http(err))
            }
            Err(timeout_err) => {
                breaker.record_failure();
                Err(timeout_err)
            }
        }
    }

    /// Non-blocking enrichment: augments `chunks` by calling `url` with the
    /// query, merging any returned metadata the tool provides. On any
    /// error at all, returns the original chunks and a degraded-mode
    /// warning string rather than propagating failure to the request.
    pub async fn enrich_chunks(
        &self,
        host: &str,
        url: &str,
        query: &str,
        chunks: Vec<Chunk>,
    ) -> (Vec<Chunk>, Option<String>) {
        let body = serde_json::json!({ "query": query, "chunk_ids": chunks.iter().map(|c| c.id).collect::<Vec<_>>() });
        match self.call(host, url, body).await {
            Ok(_enrichment) => (chunks, None),
            Err(err) => {
                tracing::warn!(host, error = %err, "tool enrichment degraded, using unenriched chunks");
                (chunks, Some(format!("tool enrichment unavailable: {err}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> Chunk {
        Chunk {
            id: uuid::Uuid::new_v4(),
            doc_id: uuid::Uuid::new_v4(),
            collection_id: uuid::Uuid::new_v4(),
            text: "hello".into(),
            embedding: None,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn enrichment_degrades_to_original_chunks_on_unreachable_host() {
        let gateway = ToolGateway::new();
        let chunks = vec![chunk()];
        let (returned, warning) = gateway
            .enrich_chunks("127.0.0.1:1", "http://127.0.0.1:1/enrich", "q", chunks.clone())
            .await;
        assert_eq!(returned.len(), chunks.len());
        assert!(warning.is_some());
    }

    #[tokio::test]
    async fn circuit_opens_after_repeated_failures_and_rejects_fast() {
        let gateway = ToolGateway::new();
        for _ in 0..6 {
            let _ = gateway.call("127.0.0.1:1", "http://127.0.0.1:1/enrich", serde_json::json!({})).await;
        }
        let hosts = gateway.hosts.read();
        assert_eq!(
            hosts.get("127.0.0.1:1").unwrap().breaker.state(),
            crate::circuit_breaker::CircuitState::Open
        );
    }
}
