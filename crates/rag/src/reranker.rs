//! Reranker stage (C4, spec §4.4). Wraps a [`ragflow_core::Reranker`]
//! provider (the cross-encoder call itself lives in `ragflow-llm`) with the
//! over-fetch/top-k policy and the fallback-to-vector-order-on-failure
//! behavior spec.md requires. A lexical-overlap fallback scorer covers the
//! case where no cross-encoder is configured at all.

use ragflow_core::{QueryResult, Reranker, RerankCandidate, SearchSource};

const DEFAULT_OVER_FETCH: usize = 100;
const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct RerankConfig {
    pub over_fetch: usize,
    pub top_k: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self { over_fetch: DEFAULT_OVER_FETCH, top_k: DEFAULT_TOP_K }
    }
}

pub struct RerankOutcome {
    pub results: Vec<QueryResult>,
    /// Set when the cross-encoder call failed and the original vector-score
    /// ordering was used instead; the caller attaches this as a warning on
    /// response metadata, not an error.
    pub degraded: bool,
}

/// Cross-encoder scoring dispatched off the request-blocking path. The HTTP
/// reranker in `ragflow-llm` is I/O-bound so no `spawn_blocking` is needed
/// there; this stage only applies the batching/fallback policy.
pub async fn rerank(
    reranker: &dyn Reranker,
    query: &str,
    mut candidates: Vec<QueryResult>,
    config: RerankConfig,
) -> RerankOutcome {
    candidates.truncate(config.over_fetch.max(candidates.len().min(config.over_fetch)));
    let over_fetched: Vec<QueryResult> = candidates.into_iter().take(config.over_fetch).collect();

    let rerank_candidates: Vec<RerankCandidate> = over_fetched
        .iter()
        .map(|r| RerankCandidate { id: r.chunk.id, text: r.chunk.text.clone() })
        .collect();

    match reranker.rerank(query, &rerank_candidates, config.top_k).await {
        Ok(scored) => {
            let mut results: Vec<QueryResult> = scored
                .into_iter()
                .filter_map(|s| {
                    over_fetched
                        .iter()
                        .find(|r| r.chunk.id == s.id)
                        .map(|r| QueryResult {
                            chunk: r.chunk.clone(),
                            score: r.score * 0.3 + s.score * 0.7,
                            source: SearchSource::Rerank,
                        })
                })
                .collect();
            ragflow_core::model::sort_by_score_desc(&mut results);
            results.truncate(config.top_k);
            RerankOutcome { results, degraded: false }
        }
        Err(err) => {
            tracing::warn!(error = %err, "reranker call failed, falling back to vector order");
            let mut results = over_fetched;
            ragflow_core::model::sort_by_score_desc(&mut results);
            results.truncate(config.top_k);
            RerankOutcome { results, degraded: true }
        }
    }
}

/// Used when no cross-encoder provider is configured at all: a lexical
/// token-overlap scorer.
pub struct LexicalOverlapScorer;

impl LexicalOverlapScorer {
    pub fn score(query: &str, text: &str) -> f32 {
        let query_tokens: std::collections::HashSet<String> =
            query.to_lowercase().split_whitespace().map(|s| s.to_string()).collect();
        if query_tokens.is_empty() {
            return 0.0;
        }
        let text_tokens: std::collections::HashSet<String> =
            text.to_lowercase().split_whitespace().map(|s| s.to_string()).collect();
        let overlap = query_tokens.intersection(&text_tokens).count();
        overlap as f32 / query_tokens.len() as f32
    }
}

pub fn rerank_with_fallback_scorer(
    query: &str,
    mut candidates: Vec<QueryResult>,
    top_k: usize,
) -> Vec<QueryResult> {
    for candidate in &mut candidates {
        let lexical = LexicalOverlapScorer::score(query, &candidate.chunk.text);
        candidate.score = candidate.score * 0.3 + lexical * 0.7;
        candidate.source = SearchSource::Hybrid;
    }
    ragflow_core::model::sort_by_score_desc(&mut candidates);
    candidates.truncate(top_k);
    candidates
}

/// Test double used wherever callers need a [`Reranker`] without a real
/// provider (e.g. exercising the fallback path deterministically).
pub struct FailingReranker;

#[async_trait::async_trait]
impl Reranker for FailingReranker {
    async fn rerank(
        &self,
        _query: &str,
        _candidates: &[RerankCandidate],
        _top_k: usize,
    ) -> Result<Vec<ragflow_core::RerankResult>, ragflow_core::ProviderError> {
        Err(ragflow_core::ProviderError::new(
            ragflow_core::ProviderErrorKind::Transient,
            "simulated failure",
        ))
    }

    fn model_id(&self) -> &str {
        "failing-test-double"
    }

    async fn validate(&self) -> Result<(), ragflow_core::ProviderError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragflow_core::{Chunk, ChunkMetadata};
    use uuid::Uuid;

    fn make_result(text: &str, score: f32) -> QueryResult {
        QueryResult {
            chunk: Chunk {
                id: Uuid::new_v4(),
                doc_id: Uuid::new_v4(),
                collection_id: Uuid::new_v4(),
                text: text.to_string(),
                embedding: None,
                metadata: ChunkMetadata::default(),
            },
            score,
            source: SearchSource::Vector,
        }
    }

    #[tokio::test]
    async fn reranker_failure_falls_back_to_vector_order() {
        let reranker = FailingReranker;
        let candidates = vec![make_result("alpha", 0.9), make_result("beta", 0.5)];
        let outcome = rerank(&reranker, "alpha", candidates, RerankConfig::default()).await;
        assert!(outcome.degraded);
        assert_eq!(outcome.results[0].chunk.text, "alpha");
    }

    #[test]
    fn lexical_scorer_rewards_overlap() {
        let score = LexicalOverlapScorer::score("revenue 2022", "the revenue in 2022 was high");
        assert!(score > 0.0);
    }

    #[test]
    fn lexical_fallback_reorders_by_combined_score() {
        let candidates = vec![make_result("irrelevant text here", 0.95), make_result("revenue 2022 figures", 0.1)];
        let results = rerank_with_fallback_scorer("revenue 2022", candidates, 10);
        assert_eq!(results[0].chunk.text, "revenue 2022 figures");
        let _ = Utc::now();
    }
}
