//! VectorStore adapter (C2), QueryRewriter (C3) and the Reranker stage (C4).

pub mod query_rewriter;
pub mod reranker;
pub mod vector_store;

pub use query_rewriter::{QueryRewriter, RewriteResult, RewriteStrategy};
pub use reranker::{
    rerank, rerank_with_fallback_scorer, LexicalOverlapScorer, RerankConfig, RerankOutcome,
};
pub use vector_store::{DistanceMetric, QdrantVectorStore, VectorStore};
