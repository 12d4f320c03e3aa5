//! SearchPipeline (C10, spec §4.10): the top-level request handler
//! composing config resolution, context build, retrieval, reranking,
//! reasoning and attribution.

use std::collections::HashMap;
use std::time::Instant;

use uuid::Uuid;

use ragflow_agent::{ConversationContextManager, HeuristicTokenCounter, TokenCounter};
use ragflow_config::{apply_request_overrides, conversation_overrides, ConfigStore, PromptTemplateStore, RAG_GENERATION};
use ragflow_core::{
    Chunk, Embedder, GenerateParams, LanguageModel, LLMUsage, Message, PipelineConfig, QueryResult,
    Reranker, TokenWarning,
};
use ragflow_rag::{rerank, RerankConfig, VectorStore};

use crate::attribution::{attribute, AttributionKind};
use crate::cot_engine::{CotConfig, CotEngine, CotError, ReasoningStep};
use crate::prompt_rules::enhanced_system_preamble;
use crate::retry::quality_gated_generate;

pub struct SearchRequest<'a> {
    pub question: &'a str,
    pub collection_id: Uuid,
    pub user_id: Uuid,
    pub session_history: Option<&'a [Message]>,
    pub config_overrides: Option<HashMap<String, serde_json::Value>>,
}

pub struct SearchMetadata {
    pub pipeline_id: Uuid,
    pub search_method: String,
    pub token_usage: LLMUsage,
    pub token_warning: Option<TokenWarning>,
    pub cot_steps: Option<Vec<ReasoningStep>>,
}

pub struct SearchOutcome {
    pub answer: String,
    pub documents: Vec<Chunk>,
    pub query_results: Vec<QueryResult>,
    pub execution_time: std::time::Duration,
    pub metadata: SearchMetadata,
}

pub struct SearchPipelineDeps<'a> {
    pub config_store: &'a dyn ConfigStore,
    pub templates: &'a dyn PromptTemplateStore,
    pub vector_store: &'a dyn VectorStore,
    pub embedder: &'a dyn Embedder,
    pub llm: &'a dyn LanguageModel,
    pub reranker: Option<&'a dyn Reranker>,
}

/// Returned when generation fails even after the CoT-level retry: the
/// pipeline still surfaces the retrieved documents so the UI can show
/// sources, per spec §4.10's error handling.
pub struct PartialFailure {
    pub message: String,
    pub documents: Vec<Chunk>,
    pub query_results: Vec<QueryResult>,
}

pub async fn run(
    deps: &SearchPipelineDeps<'_>,
    request: SearchRequest<'_>,
) -> Result<SearchOutcome, PartialFailure> {
    let started_at = Instant::now();
    let pipeline_id = Uuid::new_v4();

    let base_config = deps
        .config_store
        .get(request.user_id)
        .await
        .unwrap_or_else(|_| PipelineConfig::default_for(request.user_id));
    let config = match &request.config_overrides {
        Some(overrides) => apply_request_overrides(&base_config, overrides),
        None => base_config,
    };
    let conv_overrides = conversation_overrides(request.config_overrides.as_ref());

    let counter = HeuristicTokenCounter::for_model_family(&config.model_id);
    let history = request.session_history.filter(|_| conv_overrides.conversation_aware);
    let (retrieval_question, generation_question, token_warning, conversation_window) = match history {
        Some(history) => {
            let manager = ConversationContextManager::new(&counter as &dyn TokenCounter);
            let built = manager.build(history, conv_overrides.message_history, config.max_tokens, request.question);
            let retrieval_question = if conv_overrides.conversation_entities {
                built.rewritten_question.clone().unwrap_or_else(|| request.question.to_string())
            } else {
                request.question.to_string()
            };
            let window = if conv_overrides.conversation_context && !built.context.window_text.is_empty() {
                Some(built.context.window_text.clone())
            } else {
                None
            };
            (retrieval_question, request.question.to_string(), built.warning, window)
        }
        None => (request.question.to_string(), request.question.to_string(), None, None),
    };

    let embeddings = match deps.embedder.embed(&[retrieval_question.clone()]).await {
        Ok(e) => e,
        Err(err) => {
            return Err(PartialFailure { message: err.message, documents: Vec::new(), query_results: Vec::new() })
        }
    };
    let query_vec = embeddings.into_iter().next().unwrap_or_default();

    let retrieved = match deps.vector_store.search(request.collection_id, &query_vec, config.top_k_retrieval as usize, None).await
    {
        Ok(results) => results,
        Err(err) => {
            return Err(PartialFailure { message: err.to_string(), documents: Vec::new(), query_results: Vec::new() })
        }
    };

    let (query_results, search_method) = if config.rerank_enabled {
        match deps.reranker {
            Some(reranker) => {
                let outcome = rerank(
                    reranker,
                    &retrieval_question,
                    retrieved,
                    RerankConfig { over_fetch: config.top_k_retrieval as usize, top_k: config.top_k_final as usize },
                )
                .await;
                let method = if outcome.degraded { "vector+degraded_rerank" } else { "vector+rerank" };
                (outcome.results, method.to_string())
            }
            None => {
                let mut results = retrieved;
                results.truncate(config.top_k_final as usize);
                (results, "vector_only".to_string())
            }
        }
    } else {
        let mut results = retrieved;
        results.truncate(config.top_k_final as usize);
        (results, "vector_only".to_string())
    };

    let documents: Vec<Chunk> = query_results.iter().map(|r| r.chunk.clone()).collect();
    let retrieved_text = documents.iter().map(|c| c.text.clone()).collect::<Vec<_>>().join("\n---\n");
    let context_text = match &conversation_window {
        Some(window) => format!("Conversation so far:\n{window}\n\nRetrieved context:\n{retrieved_text}"),
        None => retrieved_text,
    };

    let (answer, usage, cot_steps) = if config.cot_enabled {
        let engine = CotEngine {
            llm: deps.llm,
            embedder: deps.embedder,
            vector_store: deps.vector_store,
            templates: deps.templates,
            config: CotConfig {
                max_depth: config.cot_max_depth,
                quality_threshold: config.cot_quality_threshold,
                max_retries: config.cot_max_retries,
                structured_output_enabled: conv_overrides.structured_output_enabled,
            },
        };
        match engine.run(&generation_question, request.collection_id, &context_text).await {
            Ok(output) => (output.final_answer, output.aggregate_usage, Some(output.reasoning_steps)),
            Err(CotError::Permanent(message)) => {
                return Err(PartialFailure { message, documents, query_results })
            }
            Err(CotError::Template(message)) => {
                return Err(PartialFailure { message, documents, query_results })
            }
        }
    } else {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), generation_question.clone());
        vars.insert("context".to_string(), context_text.clone());
        let template_body = match deps.templates.render(RAG_GENERATION, None, &vars) {
            Ok(body) => body,
            Err(err) => return Err(PartialFailure { message: err.to_string(), documents, query_results }),
        };
        let prompt = format!("{}\n\n{}", enhanced_system_preamble(), template_body);
        match quality_gated_generate(
            deps.llm,
            &prompt,
            &GenerateParams { max_tokens: config.max_tokens, temperature: config.temperature, top_p: config.top_p },
            &generation_question,
            config.cot_quality_threshold,
            config.cot_max_retries,
            conv_overrides.structured_output_enabled,
        )
        .await
        {
            Ok(result) => (result.outcome.answer_text, result.usage, None),
            Err(err) => return Err(PartialFailure { message: err.message, documents, query_results }),
        }
    };

    let attributed = attribute(&answer, &documents);
    let final_documents = match attributed.kind {
        AttributionKind::Cited => attributed.chunks,
        AttributionKind::Coarse => documents,
    };
    let cot_steps = cot_steps.filter(|_| conv_overrides.show_cot_steps);

    Ok(SearchOutcome {
        answer,
        documents: final_documents,
        query_results,
        execution_time: started_at.elapsed(),
        metadata: SearchMetadata {
            pipeline_id,
            search_method,
            token_usage: usage,
            token_warning,
            cot_steps,
        },
    })
}
