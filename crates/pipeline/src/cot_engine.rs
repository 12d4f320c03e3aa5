//! CoTEngine (C8, spec §4.8): CLASSIFY -> (simple: GENERATE) | (complex or
//! analytical: DECOMPOSE -> ITERATE), both branches converging on
//! SYNTHESIZE -> END.

use std::collections::HashMap;

use uuid::Uuid;

use ragflow_config::{PromptTemplateStore, COT_CLASSIFY, COT_DECOMPOSE, COT_SYNTHESIZE, RAG_GENERATION};
use ragflow_core::{Embedder, GenerateParams, LanguageModel, LLMUsage};
use ragflow_rag::VectorStore;

use crate::prompt_rules::enhanced_system_preamble;
use crate::retry::{generate_with_transient_retry, quality_gated_generate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Simple,
    Complex,
    Analytical,
}

impl Classification {
    fn parse(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("analytical") {
            Classification::Analytical
        } else if lower.contains("complex") {
            Classification::Complex
        } else {
            Classification::Simple
        }
    }

    fn is_simple(&self) -> bool {
        matches!(self, Classification::Simple)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningStepType {
    Classification,
    Decomposition,
    Generation,
    Synthesis,
}

#[derive(Debug, Clone)]
pub struct ReasoningStep {
    pub step_type: ReasoningStepType,
    pub summary: String,
    pub usage: LLMUsage,
    pub quality: f32,
}

#[derive(Debug, Clone)]
pub struct CotOutput {
    pub final_answer: String,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub aggregate_usage: LLMUsage,
    pub confidence: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum CotError {
    #[error("provider permanently failed: {0}")]
    Permanent(String),
    #[error("template error: {0}")]
    Template(String),
}

impl From<ragflow_core::Error> for CotError {
    fn from(err: ragflow_core::Error) -> Self {
        CotError::Template(err.to_string())
    }
}

pub struct CotConfig {
    pub max_depth: u32,
    pub quality_threshold: f32,
    pub max_retries: u32,
    /// The `structured_output_enabled` per-request override (spec §4.9):
    /// when false, every generation stage skips the five-layer parser and
    /// passes its raw response straight through.
    pub structured_output_enabled: bool,
}

impl Default for CotConfig {
    fn default() -> Self {
        Self { max_depth: 3, quality_threshold: 0.6, max_retries: 3, structured_output_enabled: true }
    }
}

pub struct CotEngine<'a> {
    pub llm: &'a dyn LanguageModel,
    pub embedder: &'a dyn Embedder,
    pub vector_store: &'a dyn VectorStore,
    pub templates: &'a dyn PromptTemplateStore,
    pub config: CotConfig,
}

impl<'a> CotEngine<'a> {
    /// Provider-level transient/rate-limit retry with linear back-off
    /// (spec §5), shared with every other generation call via `retry.rs`.
    async fn call_with_transient_retry(
        &self,
        prompt: &str,
        params: &GenerateParams,
    ) -> Result<(String, LLMUsage), CotError> {
        generate_with_transient_retry(self.llm, prompt, params).await.map_err(|e| CotError::Permanent(e.message))
    }

    pub async fn run(
        &self,
        question: &str,
        collection_id: Uuid,
        context_text: &str,
    ) -> Result<CotOutput, CotError> {
        let mut steps = Vec::new();

        let classification = self.classify(question, &mut steps).await?;

        if classification.is_simple() {
            let generated = self.generate(question, context_text, &mut steps).await?;
            let synthesis = self.synthesize(question, context_text, &generated.summary, &mut steps).await?;
            let confidence = generated.quality.min(synthesis.quality);
            steps.push(synthesis.clone());
            return Ok(self.finish_with_confidence(synthesis.summary, steps, confidence));
        }

        let sub_questions = self.decompose(question, &mut steps).await?;
        let mut accumulated_reasoning = String::new();
        let mut last_quality = 1.0f32;

        for (index, sub_question) in sub_questions.iter().enumerate() {
            let retrieved = self.retrieve(collection_id, sub_question).await?;
            let prompt = format!(
                "{}\n\nPrior reasoning:\n{}\n\nSub-question {}: {}\n\nRetrieved context:\n{}",
                enhanced_system_preamble(),
                accumulated_reasoning,
                index + 1,
                sub_question,
                retrieved,
            );
            let outcome = quality_gated_generate(
                self.llm,
                &prompt,
                &GenerateParams::default(),
                sub_question,
                self.config.quality_threshold,
                self.config.max_retries,
                self.config.structured_output_enabled,
            )
            .await
            .map_err(|e| CotError::Permanent(e.message))?;

            accumulated_reasoning.push_str(&format!("\nQ{}: {}\nA{}: {}\n", index + 1, sub_question, index + 1, outcome.outcome.answer_text));
            last_quality = last_quality.min(outcome.outcome.quality_score);
            steps.push(ReasoningStep {
                step_type: ReasoningStepType::Generation,
                summary: format!("sub-question {}: {}", index + 1, sub_question),
                usage: outcome.usage,
                quality: outcome.outcome.quality_score,
            });
        }

        let synthesis = self
            .synthesize(question, context_text, &accumulated_reasoning, &mut steps)
            .await?;
        last_quality = last_quality.min(synthesis.quality);
        steps.push(synthesis.clone());

        Ok(self.finish_with_confidence(synthesis.summary, steps, last_quality))
    }

    async fn classify(&self, question: &str, steps: &mut Vec<ReasoningStep>) -> Result<Classification, CotError> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        let prompt = self.templates.render(COT_CLASSIFY, None, &vars)?;
        let params = GenerateParams { max_tokens: 16, ..Default::default() };
        let (raw, usage) = self.call_with_transient_retry(&prompt, &params).await?;
        let classification = Classification::parse(&raw);
        steps.push(ReasoningStep {
            step_type: ReasoningStepType::Classification,
            summary: raw.trim().to_string(),
            usage,
            quality: 1.0,
        });
        Ok(classification)
    }

    async fn decompose(&self, question: &str, steps: &mut Vec<ReasoningStep>) -> Result<Vec<String>, CotError> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        let prompt = self.templates.render(COT_DECOMPOSE, None, &vars)?;
        let (raw, usage) = self.call_with_transient_retry(&prompt, &GenerateParams::default()).await?;

        let mut sub_questions: Vec<String> = raw
            .lines()
            .map(|line| line.trim_start_matches(|c: char| c.is_numeric() || c == '.' || c == '-' || c == ')' || c.is_whitespace()))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        sub_questions.truncate(self.config.max_depth as usize);

        steps.push(ReasoningStep {
            step_type: ReasoningStepType::Decomposition,
            summary: format!("{} sub-questions", sub_questions.len()),
            usage,
            quality: 1.0,
        });
        Ok(sub_questions)
    }

    async fn retrieve(&self, collection_id: Uuid, sub_question: &str) -> Result<String, CotError> {
        let embeddings = self
            .embedder
            .embed(&[sub_question.to_string()])
            .await
            .map_err(|e| CotError::Permanent(e.message))?;
        let query_vec = embeddings.into_iter().next().unwrap_or_default();
        let results = self
            .vector_store
            .search(collection_id, &query_vec, 10, None)
            .await
            .map_err(|e| CotError::Permanent(e.to_string()))?;
        Ok(results.into_iter().map(|r| r.chunk.text).collect::<Vec<_>>().join("\n---\n"))
    }

    async fn generate(
        &self,
        question: &str,
        context_text: &str,
        steps: &mut Vec<ReasoningStep>,
    ) -> Result<ReasoningStep, CotError> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), context_text.to_string());
        let template_body = self.templates.render(RAG_GENERATION, None, &vars)?;
        let prompt = format!("{}\n\n{}", enhanced_system_preamble(), template_body);

        let outcome = quality_gated_generate(
            self.llm,
            &prompt,
            &GenerateParams::default(),
            question,
            self.config.quality_threshold,
            self.config.max_retries,
            self.config.structured_output_enabled,
        )
        .await
        .map_err(|e| CotError::Permanent(e.message))?;

        let step = ReasoningStep {
            step_type: ReasoningStepType::Generation,
            summary: outcome.outcome.answer_text.clone(),
            usage: outcome.usage,
            quality: outcome.outcome.quality_score,
        };
        steps.push(step.clone());
        Ok(step)
    }

    async fn synthesize(
        &self,
        question: &str,
        context_text: &str,
        sub_answers: &str,
        _steps: &mut [ReasoningStep],
    ) -> Result<ReasoningStep, CotError> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), context_text.to_string());
        vars.insert("sub_answers".to_string(), sub_answers.to_string());
        let template_body = self.templates.render(COT_SYNTHESIZE, None, &vars)?;
        let prompt = format!("{}\n\n{}", enhanced_system_preamble(), template_body);

        let outcome = quality_gated_generate(
            self.llm,
            &prompt,
            &GenerateParams::default(),
            question,
            self.config.quality_threshold,
            self.config.max_retries,
            self.config.structured_output_enabled,
        )
        .await
        .map_err(|e| CotError::Permanent(e.message))?;

        Ok(ReasoningStep {
            step_type: ReasoningStepType::Synthesis,
            summary: outcome.outcome.answer_text,
            usage: outcome.usage,
            quality: outcome.outcome.quality_score,
        })
    }

    fn finish_with_confidence(&self, final_answer: String, steps: Vec<ReasoningStep>, confidence: f32) -> CotOutput {
        let aggregate_usage = sum_usage(&steps);
        CotOutput { final_answer, reasoning_steps: steps, aggregate_usage, confidence }
    }
}

fn sum_usage(steps: &[ReasoningStep]) -> LLMUsage {
    let prompt_tokens: u32 = steps.iter().map(|s| s.usage.prompt_tokens).sum();
    let completion_tokens: u32 = steps.iter().map(|s| s.usage.completion_tokens).sum();
    let model_id = steps.first().map(|s| s.usage.model_id.clone()).unwrap_or_default();
    let service = steps.first().map(|s| s.usage.service).unwrap_or(ragflow_core::UsageService::Cot);
    LLMUsage {
        prompt_tokens,
        completion_tokens,
        total_tokens: prompt_tokens + completion_tokens,
        model_id,
        service,
        at: chrono::Utc::now(),
        user_id: None,
        session_id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_parses_analytical_before_complex() {
        assert_eq!(Classification::parse("this is analytical"), Classification::Analytical);
        assert_eq!(Classification::parse("complex question"), Classification::Complex);
        assert_eq!(Classification::parse("simple"), Classification::Simple);
    }

    #[test]
    fn confidence_is_minimum_step_quality() {
        let steps = vec![
            ReasoningStep { step_type: ReasoningStepType::Generation, summary: "a".into(), usage: dummy_usage(), quality: 0.9 },
            ReasoningStep { step_type: ReasoningStepType::Synthesis, summary: "b".into(), usage: dummy_usage(), quality: 0.4 },
        ];
        let confidence = steps.iter().map(|s| s.quality).fold(1.0f32, f32::min);
        assert_eq!(confidence, 0.4);
    }

    fn dummy_usage() -> LLMUsage {
        LLMUsage {
            prompt_tokens: 1,
            completion_tokens: 1,
            total_tokens: 2,
            model_id: "test".to_string(),
            service: ragflow_core::UsageService::Cot,
            at: chrono::Utc::now(),
            user_id: None,
            session_id: None,
        }
    }
}
