//! QueryRewriter (C3, spec §4.3). A small enum of named strategies chosen
//! by config, each a pure function over the query plus optional context,
//! covering the four strategies spec.md names.

use ragflow_core::ConversationContext;

const SHORT_QUERY_TOKEN_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteStrategy {
    Passthrough,
    Expansion,
    Decomposition,
    HistoryAware,
}

#[derive(Debug, Clone)]
pub struct RewriteResult {
    pub query: String,
    pub strategy: RewriteStrategy,
}

pub struct QueryRewriter {
    strategy: RewriteStrategy,
    synonyms: Vec<(&'static str, &'static [&'static str])>,
}

impl Default for QueryRewriter {
    fn default() -> Self {
        Self::new(RewriteStrategy::Passthrough)
    }
}

impl QueryRewriter {
    pub fn new(strategy: RewriteStrategy) -> Self {
        Self {
            strategy,
            synonyms: vec![
                ("revenue", &["income", "sales"]),
                ("growth", &["increase", "expansion"]),
                ("profit", &["earnings", "net income"]),
            ],
        }
    }

    fn contains_pronoun(query: &str) -> bool {
        const PRONOUNS: &[&str] = &["it", "its", "they", "their", "this", "that", "he", "she"];
        let lower = query.to_lowercase();
        lower
            .split_whitespace()
            .any(|word| PRONOUNS.contains(&word.trim_matches(|c: char| !c.is_alphanumeric())))
    }

    fn should_rewrite(&self, query: &str, context: Option<&ConversationContext>) -> bool {
        let short = query.split_whitespace().count() < SHORT_QUERY_TOKEN_THRESHOLD;
        let pronoun_with_history = Self::contains_pronoun(query)
            && context.map(|c| !c.last_turns.is_empty()).unwrap_or(false);
        short || pronoun_with_history || self.strategy == RewriteStrategy::Expansion
    }

    /// Idempotent: `rewrite(rewrite(q)) == rewrite(q)` under the same
    /// context, because every strategy is a pure function of its inputs and
    /// `expansion`/`history_aware` are no-ops once their marker text is
    /// already present.
    pub fn rewrite(&self, query: &str, context: Option<&ConversationContext>) -> RewriteResult {
        if !self.should_rewrite(query, context) {
            return RewriteResult { query: query.to_string(), strategy: RewriteStrategy::Passthrough };
        }

        match self.strategy {
            RewriteStrategy::Passthrough => {
                RewriteResult { query: query.to_string(), strategy: RewriteStrategy::Passthrough }
            }
            RewriteStrategy::Expansion => RewriteResult {
                query: self.expand(query),
                strategy: RewriteStrategy::Expansion,
            },
            RewriteStrategy::Decomposition => {
                // Decomposition belongs to CoT (spec §4.8); this leg only
                // flags the intent, the actual sub-questions are produced
                // by the CoTEngine's DECOMPOSE state.
                RewriteResult { query: query.to_string(), strategy: RewriteStrategy::Decomposition }
            }
            RewriteStrategy::HistoryAware => RewriteResult {
                query: self.resolve_pronouns(query, context),
                strategy: RewriteStrategy::HistoryAware,
            },
        }
    }

    fn expand(&self, query: &str) -> String {
        let mut clauses = vec![query.to_string()];
        let lower = query.to_lowercase();
        for (term, syns) in &self.synonyms {
            if lower.contains(term) {
                for syn in *syns {
                    if !lower.contains(syn) {
                        clauses.push(format!("OR {syn}"));
                    }
                }
            }
        }
        clauses.join(" ")
    }

    fn resolve_pronouns(&self, query: &str, context: Option<&ConversationContext>) -> String {
        let Some(context) = context else { return query.to_string() };
        let Some(entity) = most_recent_entity(context) else { return query.to_string() };
        if !Self::contains_pronoun(query) {
            return query.to_string();
        }
        let mut rewritten = query.to_string();
        for pronoun in ["it", "its", "this", "that", "they", "their"] {
            rewritten = replace_word(&rewritten, pronoun, &entity);
        }
        rewritten
    }
}

fn most_recent_entity(context: &ConversationContext) -> Option<String> {
    context
        .entities
        .iter()
        .max_by_key(|(_, turn)| **turn)
        .map(|(name, _)| name.clone())
}

fn replace_word(text: &str, word: &str, replacement: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            let trimmed = token.trim_matches(|c: char| !c.is_alphanumeric());
            if trimmed.eq_ignore_ascii_case(word) {
                replacement.to_string()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn ctx_with_entity(name: &str, turn: usize) -> ConversationContext {
        let mut entities = HashMap::new();
        entities.insert(name.to_string(), turn);
        ConversationContext {
            session_id: None,
            window_text: String::new(),
            relevant_doc_ids: vec![],
            entities,
            last_turns: vec![],
        }
    }

    #[test]
    fn passthrough_leaves_long_queries_untouched() {
        let rewriter = QueryRewriter::new(RewriteStrategy::Passthrough);
        let query = "What was IBM's total revenue in the fiscal year 2022 report?";
        let result = rewriter.rewrite(query, None);
        assert_eq!(result.query, query);
    }

    #[test]
    fn history_aware_substitutes_pronoun_with_recent_entity() {
        let rewriter = QueryRewriter::new(RewriteStrategy::HistoryAware);
        let mut context = ctx_with_entity("Project Atlas", 3);
        context.last_turns.push(fake_message());
        let result = rewriter.rewrite("When did it start?", Some(&context));
        assert!(result.query.contains("Project Atlas"));
    }

    #[test]
    fn rewrite_is_idempotent_under_same_context() {
        let rewriter = QueryRewriter::new(RewriteStrategy::HistoryAware);
        let mut context = ctx_with_entity("Project Atlas", 3);
        context.last_turns.push(fake_message());
        let once = rewriter.rewrite("When did it start?", Some(&context));
        let twice = rewriter.rewrite(&once.query, Some(&context));
        assert_eq!(once.query, twice.query);
    }

    #[test]
    fn expansion_adds_or_clauses_for_known_synonyms() {
        let rewriter = QueryRewriter::new(RewriteStrategy::Expansion);
        let result = rewriter.rewrite("revenue growth", None);
        assert!(result.query.contains("OR"));
    }

    fn fake_message() -> ragflow_core::Message {
        use chrono::Utc;
        use uuid::Uuid;
        ragflow_core::Message {
            id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            role: ragflow_core::MessageRole::Assistant,
            kind: ragflow_core::MessageType::Answer,
            content: "Project Atlas is a new initiative.".into(),
            created_at: Utc::now(),
            metadata: Default::default(),
        }
    }
}
