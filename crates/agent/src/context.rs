//! ConversationContextManager (C9, spec §4.9): builds a per-turn
//! [`ConversationContext`] purely from the message log, with no cache that
//! survives past a single request.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use ragflow_core::{
    ConversationContext, Message, MessageRole, TokenWarning, TokenWarningKind, WarningSeverity,
};

use crate::token_counter::TokenCounter;

const ENTITY_LOOKBACK_TURNS: usize = 5;
const CONTEXT_FRACTION: f32 = 0.8;

static PROPER_NOUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z][a-zA-Z]{2,}\b").unwrap());
static PRONOUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(it|this|that|they|them|its|their)\b").unwrap());

pub struct BuiltContext {
    pub context: ConversationContext,
    /// Suggested pronoun-resolved form of the incoming question. Per
    /// spec.md this is a suggestion, not a mutation: the pipeline prefers
    /// it for retrieval and keeps the original for generation.
    pub rewritten_question: Option<String>,
    pub warning: Option<TokenWarning>,
}

pub struct ConversationContextManager<'a> {
    counter: &'a dyn TokenCounter,
}

impl<'a> ConversationContextManager<'a> {
    pub fn new(counter: &'a dyn TokenCounter) -> Self {
        Self { counter }
    }

    pub fn build(
        &self,
        all_messages: &[Message],
        max_messages: usize,
        context_window_size: u32,
        incoming_question: &str,
    ) -> BuiltContext {
        let mut last_turns: Vec<Message> =
            all_messages.iter().rev().take(max_messages).rev().cloned().collect();

        let budget_tokens = (context_window_size as f32 * CONTEXT_FRACTION) as usize;
        let mut warning = None;
        if self.total_tokens(&last_turns) > budget_tokens {
            while last_turns.len() > 1 && self.total_tokens(&last_turns) > budget_tokens {
                last_turns.remove(0);
            }
            warning = Some(TokenWarning {
                kind: TokenWarningKind::ContextTruncated,
                current: self.total_tokens(&last_turns) as u32,
                limit: budget_tokens as u32,
                pct: self.total_tokens(&last_turns) as f32 / budget_tokens.max(1) as f32,
                severity: WarningSeverity::Info,
                suggested_action: Some("older turns were dropped to fit the context window".to_string()),
            });
        }

        let entities = self.extract_entities(&last_turns);
        let window_text = last_turns
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let rewritten_question = self.resolve_pronouns(incoming_question, &last_turns, &entities);

        let relevant_doc_ids = last_turns
            .iter()
            .filter_map(|m| m.metadata.sources.as_ref())
            .flatten()
            .cloned()
            .collect();

        let session_id = last_turns.first().map(|m| m.session_id);

        BuiltContext {
            context: ConversationContext { session_id, window_text, relevant_doc_ids, entities, last_turns },
            rewritten_question,
            warning,
        }
    }

    fn total_tokens(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.counter.count(&m.content)).sum()
    }

    fn extract_entities(&self, turns: &[Message]) -> HashMap<String, usize> {
        let mut entities = HashMap::new();
        for turn in turns.iter().rev().take(ENTITY_LOOKBACK_TURNS) {
            for capture in PROPER_NOUN.find_iter(&turn.content) {
                *entities.entry(capture.as_str().to_string()).or_insert(0) += 1;
            }
        }
        entities
    }

    /// Produces a pronoun-resolved rewrite when the question contains a
    /// pronoun and the most recent assistant turn names an entity recent
    /// enough to plausibly be the referent.
    fn resolve_pronouns(
        &self,
        question: &str,
        turns: &[Message],
        entities: &HashMap<String, usize>,
    ) -> Option<String> {
        if !PRONOUN.is_match(question) {
            return None;
        }
        let last_assistant_entity = turns
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::Assistant)
            .and_then(|m| PROPER_NOUN.find(&m.content).map(|c| c.as_str().to_string()));

        let candidate = last_assistant_entity.or_else(|| {
            entities.iter().max_by_key(|(_, count)| **count).map(|(name, _)| name.clone())
        })?;

        let rewritten = PRONOUN.replace_all(question, candidate.as_str()).into_owned();
        if rewritten == question {
            None
        } else {
            Some(rewritten)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_counter::HeuristicTokenCounter;
    use chrono::Utc;
    use ragflow_core::{MessageMetadata, MessageType};
    use uuid::Uuid;

    fn make_message(session_id: uuid::Uuid, role: MessageRole, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            session_id,
            role,
            kind: MessageType::Answer,
            content: content.to_string(),
            created_at: Utc::now(),
            metadata: MessageMetadata::default(),
        }
    }

    #[test]
    fn truncates_from_oldest_when_over_budget() {
        let counter = HeuristicTokenCounter::default();
        let manager = ConversationContextManager::new(&counter);
        let session_id = Uuid::new_v4();
        let long_text = "word ".repeat(500);
        let messages: Vec<Message> = (0..10)
            .map(|i| make_message(session_id, MessageRole::User, &format!("{long_text} turn {i}")))
            .collect();
        let built = manager.build(&messages, 10, 100, "what about it?");
        assert!(built.warning.is_some());
        assert!(built.context.last_turns.len() < messages.len());
    }

    #[test]
    fn no_warning_when_within_budget() {
        let counter = HeuristicTokenCounter::default();
        let manager = ConversationContextManager::new(&counter);
        let session_id = Uuid::new_v4();
        let messages = vec![make_message(session_id, MessageRole::User, "hello")];
        let built = manager.build(&messages, 10, 100_000, "hello?");
        assert!(built.warning.is_none());
    }

    #[test]
    fn pronoun_resolves_to_recent_entity() {
        let counter = HeuristicTokenCounter::default();
        let manager = ConversationContextManager::new(&counter);
        let session_id = Uuid::new_v4();
        let messages = vec![
            make_message(session_id, MessageRole::User, "tell me about IBM"),
            make_message(session_id, MessageRole::Assistant, "IBM reported strong Cloud revenue"),
        ];
        let built = manager.build(&messages, 10, 100_000, "what was its revenue?");
        assert!(built.rewritten_question.is_some());
        assert!(built.rewritten_question.unwrap().contains("IBM"));
    }

    #[test]
    fn no_rewrite_without_pronoun() {
        let counter = HeuristicTokenCounter::default();
        let manager = ConversationContextManager::new(&counter);
        let session_id = Uuid::new_v4();
        let messages = vec![make_message(session_id, MessageRole::Assistant, "IBM grew revenue")];
        let built = manager.build(&messages, 10, 100_000, "what was IBM's revenue in 2022?");
        assert!(built.rewritten_question.is_none());
    }
}
