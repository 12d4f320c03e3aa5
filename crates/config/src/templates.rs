//! PromptTemplateStore (C5, spec §4.5): named templates with strict
//! variable substitution and user-scoped overrides falling back to system
//! defaults.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use uuid::Uuid;

use ragflow_core::{Error, Result};

pub const RAG_GENERATION: &str = "rag_generation";
pub const COT_CLASSIFY: &str = "cot_classify";
pub const COT_DECOMPOSE: &str = "cot_decompose";
pub const COT_SYNTHESIZE: &str = "cot_synthesize";
pub const QUERY_REWRITE: &str = "query_rewrite";
pub const PODCAST_SCRIPT: &str = "podcast_script";
pub const QUESTION_SUGGESTION: &str = "question_suggestion";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub body: String,
    /// Variable names extracted from `body` at load time, used to validate
    /// substitution eagerly rather than discovering a missing key mid-render.
    pub variables: HashSet<String>,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let variables = PLACEHOLDER.captures_iter(&body).map(|c| c[1].to_string()).collect();
        Self { name: name.into(), body, variables }
    }

    /// Strict named-placeholder substitution: every variable the template
    /// declares must be supplied, or the render fails outright rather than
    /// leaving a blank gap in the prompt.
    pub fn render(&self, vars: &HashMap<String, String>) -> Result<String> {
        for variable in &self.variables {
            if !vars.contains_key(variable) {
                return Err(Error::Validation(format!(
                    "template '{}' is missing required variable '{}'",
                    self.name, variable
                )));
            }
        }
        let rendered = PLACEHOLDER.replace_all(&self.body, |caps: &regex::Captures| {
            vars.get(&caps[1]).cloned().unwrap_or_default()
        });
        Ok(rendered.into_owned())
    }
}

pub trait PromptTemplateStore: Send + Sync {
    fn get(&self, name: &str, user_id: Option<Uuid>) -> Result<PromptTemplate>;

    fn render(&self, name: &str, user_id: Option<Uuid>, vars: &HashMap<String, String>) -> Result<String> {
        self.get(name, user_id)?.render(vars)
    }
}

/// Default store: system templates seeded in-process, user overrides kept
/// in a map the caller populates (a real deployment would back this with
/// `ragflow-persistence`; nothing in spec.md requires that for templates).
pub struct InMemoryPromptTemplateStore {
    system: HashMap<String, PromptTemplate>,
    user_overrides: RwLock<HashMap<(Uuid, String), PromptTemplate>>,
}

impl InMemoryPromptTemplateStore {
    pub fn with_defaults() -> Self {
        let mut system = HashMap::new();
        for (name, body) in default_templates() {
            system.insert(name.to_string(), PromptTemplate::new(name, body));
        }
        Self { system, user_overrides: RwLock::new(HashMap::new()) }
    }

    pub fn set_user_template(&self, user_id: Uuid, name: &str, body: &str) {
        self.user_overrides
            .write()
            .insert((user_id, name.to_string()), PromptTemplate::new(name, body));
    }
}

impl Default for InMemoryPromptTemplateStore {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PromptTemplateStore for InMemoryPromptTemplateStore {
    fn get(&self, name: &str, user_id: Option<Uuid>) -> Result<PromptTemplate> {
        if let Some(user_id) = user_id {
            if let Some(template) = self.user_overrides.read().get(&(user_id, name.to_string())) {
                return Ok(template.clone());
            }
        }
        self.system
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no template named '{name}'")))
    }
}

fn default_templates() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            RAG_GENERATION,
            "Answer the question using only the provided context.\n\nContext:\n{{context}}\n\nQuestion: {{question}}\n\nRespond inside <thinking></thinking> then <answer></answer> tags.",
        ),
        (
            COT_CLASSIFY,
            "Classify the question as one of simple, complex, analytical. Question: {{question}}\nRespond with a single word.",
        ),
        (
            COT_DECOMPOSE,
            "Break the question into 2-4 sub-questions needed to answer it fully.\n\nQuestion: {{question}}",
        ),
        (
            COT_SYNTHESIZE,
            "Original question: {{question}}\nOriginal context:\n{{context}}\nSub-answers:\n{{sub_answers}}\n\nSynthesize a final answer inside <thinking></thinking> then <answer></answer> tags.",
        ),
        (
            QUERY_REWRITE,
            "Rewrite the query for better retrieval, preserving intent.\n\nHistory:\n{{history}}\n\nQuery: {{query}}",
        ),
        (
            PODCAST_SCRIPT,
            "Write a two-host podcast script (HOST and EXPERT) discussing the following material in about {{target_words}} words.\n\nMaterial:\n{{context}}\n\nUse lines tagged HOST: and EXPERT:.",
        ),
        (
            QUESTION_SUGGESTION,
            "Given the conversation so far, suggest 3 natural follow-up questions.\n\nConversation:\n{{history}}",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_fails_strictly() {
        let store = InMemoryPromptTemplateStore::with_defaults();
        let err = store.render(RAG_GENERATION, None, &HashMap::new());
        assert!(err.is_err());
    }

    #[test]
    fn user_override_takes_precedence_over_system_default() {
        let store = InMemoryPromptTemplateStore::with_defaults();
        let user_id = Uuid::new_v4();
        store.set_user_template(user_id, RAG_GENERATION, "Custom: {{question}}");
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), "what is revenue?".to_string());
        let rendered = store.render(RAG_GENERATION, Some(user_id), &vars).unwrap();
        assert_eq!(rendered, "Custom: what is revenue?");
    }

    #[test]
    fn falls_back_to_system_default_for_other_users() {
        let store = InMemoryPromptTemplateStore::with_defaults();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        store.set_user_template(owner, RAG_GENERATION, "Custom: {{question}}");
        let template = store.get(RAG_GENERATION, Some(other)).unwrap();
        assert!(template.body.starts_with("Answer the question"));
    }

    #[test]
    fn unknown_template_is_not_found() {
        let store = InMemoryPromptTemplateStore::with_defaults();
        assert!(store.get("does_not_exist", None).is_err());
    }
}
