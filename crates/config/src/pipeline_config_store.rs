//! ConfigStore (C13, spec §4.13): per-user [`PipelineConfig`] rows, created
//! with constant defaults on first read, last-writer-wins on concurrent
//! writes. `ragflow-persistence` supplies the ScyllaDB-backed
//! implementation of this trait for production use; this crate only
//! defines the contract and an in-process default used by tests and by
//! deployments that don't need durability.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use ragflow_core::{PipelineConfig, Result};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<PipelineConfig>;
    async fn put(&self, config: PipelineConfig) -> Result<()>;
}

/// `DashMap` gives the last-writer-wins semantics spec.md accepts without
/// needing any row-level locking; a stale concurrent read is allowed by
/// design.
#[derive(Default)]
pub struct InMemoryConfigStore {
    rows: DashMap<Uuid, PipelineConfig>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self { rows: DashMap::new() }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get(&self, user_id: Uuid) -> Result<PipelineConfig> {
        if let Some(existing) = self.rows.get(&user_id) {
            return Ok(existing.clone());
        }
        let defaults = PipelineConfig::default_for(user_id);
        self.rows.insert(user_id, defaults.clone());
        Ok(defaults)
    }

    async fn put(&self, config: PipelineConfig) -> Result<()> {
        self.rows.insert(config.user_id, config);
        Ok(())
    }
}

const OVERRIDE_WHITELIST: &[&str] = &[
    "cot_enabled",
    "show_cot_steps",
    "structured_output_enabled",
    "conversation_aware",
    "conversation_context",
    "message_history",
    "conversation_entities",
];

/// Applies the `cot_enabled` override from the spec §4.9 whitelist to a
/// base config. The other six whitelisted keys don't belong on the
/// persisted [`PipelineConfig`] row; see [`conversation_overrides`] for
/// those. Keys outside the whitelist are dropped (and logged); type
/// mismatches leave the base field untouched.
pub fn apply_request_overrides(
    base: &PipelineConfig,
    overrides: &HashMap<String, serde_json::Value>,
) -> PipelineConfig {
    let mut merged = base.clone();
    for (key, value) in overrides {
        if !OVERRIDE_WHITELIST.contains(&key.as_str()) {
            tracing::warn!(key, "dropping config override key outside whitelist");
            continue;
        }
        if key == "cot_enabled" {
            match value.as_bool() {
                Some(b) => merged.cot_enabled = b,
                None => tracing::warn!(key, "ignoring override with wrong type"),
            }
        }
    }
    merged
}

/// Per-request conversation-shaping toggles from the same spec §4.9
/// whitelist (every key but `cot_enabled`, which `apply_request_overrides`
/// folds into [`PipelineConfig`] instead). These are request-scoped, not
/// persisted: they reshape how this one turn's history is built and how
/// much of the reasoning trace comes back, not the user's stored settings.
/// Unknown keys and type mismatches follow the same drop-and-log /
/// ignore-on-mismatch rules as `apply_request_overrides`.
#[derive(Debug, Clone)]
pub struct ConversationOverrides {
    pub show_cot_steps: bool,
    pub structured_output_enabled: bool,
    pub conversation_aware: bool,
    pub conversation_context: bool,
    pub message_history: usize,
    pub conversation_entities: bool,
}

/// Matches `ConversationContextManager`'s historical default before
/// per-request overrides existed (`ragflow-pipeline`'s search handler used
/// to hardcode this).
const DEFAULT_MESSAGE_HISTORY: usize = 20;

impl Default for ConversationOverrides {
    fn default() -> Self {
        Self {
            show_cot_steps: true,
            structured_output_enabled: true,
            conversation_aware: true,
            conversation_context: true,
            message_history: DEFAULT_MESSAGE_HISTORY,
            conversation_entities: true,
        }
    }
}

pub fn conversation_overrides(overrides: Option<&HashMap<String, serde_json::Value>>) -> ConversationOverrides {
    let mut result = ConversationOverrides::default();
    let Some(overrides) = overrides else {
        return result;
    };
    for (key, value) in overrides {
        match key.as_str() {
            "show_cot_steps" => assign_bool(value, key, &mut result.show_cot_steps),
            "structured_output_enabled" => assign_bool(value, key, &mut result.structured_output_enabled),
            "conversation_aware" => assign_bool(value, key, &mut result.conversation_aware),
            "conversation_context" => assign_bool(value, key, &mut result.conversation_context),
            "conversation_entities" => assign_bool(value, key, &mut result.conversation_entities),
            "message_history" => match value.as_u64() {
                Some(n) => result.message_history = n as usize,
                None => tracing::warn!(key, "ignoring override with wrong type"),
            },
            "cot_enabled" => {}
            _ if OVERRIDE_WHITELIST.contains(&key.as_str()) => {}
            _ => tracing::warn!(key, "dropping config override key outside whitelist"),
        }
    }
    result
}

fn assign_bool(value: &serde_json::Value, key: &str, target: &mut bool) {
    match value.as_bool() {
        Some(b) => *target = b,
        None => tracing::warn!(key, "ignoring override with wrong type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_read_creates_constant_defaults() {
        let store = InMemoryConfigStore::new();
        let user_id = Uuid::new_v4();
        let config = store.get(user_id).await.unwrap();
        assert_eq!(config.user_id, user_id);
        assert_eq!(config.provider, "claude");
        assert!(config.rerank_enabled);
    }

    #[tokio::test]
    async fn write_then_read_returns_the_write() {
        let store = InMemoryConfigStore::new();
        let user_id = Uuid::new_v4();
        let mut config = store.get(user_id).await.unwrap();
        config.cot_enabled = false;
        store.put(config.clone()).await.unwrap();
        let reread = store.get(user_id).await.unwrap();
        assert!(!reread.cot_enabled);
    }

    #[test]
    fn override_whitelist_drops_unknown_keys() {
        let base = PipelineConfig::default_for(Uuid::new_v4());
        let mut overrides = HashMap::new();
        overrides.insert("top_k_final".to_string(), serde_json::json!(999));
        overrides.insert("cot_enabled".to_string(), serde_json::json!(false));
        let merged = apply_request_overrides(&base, &overrides);
        assert_eq!(merged.top_k_final, base.top_k_final);
        assert!(!merged.cot_enabled);
    }

    #[test]
    fn override_with_wrong_type_is_ignored() {
        let base = PipelineConfig::default_for(Uuid::new_v4());
        let mut overrides = HashMap::new();
        overrides.insert("cot_enabled".to_string(), serde_json::json!("not-a-bool"));
        let merged = apply_request_overrides(&base, &overrides);
        assert_eq!(merged.cot_enabled, base.cot_enabled);
    }

    #[test]
    fn conversation_overrides_defaults_with_no_map() {
        let overrides = conversation_overrides(None);
        assert!(overrides.conversation_aware);
        assert_eq!(overrides.message_history, DEFAULT_MESSAGE_HISTORY);
    }

    #[test]
    fn conversation_overrides_reads_every_non_cot_whitelist_key() {
        let mut map = HashMap::new();
        map.insert("show_cot_steps".to_string(), serde_json::json!(false));
        map.insert("structured_output_enabled".to_string(), serde_json::json!(false));
        map.insert("conversation_aware".to_string(), serde_json::json!(false));
        map.insert("conversation_context".to_string(), serde_json::json!(false));
        map.insert("conversation_entities".to_string(), serde_json::json!(false));
        map.insert("message_history".to_string(), serde_json::json!(5));
        let overrides = conversation_overrides(Some(&map));
        assert!(!overrides.show_cot_steps);
        assert!(!overrides.structured_output_enabled);
        assert!(!overrides.conversation_aware);
        assert!(!overrides.conversation_context);
        assert!(!overrides.conversation_entities);
        assert_eq!(overrides.message_history, 5);
    }

    #[test]
    fn conversation_overrides_ignores_wrong_type_and_unknown_keys() {
        let mut map = HashMap::new();
        map.insert("conversation_aware".to_string(), serde_json::json!("not-a-bool"));
        map.insert("message_history".to_string(), serde_json::json!("not-a-number"));
        map.insert("top_k_final".to_string(), serde_json::json!(1));
        let overrides = conversation_overrides(Some(&map));
        assert!(overrides.conversation_aware);
        assert_eq!(overrides.message_history, DEFAULT_MESSAGE_HISTORY);
    }
}
