//! Process settings, the prompt template store (C5) and the per-user
//! pipeline config store (C13).

pub mod constants;
pub mod pipeline_config_store;
pub mod settings;
pub mod templates;

pub use pipeline_config_store::{
    apply_request_overrides, conversation_overrides, ConfigStore, ConversationOverrides, InMemoryConfigStore,
};
pub use settings::{
    load_settings, AuthConfig, FeatureFlags, ObservabilityConfig, PersistenceConfig,
    RateLimitConfig, RuntimeEnvironment, ServerConfig, Settings,
};
pub use templates::{
    InMemoryPromptTemplateStore, PromptTemplate, PromptTemplateStore, COT_CLASSIFY, COT_DECOMPOSE,
    COT_SYNTHESIZE, PODCAST_SCRIPT, QUERY_REWRITE, QUESTION_SUGGESTION, RAG_GENERATION,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("failed to parse configuration: {0}")]
    ParseError(String),
    #[error("missing required field: {0}")]
    MissingField(String),
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
