//! Multi-provider LLM/embedding/reranker/TTS abstraction: the
//! [`ProviderRegistry`] (C1) and [`TokenTracker`]/[`WarningEvaluator`] (C6).

mod claude;
mod embed;
mod registry;
mod rerank;
mod tracker;
mod tts;

pub use registry::{ProviderRegistry, RegistryConfig};
pub use tracker::{TokenTracker, WarningEvaluator};

// Re-exported so callers can construct a registry with non-default backends
// in tests without reaching into private modules.
pub use claude::ClaudeLanguageModel;
pub use embed::HttpEmbedder;
pub use rerank::HttpReranker;
pub use tts::{ElevenLabsTts, OpenAiTts};
