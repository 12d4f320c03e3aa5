//! Centralized, domain-agnostic constants: service endpoints and timeouts.
//! Business defaults (retrieval/rerank/CoT parameters) live on
//! [`ragflow_core::PipelineConfig::default_for`] instead, since those vary
//! per user and are not fixed infrastructure.

pub mod endpoints {
    use once_cell::sync::Lazy;

    pub static QDRANT_URL: Lazy<String> =
        Lazy::new(|| std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6333".to_string()));

    pub static ANTHROPIC_API_BASE: Lazy<String> = Lazy::new(|| {
        std::env::var("ANTHROPIC_API_BASE").unwrap_or_else(|_| "https://api.anthropic.com".to_string())
    });

    pub static OPENAI_API_BASE: Lazy<String> = Lazy::new(|| {
        std::env::var("OPENAI_API_BASE").unwrap_or_else(|_| "https://api.openai.com/v1".to_string())
    });
}

pub mod timeouts {
    pub const LLM_REQUEST_MS: u64 = 60_000;
    pub const EMBEDDING_REQUEST_MS: u64 = 15_000;
    pub const RERANK_REQUEST_MS: u64 = 15_000;
    pub const TTS_REQUEST_MS: u64 = 30_000;
    pub const TOOL_GATEWAY_CALL_MS: u64 = 30_000;
    pub const TOOL_GATEWAY_RECOVERY_MS: u64 = 60_000;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_are_positive() {
        assert!(timeouts::LLM_REQUEST_MS > 0);
        assert!(timeouts::TOOL_GATEWAY_CALL_MS > 0);
    }
}
