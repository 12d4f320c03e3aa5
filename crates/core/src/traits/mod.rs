mod fsm;
mod provider;

pub use fsm::{PodcastAction, PodcastCheckpoint, PodcastEvent, PodcastFsm, PodcastFsmError};
pub use provider::{
    Embedder, GenerateChunk, GenerateParams, LanguageModel, ProviderError, ProviderErrorKind,
    ProviderKind, RerankCandidate, RerankResult, Reranker, TextToSpeech,
};
