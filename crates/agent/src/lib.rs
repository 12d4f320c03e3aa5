//! ConversationContextManager (C9): builds per-turn conversation context
//! purely from the message log, with approximate shared token counting.

pub mod context;
pub mod token_counter;

pub use context::{BuiltContext, ConversationContextManager};
pub use token_counter::{HeuristicTokenCounter, TokenCounter};
