//! Structured output parsing (C7, spec §4.7): turns a raw LLM response into
//! a clean answer string plus a quality score, via a five-layer fallback
//! chain of extraction strategies.

pub mod parser;

pub use parser::{ParseOutcome, ParseStrategy, StructuredOutputParser};
