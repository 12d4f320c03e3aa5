//! Attribution step of SearchPipeline (C10, spec §4.10 step 6): maps
//! `[n]`-style citations in the answer back to the chunks that were
//! actually passed to generation, in retrieval order. Falls back to
//! "coarse" attribution (all retrieved chunks, unordered) when the answer
//! carries no citation markers.

use once_cell::sync::Lazy;
use regex::Regex;

use ragflow_core::Chunk;

static CITATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionKind {
    Cited,
    Coarse,
}

pub struct Attribution {
    pub kind: AttributionKind,
    pub chunks: Vec<Chunk>,
}

pub fn attribute(answer: &str, retrieved_in_order: &[Chunk]) -> Attribution {
    let indices: Vec<usize> = CITATION
        .captures_iter(answer)
        .filter_map(|c| c[1].parse::<usize>().ok())
        .collect();

    if indices.is_empty() {
        return Attribution { kind: AttributionKind::Coarse, chunks: retrieved_in_order.to_vec() };
    }

    let mut seen = std::collections::HashSet::new();
    let mut chunks = Vec::new();
    for index in indices {
        if index == 0 || index > retrieved_in_order.len() {
            continue;
        }
        if seen.insert(index) {
            chunks.push(retrieved_in_order[index - 1].clone());
        }
    }

    if chunks.is_empty() {
        Attribution { kind: AttributionKind::Coarse, chunks: retrieved_in_order.to_vec() }
    } else {
        Attribution { kind: AttributionKind::Cited, chunks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragflow_core::ChunkMetadata;
    use uuid::Uuid;

    fn make_chunk(text: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            doc_id: Uuid::new_v4(),
            collection_id: Uuid::new_v4(),
            text: text.to_string(),
            embedding: None,
            metadata: ChunkMetadata::default(),
        }
    }

    #[test]
    fn no_citations_falls_back_to_coarse() {
        let chunks = vec![make_chunk("a"), make_chunk("b")];
        let attribution = attribute("no markers here", &chunks);
        assert_eq!(attribution.kind, AttributionKind::Coarse);
        assert_eq!(attribution.chunks.len(), 2);
    }

    #[test]
    fn citations_map_to_chunks_in_order() {
        let chunks = vec![make_chunk("a"), make_chunk("b"), make_chunk("c")];
        let attribution = attribute("see [2] and [1]", &chunks);
        assert_eq!(attribution.kind, AttributionKind::Cited);
        assert_eq!(attribution.chunks[0].text, "b");
        assert_eq!(attribution.chunks[1].text, "a");
    }

    #[test]
    fn out_of_range_citation_is_ignored() {
        let chunks = vec![make_chunk("a")];
        let attribution = attribute("see [9]", &chunks);
        assert_eq!(attribution.kind, AttributionKind::Coarse);
    }
}
