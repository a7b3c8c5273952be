//! Domain types shared by every pipeline stage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type ChunkId = String;
pub type Meta = HashMap<String, String>;

/// Which retrieval source produced (or contributed to) a chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Semantic,
    Keyword,
}

/// Names the stage that last wrote `Chunk::score`.
///
/// Score semantics differ per stage (raw similarity, BM25, fused RRF,
/// cross-encoder rerank). A stage that rescores a chunk must also update
/// the kind so downstream consumers never misread a prior stage's value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    Similarity,
    Bm25,
    Rrf,
    Rerank,
}

/// A retrieved passage of a source document.
///
/// - `id`: unique within a corpus snapshot (`compressed_context` is the one
///   synthetic id the context shaper may introduce)
/// - `text`: immutable once retrieved; shaping produces derived chunks
/// - `score`/`score_kind`: stage-dependent relevance, see [`ScoreKind`]
/// - `sources`: provenance accumulated by fusion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub score: f32,
    pub score_kind: ScoreKind,
    #[serde(default)]
    pub sources: Vec<SourceTag>,
    #[serde(default)]
    pub metadata: Meta,
}

impl Chunk {
    pub fn new(id: impl Into<ChunkId>, text: impl Into<String>, score: f32, kind: ScoreKind) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
            score_kind: kind,
            sources: Vec::new(),
            metadata: Meta::new(),
        }
    }

    /// Record a provenance tag, keeping the tag set duplicate-free.
    pub fn tag_source(&mut self, tag: SourceTag) {
        if !self.sources.contains(&tag) {
            self.sources.push(tag);
        }
    }
}

/// Output of a text-generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub text: String,
    #[serde(default)]
    pub meta: Meta,
}

impl GenerationOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            meta: Meta::new(),
        }
    }
}
