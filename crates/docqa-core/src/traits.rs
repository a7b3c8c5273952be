//! Collaborator contracts for the external services the pipeline consumes.
//!
//! Embedding computation, vector search, cross-encoder scoring and text
//! generation are all out of scope; components only ever see these traits.

use async_trait::async_trait;

use crate::types::{Chunk, GenerationOutput};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Vector-similarity search over the corpus.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<Chunk>>;
}

/// Lexical ranking over a statically loaded chunk corpus.
#[async_trait]
pub trait KeywordSearch: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<Chunk>>;
}

/// Pairwise (query, document) relevance scoring.
#[async_trait]
pub trait RerankScorer: Send + Sync {
    /// Identifier recorded in retrieval metadata.
    fn name(&self) -> &str;
    /// One score per document, higher is more relevant.
    async fn score_batch(&self, query: &str, docs: &[String]) -> anyhow::Result<Vec<f32>>;
}

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> anyhow::Result<GenerationOutput>;
}
