//! Reference semantic search: brute-force cosine over the chunk store.
//!
//! Production deployments plug a vector service in behind
//! [`SemanticSearch`]; this searcher keeps the whole pipeline runnable
//! offline and is plenty at test-corpus sizes.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use twox_hash::XxHash64;

use docqa_core::traits::{Embedder, SemanticSearch};
use docqa_core::types::{Chunk, ScoreKind, SourceTag};

use crate::store::ChunkStore;

/// Deterministic hashing embedder: tokens are hashed into buckets and the
/// vector L2-normalized. No model files, stable across runs.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0f32; self.dim];
        for token in text.to_lowercase().split_whitespace() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            #[allow(clippy::cast_precision_loss)]
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + 0.1;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        Ok(v)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Embedding-based searcher over the shared [`ChunkStore`].
pub struct EmbeddingSearcher {
    store: Arc<ChunkStore>,
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingSearcher {
    pub fn new(store: Arc<ChunkStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self { store, embedder }
    }
}

#[async_trait]
impl SemanticSearch for EmbeddingSearcher {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        let query_vec = self.embedder.embed(query)?;

        let mut scored: Vec<Chunk> = Vec::new();
        for (id, text) in self.store.entries() {
            let chunk_vec = self.embedder.embed(&text)?;
            let score = cosine(&query_vec, &chunk_vec);
            let mut chunk = Chunk::new(id, text, score, ScoreKind::Similarity);
            chunk.tag_source(SourceTag::Semantic);
            scored.push(chunk);
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }
}
