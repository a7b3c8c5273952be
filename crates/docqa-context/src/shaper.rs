//! Four-stage context shaping: dedup, prune, budget, compress.
//!
//! Stage contracts:
//! - dedup is a greedy pass; a chunk is dropped when its similarity to
//!   any already-kept chunk reaches `dedup_threshold`.
//! - prune drops sentences scoring below `relevance_threshold` against
//!   the query, keeps sub-10-char fragments unconditionally, and always
//!   retains at least the first sentence.
//! - budget allocates tokens proportionally to chunk score, clamped to
//!   `[min_tokens_per_chunk, remaining]`, truncating at word boundaries;
//!   allocation stops once the budget is spent.
//! - compress fires only when the budgeted set still exceeds
//!   `token_budget * 1.2` and a generator is wired in; it replaces the
//!   set with one synthetic `compressed_context` chunk. Generator
//!   failure keeps the pre-compression set.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use docqa_core::tokens::estimate_tokens;
use docqa_core::traits::{Embedder, Generator};
use docqa_core::types::Chunk;

use crate::similarity::{cosine, jaccard, split_sentences};

#[derive(Debug, Clone)]
pub struct ShaperConfig {
    pub token_budget: usize,
    pub dedup_threshold: f32,
    pub relevance_threshold: f32,
    pub min_tokens_per_chunk: usize,
    pub enable_pruning: bool,
    pub enable_compression: bool,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            token_budget: 3000,
            dedup_threshold: 0.85,
            relevance_threshold: 0.3,
            min_tokens_per_chunk: 50,
            enable_pruning: true,
            enable_compression: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ShapeResult {
    pub chunks: Vec<Chunk>,
    pub original_tokens: usize,
    pub final_tokens: usize,
    pub chunks_removed: usize,
    pub compression_applied: bool,
}

pub struct ContextShaper {
    config: ShaperConfig,
    embedder: Option<Arc<dyn Embedder>>,
    generator: Option<Arc<dyn Generator>>,
}

impl ContextShaper {
    pub fn new(config: ShaperConfig) -> Self {
        Self {
            config,
            embedder: None,
            generator: None,
        }
    }

    /// Use embedding cosine for dedup and pruning instead of the
    /// lexical Jaccard fallback.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Enable LLM compression for over-budget contexts.
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub async fn shape(&self, chunks: Vec<Chunk>, query: &str) -> ShapeResult {
        if chunks.is_empty() {
            return ShapeResult {
                chunks: Vec::new(),
                original_tokens: 0,
                final_tokens: 0,
                chunks_removed: 0,
                compression_applied: false,
            };
        }

        let original_tokens: usize = chunks.iter().map(|c| estimate_tokens(&c.text)).sum();

        let (mut kept, chunks_removed) = self.deduplicate(chunks);

        if self.config.enable_pruning {
            kept = kept
                .into_iter()
                .map(|c| self.prune_sentences(c, query))
                .collect();
        }

        let mut shaped = self.budget(kept);

        let budgeted_tokens: usize = shaped.iter().map(|c| estimate_tokens(&c.text)).sum();
        let mut compression_applied = false;
        #[allow(clippy::cast_precision_loss)]
        let compression_trigger = self.config.token_budget as f32 * 1.2;
        #[allow(clippy::cast_precision_loss)]
        if self.config.enable_compression && budgeted_tokens as f32 > compression_trigger {
            if let Some(compressed) = self.compress(&shaped, query).await {
                shaped = vec![compressed];
                compression_applied = true;
            }
        }

        let final_tokens: usize = shaped.iter().map(|c| estimate_tokens(&c.text)).sum();
        debug!(
            original_tokens,
            final_tokens, chunks_removed, compression_applied, "context shaped"
        );

        ShapeResult {
            chunks: shaped,
            original_tokens,
            final_tokens,
            chunks_removed,
            compression_applied,
        }
    }

    fn similarity(&self, a: &str, b: &str) -> f32 {
        if let Some(embedder) = &self.embedder {
            match (embedder.embed(a), embedder.embed(b)) {
                (Ok(va), Ok(vb)) => return cosine(&va, &vb),
                _ => warn!("embedding failed, falling back to lexical similarity"),
            }
        }
        jaccard(a, b)
    }

    fn deduplicate(&self, chunks: Vec<Chunk>) -> (Vec<Chunk>, usize) {
        if chunks.len() <= 1 {
            return (chunks, 0);
        }

        let mut kept: Vec<Chunk> = Vec::with_capacity(chunks.len());
        let mut removed = 0;
        for chunk in chunks {
            let duplicate = kept
                .iter()
                .any(|k| self.similarity(&chunk.text, &k.text) >= self.config.dedup_threshold);
            if duplicate {
                removed += 1;
            } else {
                kept.push(chunk);
            }
        }
        (kept, removed)
    }

    fn prune_sentences(&self, mut chunk: Chunk, query: &str) -> Chunk {
        let sentences = split_sentences(&chunk.text);
        if sentences.len() <= 1 {
            return chunk;
        }

        let mut relevant: Vec<&String> = sentences
            .iter()
            .filter(|s| {
                s.chars().count() < 10
                    || self.similarity(query, s) >= self.config.relevance_threshold
            })
            .collect();

        if relevant.is_empty() {
            relevant.push(&sentences[0]);
        }

        let pruned = sentences.len() - relevant.len();
        if pruned > 0 {
            chunk.text = relevant
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            chunk
                .metadata
                .insert("sentences_pruned".to_string(), pruned.to_string());
        }
        chunk
    }

    fn budget(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        if chunks.is_empty() {
            return chunks;
        }

        let total_score: f32 = chunks.iter().map(|c| c.score).sum();
        #[allow(clippy::cast_precision_loss)]
        let total_score = if total_score > 0.0 {
            total_score
        } else {
            chunks.len() as f32
        };

        let mut budgeted = Vec::with_capacity(chunks.len());
        let mut remaining = self.config.token_budget;

        for mut chunk in chunks {
            if remaining == 0 {
                break;
            }
            let weight = if chunk.score > 0.0 { chunk.score } else { 1.0 };
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let share = ((weight / total_score) * self.config.token_budget as f32) as usize;
            let chunk_budget = share.max(self.config.min_tokens_per_chunk).min(remaining);
            if chunk_budget == 0 {
                continue;
            }

            if estimate_tokens(&chunk.text) > chunk_budget {
                chunk.text = truncate_at_word(&chunk.text, chunk_budget * 4);
            }
            chunk
                .metadata
                .insert("budget_allocated".to_string(), chunk_budget.to_string());
            remaining = remaining.saturating_sub(estimate_tokens(&chunk.text));
            budgeted.push(chunk);
        }
        budgeted
    }

    async fn compress(&self, chunks: &[Chunk], query: &str) -> Option<Chunk> {
        let generator = self.generator.as_ref()?;

        let combined = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Summarize the following context to approximately {} characters.\n\
             Preserve all key facts relevant to this query: {query}\n\
             Keep specific names, numbers, and dates.\n\n\
             Context:\n{combined}\n\nSummary:",
            self.config.token_budget * 4
        );

        match generator.generate(&prompt, 0.0, self.config.token_budget).await {
            Ok(out) if !out.text.trim().is_empty() => {
                let best = chunks
                    .iter()
                    .max_by(|a, b| {
                        a.score
                            .partial_cmp(&b.score)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })?;
                let mut compressed = Chunk::new(
                    "compressed_context",
                    out.text.trim(),
                    best.score,
                    best.score_kind,
                );
                compressed
                    .metadata
                    .insert("compressed_from".to_string(), chunks.len().to_string());
                Some(compressed)
            }
            Ok(_) => {
                warn!("compression returned empty text, keeping budgeted chunks");
                None
            }
            Err(e) => {
                warn!(error = %e, "compression failed, keeping budgeted chunks");
                None
            }
        }
    }
}

fn truncate_at_word(text: &str, char_limit: usize) -> String {
    let cut: String = text.chars().take(char_limit).collect();
    let head = match cut.rfind(' ') {
        Some(pos) => &cut[..pos],
        None => cut.as_str(),
    };
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docqa_core::types::{GenerationOutput, ScoreKind};

    fn chunk(id: &str, text: &str, score: f32) -> Chunk {
        Chunk::new(id, text, score, ScoreKind::Rerank)
    }

    fn shaper(config: ShaperConfig) -> ContextShaper {
        ContextShaper::new(config)
    }

    struct FixedGenerator(String);

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _temperature: f32,
            _max_tokens: usize,
        ) -> anyhow::Result<GenerationOutput> {
            Ok(GenerationOutput::new(self.0.clone()))
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl Generator for FailingGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _temperature: f32,
            _max_tokens: usize,
        ) -> anyhow::Result<GenerationOutput> {
            anyhow::bail!("provider offline")
        }
    }

    #[tokio::test]
    async fn empty_input_is_a_noop() {
        let result = shaper(ShaperConfig::default()).shape(Vec::new(), "q").await;
        assert!(result.chunks.is_empty());
        assert_eq!(result.original_tokens, 0);
        assert_eq!(result.final_tokens, 0);
        assert!(!result.compression_applied);
    }

    #[tokio::test]
    async fn identical_chunks_deduplicate() {
        let text = "the backup retention policy is thirty days for all tiers";
        let result = shaper(ShaperConfig {
            enable_pruning: false,
            ..ShaperConfig::default()
        })
        .shape(
            vec![chunk("a", text, 0.9), chunk("b", text, 0.8), chunk("c", "something else entirely", 0.7)],
            "backup retention",
        )
        .await;

        assert_eq!(result.chunks_removed, 1);
        assert_eq!(result.chunks.len(), 2);
        assert_eq!(result.chunks[0].id, "a");
    }

    #[test]
    fn dedup_is_idempotent() {
        let s = shaper(ShaperConfig::default());
        let text = "the backup retention policy is thirty days for all tiers";
        let chunks = vec![
            chunk("a", text, 0.9),
            chunk("b", text, 0.8),
            chunk("c", "the backup retention policy is thirty days for every tier", 0.7),
            chunk("d", "invoices are issued monthly", 0.6),
        ];

        let (kept, removed) = s.deduplicate(chunks);
        assert_eq!(removed, 1);

        let survivors = kept.len();
        let (again, removed_again) = s.deduplicate(kept);
        assert_eq!(removed_again, 0);
        assert_eq!(again.len(), survivors);
    }

    #[test]
    fn budget_allocations_sum_within_the_requested_budget() {
        let budget = 100;
        let floor = 30;
        let s = shaper(ShaperConfig {
            token_budget: budget,
            min_tokens_per_chunk: floor,
            enable_pruning: false,
            enable_compression: false,
            ..ShaperConfig::default()
        });
        let body = "alpha ".repeat(120);
        let chunks: Vec<Chunk> = (0..4)
            .map(|i| chunk(&format!("c{i}"), body.trim(), 0.5))
            .collect();

        let out = s.budget(chunks);

        let total: usize = out.iter().map(|c| estimate_tokens(&c.text)).sum();
        assert!(total <= budget + floor);
        for c in &out {
            let allocated: usize = c
                .metadata
                .get("budget_allocated")
                .expect("allocation recorded")
                .parse()
                .expect("numeric allocation");
            assert!(allocated <= budget.max(floor));
        }
    }

    #[tokio::test]
    async fn pruning_floors_at_first_sentence() {
        let text = "Unrelated opening statement about something different. \
                    Another wholly unrelated sentence follows here.";
        let result = shaper(ShaperConfig {
            relevance_threshold: 0.99,
            ..ShaperConfig::default()
        })
        .shape(vec![chunk("a", text, 0.9)], "backup retention policy")
        .await;

        assert_eq!(result.chunks.len(), 1);
        assert!(result.chunks[0]
            .text
            .starts_with("Unrelated opening statement"));
        assert!(result.chunks[0].metadata.contains_key("sentences_pruned"));
    }

    #[tokio::test]
    async fn short_fragments_survive_pruning() {
        let text = "Yes. A sentence with no overlap to the question whatsoever here.";
        let result = shaper(ShaperConfig {
            relevance_threshold: 0.99,
            ..ShaperConfig::default()
        })
        .shape(vec![chunk("a", text, 0.9)], "backup retention policy")
        .await;
        assert!(result.chunks[0].text.contains("Yes."));
    }

    #[tokio::test]
    async fn over_budget_chunks_truncate_at_word_boundary() {
        let long = "word ".repeat(400); // ~500 tokens
        let result = shaper(ShaperConfig {
            token_budget: 100,
            min_tokens_per_chunk: 10,
            enable_pruning: false,
            enable_compression: false,
            ..ShaperConfig::default()
        })
        .shape(vec![chunk("a", long.trim(), 1.0)], "q")
        .await;

        assert_eq!(result.chunks.len(), 1);
        assert!(result.chunks[0].text.ends_with("..."));
        assert!(result.final_tokens <= 110);
        assert!(result.final_tokens < result.original_tokens);
    }

    #[tokio::test]
    async fn budget_drops_trailing_low_scored_chunks() {
        let body = "alpha ".repeat(200);
        let chunks = vec![
            chunk("hi", body.trim(), 0.9),
            chunk("mid", body.trim(), 0.5),
            chunk("lo", body.trim(), 0.1),
        ];
        let result = shaper(ShaperConfig {
            token_budget: 120,
            min_tokens_per_chunk: 50,
            enable_pruning: false,
            enable_compression: false,
            ..ShaperConfig::default()
        })
        .shape(chunks, "q")
        .await;

        assert!(result.chunks.len() < 3);
        assert_eq!(result.chunks[0].id, "hi");
    }

    #[tokio::test]
    async fn compression_builds_single_synthetic_chunk() {
        let chunks = vec![
            chunk("a", "first budgeted chunk text", 0.4),
            chunk("b", "second budgeted chunk text", 0.9),
        ];
        let shaper = shaper(ShaperConfig::default())
            .with_generator(Arc::new(FixedGenerator("Condensed summary.".to_string())));

        let compressed = shaper.compress(&chunks, "q").await.expect("compressed");
        assert_eq!(compressed.id, "compressed_context");
        assert_eq!(compressed.text, "Condensed summary.");
        assert!((compressed.score - 0.9).abs() < 1e-6);
        assert_eq!(compressed.metadata.get("compressed_from").map(String::as_str), Some("2"));
    }

    #[tokio::test]
    async fn compression_failure_yields_none() {
        let chunks = vec![chunk("a", "some chunk text", 0.4)];
        let shaper = shaper(ShaperConfig::default()).with_generator(Arc::new(FailingGenerator));
        assert!(shaper.compress(&chunks, "q").await.is_none());
    }

    #[tokio::test]
    async fn within_budget_context_is_never_compressed() {
        let chunks = vec![
            chunk("a", "short text about the topic", 0.9),
            chunk("b", "another short unrelated text", 0.5),
        ];
        let shaper = shaper(ShaperConfig::default())
            .with_generator(Arc::new(FixedGenerator("should not be used".to_string())));
        let result = shaper.shape(chunks, "topic").await;
        assert!(!result.compression_applied);
        assert_eq!(result.chunks.len(), 2);
    }

    #[tokio::test]
    async fn chunk_count_never_grows() {
        let chunks: Vec<Chunk> = (0..8)
            .map(|i| chunk(&format!("c{i}"), &format!("text number {i} about topic"), 0.5))
            .collect();
        let input_len = chunks.len();
        let result = shaper(ShaperConfig::default()).shape(chunks, "topic").await;
        assert!(result.chunks.len() <= input_len);
    }
}
