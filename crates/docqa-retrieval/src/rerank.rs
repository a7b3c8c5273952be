//! Cross-encoder style reranking over fused candidates.
//!
//! Pure scoring contract: one score per (query, chunk text) pair, sorted
//! descending, truncated to top_k. Scorer failures and timeouts return
//! the candidates in their original order with `reranked = false`; the
//! failure reason lands in `model_used`, never in an error.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use docqa_core::traits::RerankScorer;
use docqa_core::types::{Chunk, ScoreKind};

pub const DEFAULT_RERANK_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct RerankOutcome {
    pub chunks: Vec<Chunk>,
    pub model_used: String,
    pub reranked: bool,
}

pub struct Reranker {
    scorer: Arc<dyn RerankScorer>,
    call_timeout: Duration,
}

impl Reranker {
    pub fn new(scorer: Arc<dyn RerankScorer>) -> Self {
        Self {
            scorer,
            call_timeout: DEFAULT_RERANK_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub async fn rerank(&self, query: &str, chunks: Vec<Chunk>, top_k: usize) -> RerankOutcome {
        if chunks.len() <= 1 {
            return RerankOutcome {
                chunks,
                model_used: "none".to_string(),
                reranked: false,
            };
        }

        let docs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let scores = match timeout(self.call_timeout, self.scorer.score_batch(query, &docs)).await
        {
            Ok(Ok(scores)) if scores.len() == chunks.len() => scores,
            Ok(Ok(scores)) => {
                warn!(
                    expected = chunks.len(),
                    got = scores.len(),
                    "rerank score count mismatch, keeping original order"
                );
                return fallback(chunks, top_k, "fallback (score count mismatch)");
            }
            Ok(Err(e)) => {
                warn!(error = %e, "rerank scoring failed, keeping original order");
                return fallback(chunks, top_k, &format!("fallback (error: {})", truncate(&e.to_string(), 50)));
            }
            Err(_) => {
                warn!("rerank scoring timed out, keeping original order");
                return fallback(chunks, top_k, "fallback (timeout)");
            }
        };

        let mut scored: Vec<(Chunk, f32)> = chunks.into_iter().zip(scores).collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        let reranked: Vec<Chunk> = scored
            .into_iter()
            .map(|(mut chunk, score)| {
                chunk.score = score;
                chunk.score_kind = ScoreKind::Rerank;
                chunk
            })
            .collect();

        debug!(returned = reranked.len(), model = self.scorer.name(), "reranked candidates");

        RerankOutcome {
            chunks: reranked,
            model_used: self.scorer.name().to_string(),
            reranked: true,
        }
    }
}

fn fallback(mut chunks: Vec<Chunk>, top_k: usize, reason: &str) -> RerankOutcome {
    chunks.truncate(top_k);
    RerankOutcome {
        chunks,
        model_used: reason.to_string(),
        reranked: false,
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
