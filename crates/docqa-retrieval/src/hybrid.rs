//! Hybrid retrieval: semantic and keyword sources fused by weighted RRF.
//!
//! Each source call is isolated; one source failing (or timing out)
//! degrades the strategy label instead of failing the search. Both
//! failing yields an empty result with strategy `none`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, warn};

use docqa_core::outcome::StageOutcome;
use docqa_core::traits::{KeywordSearch, SemanticSearch};
use docqa_core::types::Chunk;

use crate::fusion::fuse_weighted;

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HybridStrategy {
    Hybrid,
    SemanticOnly,
    KeywordOnly,
    None,
}

impl HybridStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::SemanticOnly => "semantic_only",
            Self::KeywordOnly => "keyword_only",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HybridSearchResult {
    pub chunks: Vec<Chunk>,
    pub semantic_count: usize,
    pub keyword_count: usize,
    pub strategy: HybridStrategy,
    /// Reasons any source was dropped from this search.
    pub degraded: Vec<String>,
}

pub struct HybridRetriever {
    semantic: Arc<dyn SemanticSearch>,
    keyword: Arc<dyn KeywordSearch>,
    source_timeout: Duration,
}

impl HybridRetriever {
    pub fn new(semantic: Arc<dyn SemanticSearch>, keyword: Arc<dyn KeywordSearch>) -> Self {
        Self {
            semantic,
            keyword,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }

    pub fn with_source_timeout(mut self, source_timeout: Duration) -> Self {
        self.source_timeout = source_timeout;
        self
    }

    /// Search both sources with `fetch_k` candidates each (default
    /// 2×top_k) and fuse to `top_k`. Never returns an error: source
    /// failures degrade the strategy label.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        semantic_weight: f32,
        keyword_weight: f32,
        fetch_k: Option<usize>,
    ) -> HybridSearchResult {
        let fetch_k = fetch_k.unwrap_or(top_k * 2);

        let semantic_fut = timeout(self.source_timeout, self.semantic.search(query, fetch_k));
        let keyword_fut = timeout(self.source_timeout, self.keyword.search(query, fetch_k));
        let (semantic_out, keyword_out) = tokio::join!(semantic_fut, keyword_fut);

        let (semantic_chunks, semantic_reason) = source_outcome("semantic", semantic_out).into_parts();
        let (keyword_chunks, keyword_reason) = source_outcome("keyword", keyword_out).into_parts();

        let mut degraded = Vec::new();
        degraded.extend(semantic_reason);
        degraded.extend(keyword_reason);

        let semantic_chunks = semantic_chunks.unwrap_or_default();
        let keyword_chunks = keyword_chunks.unwrap_or_default();
        let semantic_count = semantic_chunks.len();
        let keyword_count = keyword_chunks.len();

        let (strategy, mut chunks) = match (semantic_count, keyword_count) {
            (0, 0) => (HybridStrategy::None, Vec::new()),
            (_, 0) => (HybridStrategy::SemanticOnly, semantic_chunks),
            (0, _) => (HybridStrategy::KeywordOnly, keyword_chunks),
            _ => (
                HybridStrategy::Hybrid,
                fuse_weighted(
                    &semantic_chunks,
                    &keyword_chunks,
                    semantic_weight,
                    keyword_weight,
                    top_k,
                ),
            ),
        };
        chunks.truncate(top_k);

        debug!(
            strategy = strategy.as_str(),
            semantic_count,
            keyword_count,
            returned = chunks.len(),
            "hybrid search complete"
        );

        HybridSearchResult {
            chunks,
            semantic_count,
            keyword_count,
            strategy,
            degraded,
        }
    }
}

fn source_outcome(
    name: &str,
    out: Result<anyhow::Result<Vec<Chunk>>, tokio::time::error::Elapsed>,
) -> StageOutcome<Vec<Chunk>> {
    match out {
        Ok(Ok(chunks)) => StageOutcome::Ok(chunks),
        Ok(Err(e)) => {
            warn!(source = name, error = %e, "retrieval source failed");
            StageOutcome::Failed(format!("{name}: {e}"))
        }
        Err(_) => {
            warn!(source = name, "retrieval source timed out");
            StageOutcome::Failed(format!("{name}: timed out"))
        }
    }
}
