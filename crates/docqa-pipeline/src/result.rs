//! The orchestrator's sole output type and its metadata blocks.
//!
//! `PipelineResult` is always well-formed: at minimum an answer string
//! (possibly empty) and an optional machine-readable error code. The
//! orchestrator never surfaces a raw failure to callers.

use serde::Serialize;

use docqa_core::types::{ChunkId, Meta};

use crate::tracer::TraceRecord;

/// Per-source snippet caps in result assembly.
pub const SOURCE_SNIPPET_LIMIT: usize = 400;
pub const ADVANCED_SNIPPET_LIMIT: usize = 300;

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub id: ChunkId,
    pub score: f32,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRewriteInfo {
    pub original: String,
    pub rewritten: Vec<String>,
    pub strategy: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalMeta {
    pub hybrid_enabled: bool,
    pub reranking_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semantic_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranked: Option<bool>,
    /// Reasons for stages that degraded instead of failing the query.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisInfo {
    pub query_type: String,
    pub sub_queries: Vec<String>,
    pub reasoning_required: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShapingInfo {
    pub original_tokens: usize,
    pub final_tokens: usize,
    pub compression_applied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningInfo {
    pub steps: Vec<String>,
    pub evidence_used: Vec<ChunkId>,
    pub confidence: f32,
    pub reasoning_type: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineResult {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub citations: Vec<SourceRef>,
    #[serde(skip_serializing_if = "Meta::is_empty", default)]
    pub llm_meta: Meta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_rewrite: Option<QueryRewriteInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval_meta: Option<RetrievalMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_analysis: Option<AnalysisInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_shaping: Option<ShapingInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    /// Empty-answer result carrying a machine-readable error code.
    pub fn failure(code: impl Into<String>) -> Self {
        Self {
            error: Some(code.into()),
            ..Self::default()
        }
    }
}
