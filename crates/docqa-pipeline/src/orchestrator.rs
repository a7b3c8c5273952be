//! Pipeline orchestration.
//!
//! Two modes over the same stage set. Simple mode runs rewrite,
//! per-variant hybrid retrieval, cross-variant fusion, optional rerank
//! and grounded generation. Advanced mode adds query analysis, context
//! shaping and the reasoning branch, with every stage traced when
//! tracing is on.
//!
//! Terminal conditions are exactly three: an empty query, every
//! retrieval source empty across all variants, and the final generation
//! call failing. Everything else degrades with the reason recorded in
//! result metadata; `orchestrate*` never returns an error.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use docqa_context::{ContextShaper, ShaperConfig};
use docqa_core::error::PipelineError;
use docqa_core::traits::{Generator, KeywordSearch, RerankScorer, SemanticSearch};
use docqa_core::types::Chunk;
use docqa_query::{analyze_query, rewrite_query, QueryRewriteResult, RewriteStrategy};
use docqa_reasoning::{build_rag_prompt, reason_over_evidence};
use docqa_retrieval::fusion::merge_variant_results;
use docqa_retrieval::hybrid::DEFAULT_SOURCE_TIMEOUT;
use docqa_retrieval::{ChunkStore, HybridRetriever, IndexStatus, Reranker};

use crate::citations::{build_citations, enrich_snippets, extract_cited_ids};
use crate::result::{
    AnalysisInfo, PipelineResult, QueryRewriteInfo, ReasoningInfo, RetrievalMeta, ShapingInfo,
    SourceRef, ADVANCED_SNIPPET_LIMIT, SOURCE_SNIPPET_LIMIT,
};
use crate::tracer::PipelineTracer;

const NO_RESULTS: &str = "no_retrieval_results";
const REWRITE_VARIANTS: usize = 3;

/// Ceiling on the whole per-query retrieval fan-out. Dropping the joined
/// future on expiry cancels every in-flight source call.
const RETRIEVAL_DEADLINE: Duration = Duration::from_secs(30);

/// Ceiling on a single LLM call (rewrite, generation, reasoning).
/// Expiry on the final generation is terminal; elsewhere it degrades.
const LLM_DEADLINE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub top_k: usize,
    pub rewrite_strategy: RewriteStrategy,
    pub use_hybrid: bool,
    pub use_reranking: bool,
    pub semantic_weight: f32,
    pub keyword_weight: f32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            rewrite_strategy: RewriteStrategy::Auto,
            use_hybrid: true,
            use_reranking: true,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdvancedOptions {
    pub top_k: usize,
    pub token_budget: usize,
    pub enable_reasoning: bool,
    pub enable_tracing: bool,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            token_budget: 3000,
            enable_reasoning: true,
            enable_tracing: true,
        }
    }
}

pub struct Orchestrator {
    store: Arc<ChunkStore>,
    semantic: Arc<dyn SemanticSearch>,
    retriever: HybridRetriever,
    reranker: Reranker,
    generator: Arc<dyn Generator>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<ChunkStore>,
        semantic: Arc<dyn SemanticSearch>,
        scorer: Arc<dyn RerankScorer>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        let keyword: Arc<dyn KeywordSearch> = Arc::clone(&store) as Arc<dyn KeywordSearch>;
        let retriever = HybridRetriever::new(Arc::clone(&semantic), keyword);
        Self {
            store,
            semantic,
            retriever,
            reranker: Reranker::new(scorer),
            generator,
        }
    }

    /// Swap the corpus and rebuild the keyword index. Returns the chunk
    /// count loaded.
    pub fn set_index_path(&self, path: impl Into<PathBuf>) -> anyhow::Result<usize> {
        self.store.reload(path)
    }

    pub fn index_status(&self) -> IndexStatus {
        self.store.status()
    }

    /// Simple mode: rewrite, retrieve per variant, fuse, rerank,
    /// generate, cite.
    pub async fn orchestrate(&self, query: &str, options: &QueryOptions) -> PipelineResult {
        let query = query.trim();
        if query.is_empty() {
            return PipelineResult::failure(PipelineError::InvalidInput.code());
        }
        let top_k = if options.top_k == 0 { 3 } else { options.top_k };

        let mut meta = RetrievalMeta {
            hybrid_enabled: options.use_hybrid,
            reranking_enabled: options.use_reranking,
            ..RetrievalMeta::default()
        };

        // Rewriting never fails the request; generator errors and the
        // deadline both degrade to the original query.
        let (variants, rewrite_info) = if options.rewrite_strategy == RewriteStrategy::None {
            (vec![query.to_string()], None)
        } else {
            let rewrite = match timeout(
                LLM_DEADLINE,
                rewrite_query(
                    query,
                    REWRITE_VARIANTS,
                    options.rewrite_strategy,
                    Some(self.generator.as_ref()),
                ),
            )
            .await
            {
                Ok(rewrite) => rewrite,
                Err(_) => {
                    warn!("query rewrite exceeded deadline, keeping original query");
                    meta.degraded.push("rewrite: deadline exceeded".to_string());
                    rewrite_fallback(query)
                }
            };
            let info = QueryRewriteInfo {
                original: rewrite.original_query,
                rewritten: rewrite.rewritten_queries.clone(),
                strategy: rewrite.strategy_used,
            };
            (rewrite.rewritten_queries, Some(info))
        };

        let mut lists = self
            .retrieve_variants(&variants, top_k, options, &mut meta)
            .await;

        if lists.is_empty() {
            let mut failure =
                PipelineResult::failure(PipelineError::RetrievalExhausted(String::new()).code());
            failure.query_rewrite = rewrite_info;
            failure.retrieval_meta = Some(meta);
            return failure;
        }

        let merge_k = if options.use_reranking { top_k * 2 } else { top_k };
        let mut chunks = if lists.len() == 1 {
            lists.swap_remove(0)
        } else {
            merge_variant_results(&lists, merge_k)
        };
        if chunks.is_empty() {
            let mut failure = PipelineResult::failure(NO_RESULTS);
            failure.query_rewrite = rewrite_info;
            failure.retrieval_meta = Some(meta);
            return failure;
        }

        // Rerank degrades internally; a fallback shows up in model_used.
        if options.use_reranking && chunks.len() > 1 {
            let outcome = self.reranker.rerank(query, chunks, top_k).await;
            if !outcome.reranked && outcome.model_used != "none" {
                meta.degraded.push(format!("rerank: {}", outcome.model_used));
            }
            meta.rerank_model = Some(outcome.model_used);
            meta.reranked = Some(outcome.reranked);
            chunks = outcome.chunks;
        } else {
            chunks.truncate(top_k);
        }

        let prompt = build_rag_prompt(query, &chunks, top_k, true);
        let generated = match timeout(LLM_DEADLINE, self.generator.generate(&prompt, 0.0, 512)).await
        {
            Ok(generated) => generated,
            Err(_) => Err(anyhow::anyhow!(
                "generation exceeded the {}s deadline",
                LLM_DEADLINE.as_secs()
            )),
        };
        let output = match generated {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "generation failed");
                let mut failure =
                    PipelineResult::failure(PipelineError::Generation(e.to_string()).code());
                failure
                    .llm_meta
                    .insert("error_detail".to_string(), truncate(&e.to_string(), 100));
                failure.query_rewrite = rewrite_info;
                failure.retrieval_meta = Some(meta);
                return failure;
            }
        };
        let answer = output.text.trim().to_string();

        let mut sources = self.build_sources(&chunks, SOURCE_SNIPPET_LIMIT);
        let cited_ids = extract_cited_ids(&answer);
        let mut citations = build_citations(&cited_ids, &sources);
        enrich_snippets(&mut sources, &self.store, SOURCE_SNIPPET_LIMIT);
        enrich_snippets(&mut citations, &self.store, SOURCE_SNIPPET_LIMIT);

        debug!(
            sources = sources.len(),
            citations = citations.len(),
            "query orchestrated"
        );

        PipelineResult {
            answer,
            sources,
            citations,
            llm_meta: output.meta,
            query_rewrite: rewrite_info,
            retrieval_meta: Some(meta),
            ..PipelineResult::default()
        }
    }

    /// Advanced mode: analysis, rewriting, retrieval, rerank, shaping,
    /// then reasoning or direct generation, optionally traced.
    pub async fn orchestrate_advanced(
        &self,
        query: &str,
        options: &AdvancedOptions,
    ) -> PipelineResult {
        let query = query.trim();
        if query.is_empty() {
            return PipelineResult::failure(PipelineError::InvalidInput.code());
        }
        let top_k = if options.top_k == 0 { 5 } else { options.top_k };
        let tracer = options.enable_tracing.then(|| PipelineTracer::new(query));

        let analysis = {
            let mut span = tracer.as_ref().map(|t| t.stage("query_analysis"));
            let analysis = analyze_query(query);
            if let Some(span) = &mut span {
                span.meta("query_type", analysis.query_type.as_str());
                span.meta("sub_queries", analysis.sub_queries.len());
                span.meta("reasoning_required", analysis.reasoning_required);
            }
            analysis
        };

        let rewrite = {
            let mut span = tracer.as_ref().map(|t| t.stage("query_rewrite"));
            let rewrite = match timeout(
                LLM_DEADLINE,
                rewrite_query(
                    query,
                    REWRITE_VARIANTS,
                    RewriteStrategy::Auto,
                    Some(self.generator.as_ref()),
                ),
            )
            .await
            {
                Ok(rewrite) => rewrite,
                Err(_) => {
                    warn!("query rewrite exceeded deadline, keeping original query");
                    if let Some(span) = &mut span {
                        span.fail("deadline exceeded");
                    }
                    rewrite_fallback(query)
                }
            };
            if let Some(span) = &mut span {
                span.meta("strategy", rewrite.strategy_used.as_str());
                span.meta("variants", rewrite.rewritten_queries.len());
            }
            rewrite
        };

        let all_chunks = {
            let mut span = tracer.as_ref().map(|t| t.stage("retrieval"));
            let joined = timeout(
                RETRIEVAL_DEADLINE,
                join_all(
                    rewrite
                        .rewritten_queries
                        .iter()
                        .map(|q| self.retriever.search(q, top_k * 2, 0.7, 0.3, None)),
                ),
            )
            .await;
            let results = match joined {
                Ok(results) => results,
                Err(_) => {
                    warn!("retrieval fan-out exceeded deadline, in-flight calls dropped");
                    if let Some(span) = &mut span {
                        span.fail("deadline exceeded");
                    }
                    Vec::new()
                }
            };
            let chunks: Vec<Chunk> = results.into_iter().flat_map(|r| r.chunks).collect();
            if let Some(span) = &mut span {
                span.meta("queries_searched", rewrite.rewritten_queries.len());
                span.meta("chunks_found", chunks.len());
            }
            chunks
        };

        if all_chunks.is_empty() {
            let code = PipelineError::RetrievalExhausted(String::new()).code();
            let mut failure = PipelineResult::failure(code);
            if let Some(tracer) = tracer {
                tracer.set_error(code);
                failure.trace = Some(tracer.finish(""));
            }
            return failure;
        }

        let mut seen: HashSet<String> = HashSet::new();
        let unique: Vec<Chunk> = all_chunks
            .into_iter()
            .filter(|c| !c.id.is_empty() && seen.insert(c.id.clone()))
            .collect();

        let chunks = {
            let input_len = unique.len();
            let mut span = tracer.as_ref().map(|t| t.stage("reranking"));
            let outcome = self.reranker.rerank(query, unique, top_k * 2).await;
            if let Some(span) = &mut span {
                span.meta("input_chunks", input_len);
                span.meta("output_chunks", outcome.chunks.len());
                span.meta("model", outcome.model_used.as_str());
            }
            outcome.chunks
        };

        let shape = {
            let mut span = tracer.as_ref().map(|t| t.stage("context_shaping"));
            let shaper = ContextShaper::new(ShaperConfig {
                token_budget: options.token_budget,
                ..ShaperConfig::default()
            })
            .with_generator(Arc::clone(&self.generator));
            let shape = shaper.shape(chunks, query).await;
            if let Some(span) = &mut span {
                span.meta("original_tokens", shape.original_tokens);
                span.meta("final_tokens", shape.final_tokens);
                span.meta("chunks_removed", shape.chunks_removed);
                span.meta("compression", shape.compression_applied);
            }
            shape
        };
        let mut shaped = shape.chunks;
        shaped.truncate(top_k);

        let shaping_info = ShapingInfo {
            original_tokens: shape.original_tokens,
            final_tokens: shape.final_tokens,
            compression_applied: shape.compression_applied,
        };
        let analysis_info = AnalysisInfo {
            query_type: analysis.query_type.as_str().to_string(),
            sub_queries: analysis.sub_queries.clone(),
            reasoning_required: analysis.reasoning_required,
        };

        let (answer, reasoning_info, llm_meta) =
            if options.enable_reasoning && analysis.reasoning_required {
                let mut span = tracer.as_ref().map(|t| t.stage("reasoning"));
                let reasoning = match timeout(
                    LLM_DEADLINE,
                    reason_over_evidence(query, &shaped, analysis.query_type.as_str(), &self.generator),
                )
                .await
                {
                    Ok(reasoning) => reasoning,
                    Err(_) => {
                        warn!("reasoning exceeded deadline");
                        if let Some(span) = &mut span {
                            span.fail("deadline exceeded");
                        }
                        drop(span);
                        let code =
                            PipelineError::Generation("reasoning deadline exceeded".to_string())
                                .code();
                        let mut failure = PipelineResult::failure(code);
                        failure.query_analysis = Some(analysis_info);
                        failure.context_shaping = Some(shaping_info);
                        if let Some(tracer) = tracer {
                            failure.trace = Some(tracer.finish(""));
                        }
                        return failure;
                    }
                };
                if let Some(span) = &mut span {
                    span.meta("reasoning_type", reasoning.reasoning_type.as_str());
                    span.meta("evidence_used", reasoning.evidence_used.len());
                    span.meta("confidence", reasoning.confidence);
                }
                let info = ReasoningInfo {
                    steps: reasoning.reasoning_steps,
                    evidence_used: reasoning.evidence_used,
                    confidence: reasoning.confidence,
                    reasoning_type: reasoning.reasoning_type,
                };
                (reasoning.answer, Some(info), docqa_core::types::Meta::new())
            } else {
                let generated = {
                    let mut span = tracer.as_ref().map(|t| t.stage("generation"));
                    let prompt = build_rag_prompt(query, &shaped, top_k, true);
                    let result = match timeout(
                        LLM_DEADLINE,
                        self.generator.generate(&prompt, 0.0, 800),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!(
                            "generation exceeded the {}s deadline",
                            LLM_DEADLINE.as_secs()
                        )),
                    };
                    match &result {
                        Ok(out) => {
                            if let Some(span) = &mut span {
                                span.meta("prompt_length", prompt.chars().count());
                                span.meta("answer_length", out.text.trim().chars().count());
                            }
                        }
                        Err(e) => {
                            if let Some(span) = &mut span {
                                span.fail(e.to_string());
                            }
                        }
                    }
                    result
                };
                match generated {
                    Ok(out) => (out.text.trim().to_string(), None, out.meta),
                    Err(e) => {
                        warn!(error = %e, "generation failed");
                        let mut failure = PipelineResult::failure(
                            PipelineError::Generation(e.to_string()).code(),
                        );
                        failure.query_analysis = Some(analysis_info);
                        failure.context_shaping = Some(shaping_info);
                        if let Some(tracer) = tracer {
                            failure.trace = Some(tracer.finish(""));
                        }
                        return failure;
                    }
                }
            };

        let sources = self.build_sources(&shaped, ADVANCED_SNIPPET_LIMIT);

        PipelineResult {
            sources,
            llm_meta,
            query_analysis: Some(analysis_info),
            context_shaping: Some(shaping_info),
            reasoning: reasoning_info,
            trace: tracer.map(|t| t.finish(&answer)),
            answer,
            ..PipelineResult::default()
        }
    }

    /// Run hybrid or semantic-only retrieval per rewritten variant,
    /// concurrently. Variant failures are skipped; only non-empty result
    /// lists are returned.
    async fn retrieve_variants(
        &self,
        variants: &[String],
        top_k: usize,
        options: &QueryOptions,
        meta: &mut RetrievalMeta,
    ) -> Vec<Vec<Chunk>> {
        let mut lists: Vec<Vec<Chunk>> = Vec::new();

        if options.use_hybrid {
            // Over-fetch so fusion and reranking have candidates to work with.
            let fetch_k = if options.use_reranking {
                top_k * 3
            } else {
                top_k * 2
            };
            let joined = timeout(
                RETRIEVAL_DEADLINE,
                join_all(variants.iter().map(|q| {
                    self.retriever.search(
                        q,
                        fetch_k,
                        options.semantic_weight,
                        options.keyword_weight,
                        None,
                    )
                })),
            )
            .await;
            let Ok(results) = joined else {
                warn!("retrieval fan-out exceeded deadline, in-flight calls dropped");
                meta.degraded.push("retrieval: deadline exceeded".to_string());
                return lists;
            };
            for result in results {
                for reason in result.degraded {
                    if !meta.degraded.contains(&reason) {
                        meta.degraded.push(reason);
                    }
                }
                if result.chunks.is_empty() {
                    continue;
                }
                // Source metadata reports the first non-empty variant,
                // which is always the original query.
                if meta.hybrid_strategy.is_none() {
                    meta.hybrid_strategy = Some(result.strategy.as_str().to_string());
                    meta.semantic_count = Some(result.semantic_count);
                    meta.keyword_count = Some(result.keyword_count);
                }
                lists.push(result.chunks);
            }
        } else {
            let fetch_k = if options.use_reranking { top_k * 2 } else { top_k };
            let joined = timeout(
                RETRIEVAL_DEADLINE,
                join_all(
                    variants
                        .iter()
                        .map(|q| timeout(DEFAULT_SOURCE_TIMEOUT, self.semantic.search(q, fetch_k))),
                ),
            )
            .await;
            let Ok(results) = joined else {
                warn!("retrieval fan-out exceeded deadline, in-flight calls dropped");
                meta.degraded.push("retrieval: deadline exceeded".to_string());
                return lists;
            };
            for result in results {
                match result {
                    Ok(Ok(chunks)) if !chunks.is_empty() => lists.push(chunks),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => warn!(error = %e, "semantic retrieval failed for variant"),
                    Err(_) => warn!("semantic retrieval timed out for variant"),
                }
            }
        }
        lists
    }

    fn build_sources(&self, chunks: &[Chunk], snippet_limit: usize) -> Vec<SourceRef> {
        chunks
            .iter()
            .map(|c| {
                let text = if c.text.is_empty() {
                    self.store.text_for(&c.id).unwrap_or_default()
                } else {
                    c.text.clone()
                };
                SourceRef {
                    id: c.id.clone(),
                    score: c.score,
                    snippet: text.chars().take(snippet_limit).collect(),
                }
            })
            .collect()
    }
}

fn rewrite_fallback(query: &str) -> QueryRewriteResult {
    QueryRewriteResult {
        original_query: query.to_string(),
        rewritten_queries: vec![query.to_string()],
        strategy_used: "none".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
