use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use docqa_core::traits::{KeywordSearch, RerankScorer, SemanticSearch};
use docqa_core::types::{Chunk, ScoreKind, SourceTag};
use docqa_retrieval::{
    ChunkStore, EmbeddingSearcher, HashEmbedder, HybridRetriever, HybridStrategy, Reranker,
};

fn write_corpus(dir: &TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).expect("create corpus");
    for line in lines {
        writeln!(f, "{line}").expect("write line");
    }
    path
}

fn chunk(id: &str, text: &str, score: f32) -> Chunk {
    Chunk::new(id, text, score, ScoreKind::Similarity)
}

struct StaticSource(Vec<Chunk>);

#[async_trait]
impl SemanticSearch for StaticSource {
    async fn search(&self, _query: &str, k: usize) -> anyhow::Result<Vec<Chunk>> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

#[async_trait]
impl KeywordSearch for StaticSource {
    async fn search(&self, _query: &str, k: usize) -> anyhow::Result<Vec<Chunk>> {
        Ok(self.0.iter().take(k).cloned().collect())
    }
}

struct BrokenSource;

#[async_trait]
impl SemanticSearch for BrokenSource {
    async fn search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<Chunk>> {
        anyhow::bail!("vector service unreachable")
    }
}

#[async_trait]
impl KeywordSearch for BrokenSource {
    async fn search(&self, _query: &str, _k: usize) -> anyhow::Result<Vec<Chunk>> {
        anyhow::bail!("index unavailable")
    }
}

// ── ChunkStore ──────────────────────────────────────────────

#[tokio::test]
async fn store_loads_corpus_and_searches() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_corpus(
        &dir,
        "chunks.jsonl",
        &[
            r#"{"id":"a1","filename":"guide.txt","text":"Backups run nightly and retention is thirty days."}"#,
            r#"{"id":"a2","filename":"guide.txt","text":"Restores require an admin token."}"#,
            r#"{"id":"b1","filename":"faq.txt","text":"Pricing is per seat per month."}"#,
        ],
    );

    let store = ChunkStore::new(&path);
    let status = store.status();
    assert!(status.exists);
    assert_eq!(status.chunks, 3);
    assert_eq!(status.documents, 2);

    let hits = KeywordSearch::search(&store, "retention nightly", 10)
        .await
        .expect("search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].id, "a1");
    assert_eq!(hits[0].score_kind, ScoreKind::Bm25);
    assert_eq!(hits[0].sources, vec![SourceTag::Keyword]);
    assert!(hits[0].text.contains("retention"));
}

#[tokio::test]
async fn store_reload_swaps_corpus() {
    let dir = TempDir::new().expect("tempdir");
    let first = write_corpus(&dir, "first.jsonl", &[r#"{"id":"x","text":"old corpus"}"#]);
    let second = write_corpus(
        &dir,
        "second.jsonl",
        &[
            r#"{"id":"y1","text":"new corpus line one"}"#,
            r#"{"id":"y2","text":"new corpus line two"}"#,
        ],
    );

    let store = ChunkStore::new(&first);
    assert_eq!(store.status().chunks, 1);

    let count = store.reload(&second).expect("reload");
    assert_eq!(count, 2);
    let status = store.status();
    assert_eq!(status.chunks, 2);
    assert!(status.path.ends_with("second.jsonl"));
    assert!(store.text_for("y1").is_some());
    assert!(store.text_for("x").is_none());
}

#[tokio::test]
async fn missing_corpus_reports_not_loaded() {
    let store = ChunkStore::new("/nonexistent/chunks.jsonl");
    let status = store.status();
    assert!(!status.exists);
    assert_eq!(status.chunks, 0);

    let hits = KeywordSearch::search(&store, "anything", 5).await.expect("search");
    assert!(hits.is_empty());
}

#[tokio::test]
async fn malformed_lines_are_skipped() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_corpus(
        &dir,
        "chunks.jsonl",
        &[
            r#"{"id":"ok","text":"valid line"}"#,
            "{broken json",
            "",
            r#"{"filename":"d.txt","chunk_id":0,"chunk":"fallback id form"}"#,
        ],
    );
    let store = ChunkStore::new(&path);
    assert_eq!(store.status().chunks, 2);
    assert!(store.text_for("d.txt::0").is_some());
}

// ── HybridRetriever ─────────────────────────────────────────

#[tokio::test]
async fn both_sources_fuse_to_hybrid() {
    let semantic = Arc::new(StaticSource(vec![
        chunk("a", "alpha", 0.9),
        chunk("b", "bravo", 0.8),
    ]));
    let keyword = Arc::new(StaticSource(vec![
        chunk("b", "bravo", 7.0),
        chunk("c", "charlie", 6.0),
    ]));

    let retriever = HybridRetriever::new(semantic, keyword);
    let result = retriever.search("q", 3, 0.7, 0.3, None).await;

    assert_eq!(result.strategy, HybridStrategy::Hybrid);
    assert_eq!(result.semantic_count, 2);
    assert_eq!(result.keyword_count, 2);
    // b appears in both lists and should lead the fused ranking.
    assert_eq!(result.chunks[0].id, "b");
    assert_eq!(result.chunks[0].score_kind, ScoreKind::Rrf);
}

#[tokio::test]
async fn semantic_failure_degrades_to_keyword_only() {
    let keyword = Arc::new(StaticSource(vec![
        chunk("k1", "one", 3.0),
        chunk("k2", "two", 2.0),
        chunk("k3", "three", 1.0),
    ]));
    let retriever = HybridRetriever::new(Arc::new(BrokenSource), keyword);
    let result = retriever.search("q", 5, 0.7, 0.3, None).await;

    assert_eq!(result.strategy, HybridStrategy::KeywordOnly);
    assert_eq!(result.semantic_count, 0);
    assert_eq!(result.keyword_count, 3);
    assert_eq!(result.chunks.len(), 3);
    assert_eq!(result.degraded.len(), 1);
    assert!(result.degraded[0].starts_with("semantic:"));
    // Degraded path keeps the source's own scores untouched.
    assert_eq!(result.chunks[0].score_kind, ScoreKind::Similarity);
}

#[tokio::test]
async fn both_sources_failing_yields_none() {
    let retriever = HybridRetriever::new(Arc::new(BrokenSource), Arc::new(BrokenSource));
    let result = retriever.search("q", 5, 0.7, 0.3, None).await;
    assert_eq!(result.strategy, HybridStrategy::None);
    assert!(result.chunks.is_empty());
}

#[tokio::test]
async fn embedding_searcher_ranks_lexical_overlap_first() {
    let dir = TempDir::new().expect("tempdir");
    let path = write_corpus(
        &dir,
        "chunks.jsonl",
        &[
            r#"{"id":"hit","text":"the backup retention policy is thirty days"}"#,
            r#"{"id":"miss","text":"birds migrate south for the winter"}"#,
        ],
    );
    let store = Arc::new(ChunkStore::new(&path));
    let searcher = EmbeddingSearcher::new(store, Arc::new(HashEmbedder::default()));
    let hits = SemanticSearch::search(&searcher, "backup retention policy", 2)
        .await
        .expect("search");
    assert_eq!(hits[0].id, "hit");
    assert_eq!(hits[0].score_kind, ScoreKind::Similarity);
}

// ── Reranker ────────────────────────────────────────────────

struct ReversingScorer;

#[async_trait]
impl RerankScorer for ReversingScorer {
    fn name(&self) -> &str {
        "reversing-scorer"
    }

    async fn score_batch(&self, _query: &str, docs: &[String]) -> anyhow::Result<Vec<f32>> {
        #[allow(clippy::cast_precision_loss)]
        let scores: Vec<f32> = (0..docs.len()).map(|i| i as f32).collect();
        Ok(scores)
    }
}

struct FailingScorer;

#[async_trait]
impl RerankScorer for FailingScorer {
    fn name(&self) -> &str {
        "failing-scorer"
    }

    async fn score_batch(&self, _query: &str, _docs: &[String]) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("model load failed")
    }
}

#[tokio::test]
async fn reranker_sorts_by_scorer_output() {
    let reranker = Reranker::new(Arc::new(ReversingScorer));
    let input = vec![
        chunk("a", "first", 0.9),
        chunk("b", "second", 0.8),
        chunk("c", "third", 0.7),
    ];
    let out = reranker.rerank("q", input, 2).await;
    assert!(out.reranked);
    assert_eq!(out.model_used, "reversing-scorer");
    assert_eq!(out.chunks.len(), 2);
    assert_eq!(out.chunks[0].id, "c");
    assert_eq!(out.chunks[0].score_kind, ScoreKind::Rerank);
}

#[tokio::test]
async fn scorer_failure_keeps_original_order() {
    let reranker = Reranker::new(Arc::new(FailingScorer));
    let input = vec![
        chunk("a", "first", 0.9),
        chunk("b", "second", 0.8),
        chunk("c", "third", 0.7),
    ];
    let out = reranker.rerank("q", input, 2).await;
    assert!(!out.reranked);
    assert!(out.model_used.starts_with("fallback"));
    let ids: Vec<_> = out.chunks.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn single_candidate_skips_scoring() {
    let reranker = Reranker::new(Arc::new(FailingScorer));
    let out = reranker.rerank("q", vec![chunk("only", "text", 0.5)], 5).await;
    assert!(!out.reranked);
    assert_eq!(out.model_used, "none");
    assert_eq!(out.chunks.len(), 1);
}
