//! Weighted Reciprocal Rank Fusion.
//!
//! Combined score per chunk is `Σ_source weight × 1/(k + rank + 1)` with
//! the standard smoothing constant k = 60, so agreement between sources
//! outranks a strong showing in either one alone. Ordering is
//! deterministic: equal scores break by first-occurrence insertion order.

use std::collections::HashMap;

use docqa_core::types::{Chunk, ChunkId, ScoreKind, SourceTag};

/// RRF smoothing constant. Higher values flatten the influence of
/// top-ranked items from any single list.
pub const RRF_K: f32 = 60.0;

struct Fused {
    chunk: Chunk,
    score: f32,
    first_seen: usize,
}

struct Accumulator {
    by_id: HashMap<ChunkId, Fused>,
    inserted: usize,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            by_id: HashMap::new(),
            inserted: 0,
        }
    }

    fn add(&mut self, list: &[Chunk], weight: f32, tag: Option<SourceTag>) {
        for (rank, chunk) in list.iter().enumerate() {
            if chunk.id.is_empty() {
                continue;
            }
            #[allow(clippy::cast_precision_loss)]
            let rrf = weight * (1.0 / (RRF_K + rank as f32 + 1.0));

            let inserted = &mut self.inserted;
            let entry = self.by_id.entry(chunk.id.clone()).or_insert_with(|| {
                let first_seen = *inserted;
                *inserted += 1;
                Fused {
                    chunk: chunk.clone(),
                    score: 0.0,
                    first_seen,
                }
            });
            entry.score += rrf;
            if let Some(tag) = tag {
                entry.chunk.tag_source(tag);
            } else {
                // Cross-variant merge: keep whatever provenance the
                // first occurrence carried, union in later tags.
                for t in &chunk.sources {
                    entry.chunk.tag_source(*t);
                }
            }
        }
    }

    fn finish(self, top_k: usize) -> Vec<Chunk> {
        let mut fused: Vec<Fused> = self.by_id.into_values().collect();
        fused.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.first_seen.cmp(&b.first_seen))
        });
        fused.truncate(top_k);

        fused
            .into_iter()
            .map(|f| {
                let mut chunk = f.chunk;
                chunk.score = f.score;
                chunk.score_kind = ScoreKind::Rrf;
                chunk
            })
            .collect()
    }
}

/// Fuse semantic and keyword result lists with caller-supplied weights
/// (not required to sum to 1). Chunks present in both lists accumulate
/// both contributions.
pub fn fuse_weighted(
    semantic: &[Chunk],
    keyword: &[Chunk],
    semantic_weight: f32,
    keyword_weight: f32,
    top_k: usize,
) -> Vec<Chunk> {
    let mut acc = Accumulator::new();
    acc.add(semantic, semantic_weight, Some(SourceTag::Semantic));
    acc.add(keyword, keyword_weight, Some(SourceTag::Keyword));
    acc.finish(top_k)
}

/// Merge per-variant result lists from multiple rewritten queries with
/// unit weights. Chunks retrieved by several variants rank higher.
pub fn merge_variant_results(lists: &[Vec<Chunk>], top_k: usize) -> Vec<Chunk> {
    let mut acc = Accumulator::new();
    for list in lists {
        acc.add(list, 1.0, None);
    }
    acc.finish(top_k)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, score: f32) -> Chunk {
        Chunk::new(id, format!("text {id}"), score, ScoreKind::Similarity)
    }

    #[test]
    fn consensus_outscores_single_source() {
        let both = fuse_weighted(&[chunk("x", 0.9)], &[chunk("x", 3.0)], 1.0, 1.0, 10);
        let single = fuse_weighted(&[chunk("x", 0.9)], &[], 1.0, 1.0, 10);
        assert!(both[0].score > single[0].score);
    }

    #[test]
    fn shared_chunk_scores_at_least_its_best_single_list_rank() {
        // x is rank 1 semantic, rank 0 keyword; its fused score must be
        // at least what rank 0 alone would contribute.
        let semantic = vec![chunk("a", 0.9), chunk("x", 0.8)];
        let keyword = vec![chunk("x", 5.0), chunk("b", 4.0)];
        let fused = fuse_weighted(&semantic, &keyword, 1.0, 1.0, 10);

        let x = fused.iter().find(|c| c.id == "x").expect("x present");
        let best_single = 1.0 / (RRF_K + 1.0);
        assert!(x.score >= best_single);
    }

    #[test]
    fn weights_scale_contributions() {
        let fused = fuse_weighted(
            &[chunk("a", 0.9)],
            &[chunk("b", 9.0)],
            0.7,
            0.3,
            10,
        );
        assert_eq!(fused[0].id, "a");
        let expected_a = 0.7 * (1.0 / (RRF_K + 1.0));
        assert!((fused[0].score - expected_a).abs() < 1e-6);
    }

    #[test]
    fn ties_break_by_first_occurrence() {
        // Same ranks, same weights: scores tie exactly, insertion order
        // must decide deterministically.
        let fused = fuse_weighted(&[chunk("a", 0.5)], &[chunk("b", 0.5)], 1.0, 1.0, 10);
        assert_eq!(fused[0].id, "a");
        assert_eq!(fused[1].id, "b");

        let fused_again = fuse_weighted(&[chunk("a", 0.5)], &[chunk("b", 0.5)], 1.0, 1.0, 10);
        let ids: Vec<_> = fused_again.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn provenance_accumulates_across_sources() {
        let fused = fuse_weighted(&[chunk("x", 0.9)], &[chunk("x", 2.0)], 1.0, 1.0, 10);
        assert_eq!(
            fused[0].sources,
            vec![SourceTag::Semantic, SourceTag::Keyword]
        );
        assert_eq!(fused[0].score_kind, ScoreKind::Rrf);
    }

    #[test]
    fn variant_merge_boosts_repeated_chunks() {
        let lists = vec![
            vec![chunk("a", 0.9), chunk("b", 0.8)],
            vec![chunk("b", 0.7), chunk("c", 0.6)],
        ];
        let merged = merge_variant_results(&lists, 10);
        assert_eq!(merged[0].id, "b");
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn truncates_to_top_k() {
        let lists = vec![vec![chunk("a", 0.9), chunk("b", 0.8), chunk("c", 0.7)]];
        let merged = merge_variant_results(&lists, 2);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "a");
    }
}
