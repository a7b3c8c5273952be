//! Answer-quality metrics.
//!
//! Heuristic scoring for offline evaluation runs: retrieval quality
//! (relevance, result count, keyword coverage) and generation quality
//! (faithfulness, completeness, format), each with a list of concrete
//! issues. No model calls; every score is computable from the result
//! alone.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use docqa_core::types::Chunk;

const ABSTENTION_PHRASES: &[&str] = &[
    "don't have enough information",
    "cannot answer",
    "no information",
    "not mentioned",
];

static CITED_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[ID:([A-Za-z0-9_\-:.]+)\]").expect("citation pattern"));

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalEvaluation {
    pub score: f32,
    pub chunks_retrieved: usize,
    pub avg_relevance: f32,
    pub max_relevance: f32,
    pub keyword_coverage: f32,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationEvaluation {
    pub score: f32,
    pub faithfulness: f32,
    pub completeness: f32,
    pub format_score: f32,
    pub citations_count: usize,
    pub is_abstention: bool,
    pub word_count: usize,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Combined retrieval and generation scores for one query.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub retrieval_score: f32,
    pub faithfulness_score: f32,
    pub completeness_score: f32,
    pub format_score: f32,
    pub overall_score: f32,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Score retrieval quality: weighted mix of average relevance (0.5),
/// result count against a five-chunk target (0.3) and expected-keyword
/// coverage (0.2).
#[allow(clippy::cast_precision_loss)]
pub fn evaluate_retrieval(chunks: &[Chunk], expected_keywords: &[String]) -> RetrievalEvaluation {
    if chunks.is_empty() {
        return RetrievalEvaluation {
            score: 0.0,
            chunks_retrieved: 0,
            avg_relevance: 0.0,
            max_relevance: 0.0,
            keyword_coverage: 0.0,
            issues: vec!["no chunks retrieved".to_string()],
        };
    }

    let mut issues = Vec::new();
    if chunks.len() < 2 {
        issues.push("very few chunks retrieved".to_string());
    }

    let avg_relevance = chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32;
    let max_relevance = chunks.iter().map(|c| c.score).fold(f32::MIN, f32::max);
    if max_relevance < 0.5 {
        issues.push("low relevance scores, query may not match documents".to_string());
    }

    let mut keyword_coverage = 0.0;
    if !expected_keywords.is_empty() {
        let combined: String = chunks
            .iter()
            .map(|c| c.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let matches = expected_keywords
            .iter()
            .filter(|kw| combined.contains(&kw.to_lowercase()))
            .count();
        keyword_coverage = matches as f32 / expected_keywords.len() as f32;
        if keyword_coverage < 0.5 {
            issues.push(format!(
                "only {matches}/{} expected keywords found",
                expected_keywords.len()
            ));
        }
    }

    let score = avg_relevance * 0.5
        + (chunks.len() as f32 / 5.0).min(1.0) * 0.3
        + keyword_coverage * 0.2;

    RetrievalEvaluation {
        score,
        chunks_retrieved: chunks.len(),
        avg_relevance,
        max_relevance,
        keyword_coverage,
        issues,
    }
}

/// Score generation quality. Faithfulness drops when the answer cites
/// chunks that were never retrieved; an abstention counts as faithful.
#[allow(clippy::cast_precision_loss)]
pub fn evaluate_generation(
    answer: &str,
    chunks: &[Chunk],
    expected_keywords: &[String],
) -> GenerationEvaluation {
    if answer.trim().is_empty() {
        return GenerationEvaluation {
            score: 0.0,
            faithfulness: 0.0,
            completeness: 0.0,
            format_score: 0.0,
            citations_count: 0,
            is_abstention: false,
            word_count: 0,
            issues: vec!["no answer generated".to_string()],
            suggestions: Vec::new(),
        };
    }

    let mut issues = Vec::new();
    let mut suggestions = Vec::new();

    let answer_lower = answer.to_lowercase();
    let is_abstention = ABSTENTION_PHRASES.iter().any(|p| answer_lower.contains(p));

    let citations: Vec<&str> = CITED_ID
        .captures_iter(answer)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if citations.is_empty() && !is_abstention {
        issues.push("no citations in answer".to_string());
        suggestions.push("cite a chunk id for each factual claim".to_string());
    }

    let word_count = answer.split_whitespace().count();
    if word_count < 10 && !is_abstention {
        issues.push("answer too short".to_string());
    } else if word_count > 500 {
        issues.push("answer may be too long".to_string());
    }

    let chunk_ids: HashSet<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
    let invalid: Vec<&str> = citations
        .iter()
        .copied()
        .filter(|id| !chunk_ids.contains(id))
        .collect();
    if !invalid.is_empty() {
        issues.push(format!(
            "citations to unknown chunks: {}",
            invalid.iter().take(3).copied().collect::<Vec<_>>().join(", ")
        ));
    }

    let mut completeness = 1.0;
    if !expected_keywords.is_empty() {
        let matches = expected_keywords
            .iter()
            .filter(|kw| answer_lower.contains(&kw.to_lowercase()))
            .count();
        completeness = matches as f32 / expected_keywords.len() as f32;
        if completeness < 0.5 {
            issues.push("expected keywords missing from answer".to_string());
        }
    }

    let mut format_score = 0.5;
    if !citations.is_empty() {
        format_score += 0.3;
    }
    if answer.contains("Sources:") || answer.contains("References:") {
        format_score += 0.2;
    }

    let faithfulness = if is_abstention || invalid.is_empty() {
        1.0
    } else {
        0.7
    };

    let score = faithfulness * 0.4 + completeness * 0.3 + format_score * 0.3;

    GenerationEvaluation {
        score,
        faithfulness,
        completeness,
        format_score,
        citations_count: citations.len(),
        is_abstention,
        word_count,
        issues,
        suggestions,
    }
}

/// Full evaluation: retrieval and generation scored separately and
/// weighted equally into the overall score.
pub fn evaluate_full(
    chunks: &[Chunk],
    answer: &str,
    expected_keywords: &[String],
) -> EvaluationResult {
    let retrieval = evaluate_retrieval(chunks, expected_keywords);
    let generation = evaluate_generation(answer, chunks, expected_keywords);

    let overall_score = retrieval.score * 0.5 + generation.score * 0.5;
    let mut issues = retrieval.issues;
    issues.extend(generation.issues);

    EvaluationResult {
        retrieval_score: retrieval.score,
        faithfulness_score: generation.faithfulness,
        completeness_score: generation.completeness,
        format_score: generation.format_score,
        overall_score,
        issues,
        suggestions: generation.suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::ScoreKind;

    fn chunk(id: &str, text: &str, score: f32) -> Chunk {
        Chunk::new(id, text, score, ScoreKind::Rerank)
    }

    fn keywords(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| (*w).to_string()).collect()
    }

    #[test]
    fn empty_retrieval_scores_zero() {
        let eval = evaluate_retrieval(&[], &[]);
        assert!((eval.score - 0.0).abs() < 1e-6);
        assert_eq!(eval.chunks_retrieved, 0);
        assert_eq!(eval.issues, vec!["no chunks retrieved".to_string()]);
    }

    #[test]
    fn retrieval_score_mixes_relevance_count_and_coverage() {
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk(&format!("c{i}"), "the retention period is thirty days", 0.8))
            .collect();
        let eval = evaluate_retrieval(&chunks, &keywords(&["retention", "thirty days"]));
        // 0.8 * 0.5 + 1.0 * 0.3 + 1.0 * 0.2
        assert!((eval.score - 0.9).abs() < 1e-5);
        assert!((eval.keyword_coverage - 1.0).abs() < 1e-6);
        assert!(eval.issues.is_empty());
    }

    #[test]
    fn sparse_keyword_coverage_is_flagged() {
        let chunks = vec![chunk("a", "invoices are issued monthly", 0.9)];
        let eval = evaluate_retrieval(&chunks, &keywords(&["retention", "backup", "purge"]));
        assert!(eval.keyword_coverage < 0.5);
        assert!(eval.issues.iter().any(|i| i.contains("expected keywords")));
    }

    #[test]
    fn empty_answer_scores_zero() {
        let eval = evaluate_generation("   ", &[], &[]);
        assert!((eval.score - 0.0).abs() < 1e-6);
        assert_eq!(eval.issues, vec!["no answer generated".to_string()]);
    }

    #[test]
    fn grounded_cited_answer_scores_full_marks() {
        let chunks = vec![chunk("a1", "the retention period is thirty days", 0.9)];
        let answer =
            "The retention period is 30 days by default for backups [ID:a1]. Sources: retention.md";
        let eval = evaluate_generation(answer, &chunks, &keywords(&["retention", "30 days"]));
        assert!((eval.faithfulness - 1.0).abs() < 1e-6);
        assert!((eval.completeness - 1.0).abs() < 1e-6);
        assert!((eval.format_score - 1.0).abs() < 1e-5);
        assert!((eval.score - 1.0).abs() < 1e-5);
        assert_eq!(eval.citations_count, 1);
        assert!(eval.issues.is_empty());
    }

    #[test]
    fn citing_an_unknown_chunk_lowers_faithfulness() {
        let chunks = vec![chunk("a1", "some retrieved text", 0.9)];
        let answer = "A confident claim backed by nothing in the corpus whatsoever [ID:ghost].";
        let eval = evaluate_generation(answer, &chunks, &[]);
        assert!((eval.faithfulness - 0.7).abs() < 1e-6);
        assert!(eval.issues.iter().any(|i| i.contains("ghost")));
    }

    #[test]
    fn abstention_is_faithful_and_needs_no_citations() {
        let chunks = vec![chunk("a1", "unrelated text", 0.9)];
        let answer = "I don't have enough information to answer this.";
        let eval = evaluate_generation(answer, &chunks, &[]);
        assert!(eval.is_abstention);
        assert!((eval.faithfulness - 1.0).abs() < 1e-6);
        assert!(!eval.issues.iter().any(|i| i.contains("citations")));
        assert!(!eval.issues.iter().any(|i| i.contains("short")));
    }

    #[test]
    fn uncited_answer_gets_an_issue_and_a_suggestion() {
        let chunks = vec![chunk("a1", "the retention period is thirty days", 0.9)];
        let answer = "The retention period is thirty days for every backup tier we offer.";
        let eval = evaluate_generation(answer, &chunks, &[]);
        assert_eq!(eval.citations_count, 0);
        assert!(eval.issues.iter().any(|i| i.contains("no citations")));
        assert!(!eval.suggestions.is_empty());
    }

    #[test]
    fn full_evaluation_averages_both_halves() {
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| chunk(&format!("c{i}"), "the retention period is thirty days", 0.8))
            .collect();
        let answer =
            "The retention period is thirty days by default for backups [ID:c0]. Sources: retention.md";
        let result = evaluate_full(&chunks, answer, &keywords(&["retention", "thirty days"]));
        // retrieval 0.9, generation 1.0
        assert!((result.retrieval_score - 0.9).abs() < 1e-5);
        assert!((result.overall_score - 0.95).abs() < 1e-5);
        assert!(result.issues.is_empty());
    }
}
