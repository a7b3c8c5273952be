//! Post-hoc failure diagnosis.
//!
//! A decision tree over `(query, chunks, answer, expected?)` names the
//! most likely failing stage when an answer is missing or poor, with
//! remediation suggestions and alternative query phrasings.

use serde::Serialize;

use docqa_core::types::Chunk;

const LOW_RELEVANCE_THRESHOLD: f32 = 0.4;
const OVERLAP_THRESHOLD: f32 = 0.5;
const COVERAGE_THRESHOLD: f32 = 0.3;

const ABSTENTION_PHRASES: &[&str] = &[
    "don't have enough information",
    "cannot answer",
    "no information",
    "not mentioned",
    "not enough",
];

const QUESTION_WORDS: &[&str] = &["what", "how", "why", "when", "where", "who", "which"];

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisResult {
    pub root_cause: String,
    pub stage_failed: String,
    pub confidence: f32,
    pub details: String,
    pub suggestions: Vec<String>,
    pub alternative_queries: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkAnalysis {
    pub count: usize,
    pub avg_length: usize,
    pub sources: Vec<String>,
    pub score_range: (f32, f32),
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerAnalysis {
    pub length: usize,
    pub word_count: usize,
    pub has_citations: bool,
    pub is_abstention: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub diagnosis: DiagnosisResult,
    pub chunk_analysis: ChunkAnalysis,
    pub answer_analysis: AnswerAnalysis,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn word_set(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase().split_whitespace().map(String::from).collect()
}

#[allow(clippy::cast_precision_loss)]
fn overlap_ratio(needles: &std::collections::HashSet<String>, haystack: &std::collections::HashSet<String>) -> f32 {
    if needles.is_empty() {
        return 1.0;
    }
    needles.intersection(haystack).count() as f32 / needles.len() as f32
}

/// Alternative query phrasings: question words stripped, key terms only.
fn alternative_queries(query: &str) -> Vec<String> {
    let mut cleaned = query.to_lowercase();
    for word in QUESTION_WORDS {
        cleaned = cleaned.replace(&format!("{word} "), "");
        cleaned = cleaned.replace(&format!("{word}'s "), "");
    }

    let words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .collect();

    let mut alternatives = Vec::new();
    if !words.is_empty() {
        alternatives.push(words.iter().take(5).copied().collect::<Vec<_>>().join(" "));
        if words.len() >= 2 {
            alternatives.push(format!("about {} {}", words[0], words[1]));
        }
    }
    alternatives.truncate(3);
    alternatives
}

/// Classify why a query produced a missing or poor answer.
#[allow(clippy::cast_precision_loss)]
pub fn diagnose_failure(
    query: &str,
    chunks: &[Chunk],
    answer: &str,
    expected_content: Option<&str>,
) -> DiagnosisResult {
    if chunks.is_empty() {
        return DiagnosisResult {
            root_cause: "retrieval_failure".to_string(),
            stage_failed: "retrieval".to_string(),
            confidence: 0.9,
            details: "No chunks were retrieved for this query".to_string(),
            suggestions: strings(&[
                "Check if documents are indexed",
                "Try broader search terms",
                "Use keyword search for exact matches",
            ]),
            alternative_queries: alternative_queries(query),
        };
    }

    let avg_score: f32 = chunks.iter().map(|c| c.score).sum::<f32>() / chunks.len() as f32;
    if avg_score < LOW_RELEVANCE_THRESHOLD {
        return DiagnosisResult {
            root_cause: "low_relevance".to_string(),
            stage_failed: "retrieval".to_string(),
            confidence: 0.8,
            details: format!("Retrieved chunks have low relevance (avg score: {avg_score:.2})"),
            suggestions: strings(&[
                "Query terms may not match document vocabulary",
                "Try rephrasing the query",
                "Use query expansion or synonyms",
            ]),
            alternative_queries: alternative_queries(query),
        };
    }

    let answer_lower = answer.to_lowercase();
    let is_abstention = ABSTENTION_PHRASES.iter().any(|p| answer_lower.contains(p));
    if is_abstention {
        let combined: String = chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let overlap = overlap_ratio(&word_set(query), &word_set(&combined));

        if overlap > OVERLAP_THRESHOLD {
            return DiagnosisResult {
                root_cause: "context_interpretation".to_string(),
                stage_failed: "generation".to_string(),
                confidence: 0.7,
                details: "Chunks contain relevant terms but the model couldn't extract an answer"
                    .to_string(),
                suggestions: strings(&[
                    "Context may be fragmented across chunks",
                    "Try retrieving more chunks",
                    "Consider using reasoning-aware prompts",
                ]),
                alternative_queries: Vec::new(),
            };
        }
        return DiagnosisResult {
            root_cause: "topic_mismatch".to_string(),
            stage_failed: "retrieval".to_string(),
            confidence: 0.8,
            details: "Retrieved chunks don't appear to cover the query topic".to_string(),
            suggestions: strings(&[
                "Query topic may not be in the document corpus",
                "Try different terminology",
                "Check if relevant documents are indexed",
            ]),
            alternative_queries: alternative_queries(query),
        };
    }

    if let Some(expected) = expected_content {
        let expected_words = word_set(expected);
        let coverage = overlap_ratio(&expected_words, &word_set(answer));
        if coverage < COVERAGE_THRESHOLD {
            let combined_lower: String = chunks
                .iter()
                .map(|c| c.text.to_lowercase())
                .collect::<Vec<_>>()
                .join(" ");
            let in_chunks = expected_words.iter().any(|w| combined_lower.contains(w));

            if in_chunks {
                return DiagnosisResult {
                    root_cause: "generation_miss".to_string(),
                    stage_failed: "generation".to_string(),
                    confidence: 0.7,
                    details: "Expected information is in chunks but not in the answer".to_string(),
                    suggestions: strings(&[
                        "The model may have focused on wrong parts of context",
                        "Try more specific prompting",
                        "Increase context relevance through reranking",
                    ]),
                    alternative_queries: Vec::new(),
                };
            }
            return DiagnosisResult {
                root_cause: "retrieval_miss".to_string(),
                stage_failed: "retrieval".to_string(),
                confidence: 0.8,
                details: "Expected information not found in retrieved chunks".to_string(),
                suggestions: strings(&[
                    "Relevant chunks may not have been retrieved",
                    "Try different query formulation",
                    "Increase top_k for more coverage",
                ]),
                alternative_queries: alternative_queries(query),
            };
        }
    }

    DiagnosisResult {
        root_cause: "unknown".to_string(),
        stage_failed: "unknown".to_string(),
        confidence: 0.5,
        details: "Unable to determine specific failure cause".to_string(),
        suggestions: strings(&[
            "Review the query for clarity",
            "Check chunk quality manually",
            "Try with different retrieval settings",
        ]),
        alternative_queries: alternative_queries(query),
    }
}

/// Full diagnostics report: the decision-tree diagnosis plus chunk and
/// answer statistics.
#[allow(clippy::cast_precision_loss)]
pub fn run_diagnostics(query: &str, chunks: &[Chunk], answer: &str) -> DiagnosticsReport {
    let diagnosis = diagnose_failure(query, chunks, answer, None);

    let mut sources: Vec<String> = chunks
        .iter()
        .filter(|c| !c.id.is_empty())
        .map(|c| c.id.split("::").next().unwrap_or("").to_string())
        .collect();
    sources.sort();
    sources.dedup();

    let chunk_analysis = ChunkAnalysis {
        count: chunks.len(),
        avg_length: if chunks.is_empty() {
            0
        } else {
            chunks.iter().map(|c| c.text.chars().count()).sum::<usize>() / chunks.len()
        },
        sources,
        score_range: chunks.iter().fold((f32::MAX, f32::MIN), |(lo, hi), c| {
            (lo.min(c.score), hi.max(c.score))
        }),
    };
    let chunk_analysis = if chunks.is_empty() {
        ChunkAnalysis {
            score_range: (0.0, 0.0),
            ..chunk_analysis
        }
    } else {
        chunk_analysis
    };

    let answer_lower = answer.to_lowercase();
    let answer_analysis = AnswerAnalysis {
        length: answer.chars().count(),
        word_count: answer.split_whitespace().count(),
        has_citations: answer.contains("[ID:"),
        is_abstention: ["don't have", "cannot answer"]
            .iter()
            .any(|p| answer_lower.contains(p)),
    };

    DiagnosticsReport {
        diagnosis,
        chunk_analysis,
        answer_analysis,
    }
}
