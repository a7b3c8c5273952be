//! Chain-of-thought reasoning over retrieved evidence.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use docqa_core::traits::Generator;
use docqa_core::types::{Chunk, ChunkId};

use crate::prompts::{format_evidence, reasoning_prompt};

/// Fixed answer when no evidence survives retrieval and shaping.
pub const ABSTENTION_ANSWER: &str =
    "I don't have enough information to answer this question.";

/// Character cap on the evidence shown to the sufficiency check.
const SUFFICIENCY_EVIDENCE_LIMIT: usize = 2000;

static NUMBERED_STEPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\.\s*([^\n]+)").expect("numbered step pattern"));
static BULLET_STEPS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-•]\s*([^\n]+)").expect("bullet step pattern"));
static EVIDENCE_IDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[?ID:([A-Za-z0-9_\-:.]+)\]?").expect("evidence id pattern"));

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningResult {
    pub answer: String,
    pub reasoning_steps: Vec<String>,
    pub evidence_used: Vec<ChunkId>,
    pub confidence: f32,
    pub reasoning_type: String,
}

/// Follow-up retrieval used by the iterative loop.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<Chunk>>;
}

fn extract_reasoning_steps(text: &str) -> Vec<String> {
    let mut steps: Vec<String> = NUMBERED_STEPS
        .captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect();
    steps.extend(
        BULLET_STEPS
            .captures_iter(text)
            .map(|c| c[1].trim().to_string()),
    );
    if !steps.is_empty() {
        return steps;
    }

    split_sentences(text)
        .into_iter()
        .take(5)
        .filter(|s| s.chars().count() > 20)
        .collect()
}

/// Cited ids from a generated answer, deduplicated in first-seen order.
fn extract_evidence_ids(text: &str) -> Vec<ChunkId> {
    let mut seen = HashSet::new();
    EVIDENCE_IDS
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut at_boundary = false;
    for c in text.chars() {
        if at_boundary && c.is_whitespace() {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
            at_boundary = false;
            continue;
        }
        current.push(c);
        at_boundary = matches!(c, '.' | '!' | '?');
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

#[allow(clippy::cast_precision_loss)]
fn citation_confidence(citations: usize) -> f32 {
    (0.3 + 0.1 * citations as f32).min(0.9)
}

/// Reason over evidence with an explicit chain of thought.
///
/// Zero chunks short-circuit to the abstention answer without calling
/// the generator; generation failure produces an `error`-typed result,
/// never an `Err`.
pub async fn reason_over_evidence(
    query: &str,
    chunks: &[Chunk],
    query_type: &str,
    generator: &Arc<dyn Generator>,
) -> ReasoningResult {
    if chunks.is_empty() {
        return ReasoningResult {
            answer: ABSTENTION_ANSWER.to_string(),
            reasoning_steps: vec!["No relevant evidence found".to_string()],
            evidence_used: Vec::new(),
            confidence: 0.0,
            reasoning_type: "no_evidence".to_string(),
        };
    }

    let evidence = format_evidence(chunks);
    let (prompt, reasoning_type) = reasoning_prompt(query_type, query, &evidence);

    match generator.generate(&prompt, 0.0, 800).await {
        Ok(out) => {
            let text = out.text.trim().to_string();
            let reasoning_steps = extract_reasoning_steps(&text);
            let evidence_used = extract_evidence_ids(&text);
            let confidence = citation_confidence(evidence_used.len());
            debug!(
                steps = reasoning_steps.len(),
                citations = evidence_used.len(),
                reasoning_type,
                "reasoning complete"
            );
            ReasoningResult {
                answer: text,
                reasoning_steps,
                evidence_used,
                confidence,
                reasoning_type: reasoning_type.to_string(),
            }
        }
        Err(e) => {
            warn!(error = %e, "reasoning generation failed");
            let reason: String = e.to_string().chars().take(100).collect();
            ReasoningResult {
                answer: format!("Error during reasoning: {reason}"),
                reasoning_steps: Vec::new(),
                evidence_used: Vec::new(),
                confidence: 0.0,
                reasoning_type: "error".to_string(),
            }
        }
    }
}

/// Iteratively gather evidence before reasoning.
///
/// Each round asks the generator whether the evidence suffices; a
/// follow-up query triggers another retrieval, deduplicated by chunk id.
/// The loop stops on "SUFFICIENT", the iteration cap, a failed check or
/// retrieval, or a round that adds nothing new.
pub async fn iterative_reason(
    query: &str,
    initial_chunks: Vec<Chunk>,
    query_type: &str,
    source: &Arc<dyn EvidenceSource>,
    generator: &Arc<dyn Generator>,
    max_iterations: usize,
) -> ReasoningResult {
    let mut all_chunks = initial_chunks;
    let mut seen: HashSet<ChunkId> = all_chunks.iter().map(|c| c.id.clone()).collect();

    for round in 0..max_iterations {
        let evidence: String = format_evidence(&all_chunks)
            .chars()
            .take(SUFFICIENCY_EVIDENCE_LIMIT)
            .collect();
        let check_prompt = format!(
            "Given this query and evidence, do we need more information?\n\
             If yes, suggest a follow-up search query. If no, respond with \"SUFFICIENT\".\n\n\
             Query: {query}\n\nCurrent evidence:\n{evidence}\n\n\
             Response (either \"SUFFICIENT\" or a follow-up search query):"
        );

        let text = match generator.generate(&check_prompt, 0.0, 100).await {
            Ok(out) => out.text.trim().to_string(),
            Err(e) => {
                warn!(round, error = %e, "sufficiency check failed, reasoning over current evidence");
                break;
            }
        };
        if text.to_uppercase().contains("SUFFICIENT") {
            break;
        }

        let follow_up = text.replace("Follow-up query:", "").trim().to_string();
        if follow_up.chars().count() <= 5 {
            break;
        }

        let new_chunks = match source.retrieve(&follow_up).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(round, error = %e, "follow-up retrieval failed");
                break;
            }
        };
        let mut added = 0;
        for chunk in new_chunks {
            if seen.insert(chunk.id.clone()) {
                all_chunks.push(chunk);
                added += 1;
            }
        }
        debug!(round, added, follow_up = %follow_up, "follow-up retrieval merged");
        if added == 0 {
            break;
        }
    }

    reason_over_evidence(query, &all_chunks, query_type, generator).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_steps_extracted() {
        let steps = extract_reasoning_steps("1. First point\n2. Second point\nFinal answer.");
        assert_eq!(steps, vec!["First point", "Second point"]);
    }

    #[test]
    fn bullet_steps_extracted() {
        let steps = extract_reasoning_steps("- alpha step\n- beta step");
        assert_eq!(steps, vec!["alpha step", "beta step"]);
    }

    #[test]
    fn unstructured_text_falls_back_to_long_sentences() {
        let text = "Short. This sentence is comfortably longer than twenty characters. \
                    Tiny. Another sufficiently long sentence for the fallback path.";
        let steps = extract_reasoning_steps(text);
        assert_eq!(steps.len(), 2);
        assert!(steps[0].starts_with("This sentence"));
    }

    #[test]
    fn evidence_ids_dedupe_in_order() {
        let ids = extract_evidence_ids("Claim [ID:b2]. More ID:a1 and again [ID:b2].");
        assert_eq!(ids, vec!["b2", "a1"]);
    }

    #[test]
    fn confidence_scales_and_caps() {
        assert!((citation_confidence(0) - 0.3).abs() < 1e-6);
        assert!((citation_confidence(3) - 0.6).abs() < 1e-6);
        assert!((citation_confidence(20) - 0.9).abs() < 1e-6);
    }
}
