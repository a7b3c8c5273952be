//! Lightweight text similarity used by the shaper.
//!
//! Dedup and sentence pruning prefer embedding cosine when an embedder
//! is wired in; token Jaccard is the offline fallback.

use std::collections::HashSet;

/// Jaccard similarity over lowercase whitespace tokens.
pub fn jaccard(a: &str, b: &str) -> f32 {
    let ta: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    let tb: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    #[allow(clippy::cast_precision_loss)]
    let ratio = intersection as f32 / union as f32;
    ratio
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Split text into sentences at `.`, `!` or `?` followed by whitespace.
/// Terminators stay attached to their sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_bounds() {
        assert_eq!(jaccard("", "anything"), 0.0);
        assert!((jaccard("same words here", "same words here") - 1.0).abs() < 1e-6);
        let mid = jaccard("backup retention policy", "backup schedule policy");
        assert!(mid > 0.0 && mid < 1.0);
    }

    #[test]
    fn splits_on_terminators_keeping_punctuation() {
        let parts = split_sentences("First one. Second one! Third?  Fourth without end");
        assert_eq!(
            parts,
            vec!["First one.", "Second one!", "Third?", "Fourth without end"]
        );
    }

    #[test]
    fn abbreviation_dots_mid_token_still_split() {
        // The splitter is intentionally simple; a trailing dot plus
        // whitespace always ends a sentence.
        let parts = split_sentences("See ch. 4 for details.");
        assert_eq!(parts, vec!["See ch.", "4 for details."]);
    }

    #[test]
    fn empty_input_yields_no_sentences() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }
}
