//! Query classification and decomposition.
//!
//! Ordered pattern checks decide the query type; comparative and analytical
//! queries are split into sub-queries that retrieve better independently.
//! The pattern tables are tunable defaults, not a behavioral contract.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Factual,
    Comparative,
    Procedural,
    Analytical,
    Aggregative,
}

impl QueryType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Factual => "factual",
            Self::Comparative => "comparative",
            Self::Procedural => "procedural",
            Self::Analytical => "analytical",
            Self::Aggregative => "aggregative",
        }
    }
}

/// Retrieval shape suggested by the analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    Single,
    Multi,
    Iterative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub query_type: QueryType,
    pub sub_queries: Vec<String>,
    pub retrieval_strategy: RetrievalStrategy,
    pub reasoning_required: bool,
    pub confidence: f32,
}

static COMPARATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:compare|vs\.?|versus|difference|better|worse|similar|unlike)\b")
        .expect("comparative pattern")
});

static PROCEDURAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:how to|how do|how can|steps to|process|procedure|method)\b")
        .expect("procedural pattern")
});

static ANALYTICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:why|cause|reason|explain|analyz|impact|effect|implication)")
        .expect("analytical pattern")
});

static AGGREGATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:list|all|every|enumerate|summarize|overview|main)\b")
        .expect("aggregative pattern")
});

static COMPARISON_SUBJECTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(.+?)\s+(?:vs\.?|versus|and|compared to)\s+(.+)")
        .expect("comparison subjects pattern")
});

static WHY_SUBJECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)why\s+(?:does|is|do|are|did|was|were)?\s*(.+)").expect("why subject pattern")
});

static LEADING_COMPARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^compare\s+").expect("leading compare pattern"));

/// Classify the query type. Matched patterns get confidence 0.8, the
/// factual default 0.6.
fn classify(query: &str) -> (QueryType, f32) {
    let lower = query.to_lowercase();
    if COMPARATIVE.is_match(&lower) {
        (QueryType::Comparative, 0.8)
    } else if PROCEDURAL.is_match(&lower) {
        (QueryType::Procedural, 0.8)
    } else if ANALYTICAL.is_match(&lower) {
        (QueryType::Analytical, 0.8)
    } else if AGGREGATIVE.is_match(&lower) {
        (QueryType::Aggregative, 0.8)
    } else {
        (QueryType::Factual, 0.6)
    }
}

/// Split a query into sub-queries. Always includes the original first.
fn decompose(query: &str, query_type: QueryType) -> Vec<String> {
    let mut sub_queries = vec![query.to_string()];

    match query_type {
        QueryType::Comparative => {
            if let Some(caps) = COMPARISON_SUBJECTS.captures(query) {
                let subject1 = LEADING_COMPARE.replace(caps[1].trim(), "").trim().to_string();
                let subject2 = caps[2].trim().to_string();
                if !subject1.is_empty() {
                    sub_queries.push(subject1);
                }
                if !subject2.is_empty() {
                    sub_queries.push(subject2);
                }
            }
        }
        QueryType::Analytical => {
            if let Some(caps) = WHY_SUBJECT.captures(query) {
                let subject = caps[1].trim();
                if !subject.is_empty() {
                    sub_queries.push(format!("causes of {subject}"));
                    sub_queries.push(format!("factors affecting {subject}"));
                }
            }
        }
        // Aggregative and factual queries retrieve as-is.
        _ => {}
    }

    sub_queries
}

fn strategy_for(query_type: QueryType, sub_queries: &[String]) -> RetrievalStrategy {
    match query_type {
        QueryType::Comparative | QueryType::Aggregative => RetrievalStrategy::Multi,
        QueryType::Analytical if sub_queries.len() > 1 => RetrievalStrategy::Iterative,
        _ => RetrievalStrategy::Single,
    }
}

/// Analyze a query: type, sub-queries, retrieval strategy, and whether
/// reasoning-aware synthesis should run downstream.
pub fn analyze_query(query: &str) -> QueryAnalysis {
    let (query_type, confidence) = classify(query);
    let sub_queries = decompose(query, query_type);
    let retrieval_strategy = strategy_for(query_type, &sub_queries);
    let reasoning_required =
        matches!(query_type, QueryType::Comparative | QueryType::Analytical);

    debug!(
        query_type = query_type.as_str(),
        sub_queries = sub_queries.len(),
        reasoning_required,
        "analyzed query"
    );

    QueryAnalysis {
        query_type,
        sub_queries,
        retrieval_strategy,
        reasoning_required,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparative_query_extracts_both_subjects() {
        let a = analyze_query("Compare Postgres vs MySQL");
        assert_eq!(a.query_type, QueryType::Comparative);
        assert_eq!(
            a.sub_queries,
            vec![
                "Compare Postgres vs MySQL".to_string(),
                "Postgres".to_string(),
                "MySQL".to_string()
            ]
        );
        assert!(a.reasoning_required);
        assert_eq!(a.retrieval_strategy, RetrievalStrategy::Multi);
        assert!((a.confidence - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn analytical_query_synthesizes_causal_sub_queries() {
        let a = analyze_query("Why does the import job fail");
        assert_eq!(a.query_type, QueryType::Analytical);
        assert!(a.sub_queries.contains(&"causes of the import job fail".to_string()));
        assert!(a
            .sub_queries
            .contains(&"factors affecting the import job fail".to_string()));
        assert_eq!(a.retrieval_strategy, RetrievalStrategy::Iterative);
        assert!(a.reasoning_required);
    }

    #[test]
    fn procedural_query_keeps_single_query() {
        let a = analyze_query("How to configure retention policies");
        assert_eq!(a.query_type, QueryType::Procedural);
        assert_eq!(a.sub_queries.len(), 1);
        assert!(!a.reasoning_required);
        assert_eq!(a.retrieval_strategy, RetrievalStrategy::Single);
    }

    #[test]
    fn plain_question_defaults_to_factual() {
        let a = analyze_query("What is the retention period");
        assert_eq!(a.query_type, QueryType::Factual);
        assert!((a.confidence - 0.6).abs() < f32::EPSILON);
        assert_eq!(a.sub_queries, vec!["What is the retention period".to_string()]);
    }

    #[test]
    fn aggregative_query_uses_multi_retrieval() {
        let a = analyze_query("List supported storage backends");
        assert_eq!(a.query_type, QueryType::Aggregative);
        assert_eq!(a.retrieval_strategy, RetrievalStrategy::Multi);
        assert!(!a.reasoning_required);
    }
}
