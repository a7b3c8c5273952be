//! Query rewriting to broaden retrieval recall.
//!
//! Strategies range from fully-offline synonym expansion to
//! generator-backed multi-query and decomposition rewrites. Whatever
//! happens, the caller gets back at least the original query; rewriting
//! never fails a request.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use docqa_core::traits::Generator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteStrategy {
    /// Static synonym-table term injection. Deterministic, no generator.
    Expand,
    /// Ask the generator for alternate phrasings.
    Multi,
    /// Ask the generator to split the query into atomic sub-queries.
    Decompose,
    /// Decompose if complex and a generator is available, else multi,
    /// else expand.
    Auto,
    /// Rewriting disabled.
    None,
}

impl RewriteStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Multi => "multi",
            Self::Decompose => "decompose",
            Self::Auto => "auto",
            Self::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "expand" => Some(Self::Expand),
            "multi" => Some(Self::Multi),
            "decompose" => Some(Self::Decompose),
            "auto" => Some(Self::Auto),
            "none" => Some(Self::None),
            _ => Option::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRewriteResult {
    pub original_query: String,
    pub rewritten_queries: Vec<String>,
    pub strategy_used: String,
}

/// Synonym table for offline expansion. Membership is a tunable default.
const SYNONYMS: &[(&str, &[&str])] = &[
    ("fix", &["resolve", "troubleshoot", "repair", "solve"]),
    ("error", &["issue", "problem", "failure", "bug"]),
    ("login", &["sign-in", "authentication", "log in"]),
    ("cost", &["price", "pricing", "fee", "rate"]),
    ("fast", &["quick", "performance", "speed", "efficient"]),
    ("slow", &["performance", "latency", "delay"]),
    ("setup", &["install", "configure", "initialization"]),
    ("delete", &["remove", "uninstall", "clear"]),
    ("create", &["add", "new", "generate", "make"]),
    ("update", &["modify", "change", "edit", "upgrade"]),
    ("get", &["retrieve", "fetch", "obtain", "access"]),
    ("show", &["display", "view", "list"]),
];

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]").expect("non-word pattern"));

static LINE_NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\-\.\)\*]+\s*").expect("numbering pattern"));

fn multi_query_prompt(query: &str, num_variants: usize) -> String {
    format!(
        "You are a query rewriting assistant for a document search system.\n\n\
         Given a user query, generate {num_variants} alternative search queries that would help find relevant documents.\n\n\
         Rules:\n\
         - Each variant should use different terminology while preserving the intent\n\
         - Include both formal/technical and casual phrasings\n\
         - If the query contains multiple questions, create separate queries for each\n\
         - Output ONLY the queries, one per line, no numbering or explanations\n\n\
         User query: {query}\n\n\
         Alternative queries:"
    )
}

fn decompose_prompt(query: &str) -> String {
    format!(
        "You are a query analysis assistant.\n\n\
         Given a complex user query, break it down into simple, atomic sub-queries that can be searched independently.\n\n\
         Rules:\n\
         - Each sub-query should focus on one specific piece of information\n\
         - Preserve the key terms from the original query\n\
         - Output ONLY the sub-queries, one per line, no numbering or explanations\n\
         - Generate between 2-4 sub-queries\n\n\
         User query: {query}\n\n\
         Sub-queries:"
    )
}

/// Inject synonyms for any query word present in the table. Returns the
/// original query alone when nothing expands.
fn expand_with_synonyms(query: &str) -> Vec<String> {
    let mut expansions: Vec<&str> = Vec::new();
    for word in query.to_lowercase().split_whitespace() {
        let clean = NON_WORD.replace_all(word, "");
        if let Some((_, syns)) = SYNONYMS.iter().find(|(key, _)| *key == clean) {
            expansions.extend(syns.iter().copied());
        }
    }

    if expansions.is_empty() {
        vec![query.to_string()]
    } else {
        vec![query.to_string(), format!("{query} {}", expansions.join(" "))]
    }
}

/// A query is complex when it carries multiple intents, compares things,
/// or runs past 15 words.
pub fn is_complex_query(query: &str) -> bool {
    let lower = query.to_lowercase();

    let multi_intent = [" and ", " also ", " as well as ", " plus "];
    if multi_intent.iter().any(|m| lower.contains(m)) {
        return true;
    }

    let comparison = [" vs ", " versus ", "compare", "difference", "between"];
    if comparison.iter().any(|m| lower.contains(m)) {
        return true;
    }

    query.split_whitespace().count() > 15
}

/// Parse generator output into clean query lines: numbering stripped,
/// short fragments dropped, original query first.
fn parse_variant_lines(text: &str, query: &str, num_variants: usize) -> Vec<String> {
    let mut queries: Vec<String> = Vec::new();
    for line in text.lines() {
        let cleaned = LINE_NUMBERING.replace(line.trim(), "").trim().to_string();
        if cleaned.len() > 3 {
            queries.push(cleaned);
        }
    }

    if !queries.iter().any(|q| q == query) {
        queries.insert(0, query.to_string());
    }
    queries.truncate(num_variants + 1);
    queries
}

async fn rewrite_with_generator(
    generator: &dyn Generator,
    query: &str,
    num_variants: usize,
    decompose: bool,
) -> Vec<String> {
    let prompt = if decompose {
        decompose_prompt(query)
    } else {
        multi_query_prompt(query, num_variants)
    };

    match generator.generate(&prompt, 0.3, 256).await {
        Ok(resp) => {
            let queries = parse_variant_lines(&resp.text, query, num_variants);
            if queries.is_empty() {
                vec![query.to_string()]
            } else {
                queries
            }
        }
        Err(e) => {
            warn!(error = %e, "query rewrite generation failed, keeping original");
            vec![query.to_string()]
        }
    }
}

/// Rewrite a query for retrieval. Always returns at least the original
/// query; generator failures fall back silently.
pub async fn rewrite_query(
    query: &str,
    num_variants: usize,
    strategy: RewriteStrategy,
    generator: Option<&dyn Generator>,
) -> QueryRewriteResult {
    let query = query.trim();

    if query.is_empty() || strategy == RewriteStrategy::None {
        return QueryRewriteResult {
            original_query: query.to_string(),
            rewritten_queries: vec![query.to_string()],
            strategy_used: "none".to_string(),
        };
    }

    let resolved = match strategy {
        RewriteStrategy::Auto => {
            if is_complex_query(query) && generator.is_some() {
                RewriteStrategy::Decompose
            } else if generator.is_some() {
                RewriteStrategy::Multi
            } else {
                RewriteStrategy::Expand
            }
        }
        other => other,
    };

    let (rewritten, used) = match (resolved, generator) {
        (RewriteStrategy::Multi, Some(g)) => (
            rewrite_with_generator(g, query, num_variants, false).await,
            RewriteStrategy::Multi,
        ),
        (RewriteStrategy::Decompose, Some(g)) => (
            rewrite_with_generator(g, query, num_variants, true).await,
            RewriteStrategy::Decompose,
        ),
        // Expand, or a generator strategy without a generator.
        _ => (expand_with_synonyms(query), RewriteStrategy::Expand),
    };

    debug!(
        strategy = used.as_str(),
        variants = rewritten.len(),
        "rewrote query"
    );

    QueryRewriteResult {
        original_query: query.to_string(),
        rewritten_queries: rewritten,
        strategy_used: used.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synonym_expansion_appends_terms() {
        let out = expand_with_synonyms("fix login error");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "fix login error");
        assert!(out[1].starts_with("fix login error "));
        assert!(out[1].contains("troubleshoot"));
        assert!(out[1].contains("authentication"));
    }

    #[test]
    fn no_expansion_without_table_hits() {
        let out = expand_with_synonyms("quarterly revenue figures");
        assert_eq!(out, vec!["quarterly revenue figures".to_string()]);
    }

    #[test]
    fn complexity_checks_markers_and_length() {
        assert!(is_complex_query("pricing for teams and enterprise plans"));
        assert!(is_complex_query("Postgres vs MySQL"));
        assert!(!is_complex_query("What is the retention period"));
        let long: String = std::iter::repeat("word").take(16).collect::<Vec<_>>().join(" ");
        assert!(is_complex_query(&long));
    }

    #[test]
    fn variant_parsing_strips_numbering_and_keeps_original_first() {
        let parsed = parse_variant_lines(
            "1. alternative phrasing one\n- alternative two\n\nx\n",
            "original query",
            3,
        );
        assert_eq!(
            parsed,
            vec![
                "original query".to_string(),
                "alternative phrasing one".to_string(),
                "alternative two".to_string()
            ]
        );
    }
}
