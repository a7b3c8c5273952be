//! Citation extraction and snippet enrichment.
//!
//! Generated answers cite evidence inline as `[ID:chunk_id]`; the bare
//! `ID:chunk_id` form is also accepted. Id character set is alphanumeric
//! plus `_-:.`.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use docqa_core::types::ChunkId;
use docqa_retrieval::ChunkStore;

use crate::result::SourceRef;

static BRACKETED_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[ID:([A-Za-z0-9_\-:.]+)\]").expect("bracketed citation pattern"));
static PLAIN_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ID:([A-Za-z0-9_\-:.]+)").expect("plain citation pattern"));

/// Cited chunk ids, bracketed form first, deduplicated in order.
pub fn extract_cited_ids(text: &str) -> Vec<ChunkId> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut ids: Vec<ChunkId> = Vec::new();

    for caps in BRACKETED_ID.captures_iter(text) {
        let id = caps.get(1).map_or("", |m| m.as_str());
        if seen.insert(id) {
            ids.push(id.to_string());
        }
    }
    for caps in PLAIN_ID.captures_iter(text) {
        // Skip occurrences that are really the bracketed form.
        let start = caps.get(0).map_or(0, |m| m.start());
        if start > 0 && text.as_bytes()[start - 1] == b'[' {
            continue;
        }
        let id = caps.get(1).map_or("", |m| m.as_str());
        if seen.insert(id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Resolve cited ids against the source list; a model that cited nothing
/// usable falls back to the top-ranked sources.
pub fn build_citations(cited_ids: &[ChunkId], sources: &[SourceRef]) -> Vec<SourceRef> {
    let citations: Vec<SourceRef> = cited_ids
        .iter()
        .filter_map(|cid| sources.iter().find(|s| &s.id == cid).cloned())
        .collect();
    if citations.is_empty() {
        sources.to_vec()
    } else {
        citations
    }
}

/// Best-effort: fill empty snippets from the corpus id→text map.
pub fn enrich_snippets(refs: &mut [SourceRef], store: &Arc<ChunkStore>, limit: usize) {
    for r in refs.iter_mut() {
        if r.snippet.is_empty() {
            if let Some(text) = store.text_for(&r.id) {
                r.snippet = text.chars().take(limit).collect();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> SourceRef {
        SourceRef {
            id: id.to_string(),
            score: 0.5,
            snippet: format!("snippet {id}"),
        }
    }

    #[test]
    fn bracketed_and_plain_ids_dedupe_in_order() {
        let ids = extract_cited_ids("Answer [ID:a1] and [ID:a1] again, plus ID:b2 too.");
        assert_eq!(ids, vec!["a1", "b2"]);
    }

    #[test]
    fn bracketed_form_is_not_double_counted() {
        let ids = extract_cited_ids("Only [ID:doc.txt::3] is cited.");
        assert_eq!(ids, vec!["doc.txt::3"]);
    }

    #[test]
    fn no_ids_yields_empty() {
        assert!(extract_cited_ids("no citations present here").is_empty());
        assert!(extract_cited_ids("").is_empty());
    }

    #[test]
    fn citations_resolve_against_sources() {
        let sources = vec![source("a1"), source("b2"), source("c3")];
        let citations = build_citations(&["b2".to_string()], &sources);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].id, "b2");
    }

    #[test]
    fn unmatched_citations_fall_back_to_sources() {
        let sources = vec![source("a1"), source("b2")];
        let citations = build_citations(&["zzz".to_string()], &sources);
        assert_eq!(citations.len(), 2);

        let citations = build_citations(&[], &sources);
        assert_eq!(citations.len(), 2);
    }
}
