//! Layered RAG prompt construction.
//!
//! The generation prompt stacks four layers: system role, grounding
//! rules, retrieved context, user question. Reasoning prompts swap the
//! grounded-answer layers for a per-query-type structure while keeping
//! the same citation format.

use docqa_core::types::Chunk;

/// Per-evidence-block character cap in reasoning prompts.
const EVIDENCE_CHAR_LIMIT: usize = 800;

const SYSTEM_PROMPT: &str = "You are a document assistant. You answer questions using ONLY the provided context.\n\
You are precise, concise, and always cite your sources.";

const DEVELOPER_PROMPT: &str = "## Grounding Rules\n\
- Answer ONLY using information from the CONTEXT section below\n\
- If the context doesn't contain enough information to answer, say \"I don't have enough information to answer this based on the provided documents\"\n\
- NEVER fabricate or infer information not explicitly present in the context\n\
- Keep answers under 3 paragraphs unless the query explicitly asks for detail\n\n\
## Citation Format\n\
- Cite sources inline using [ID:chunk_id] format immediately after the relevant claim\n\
- Every factual claim MUST have a citation\n\
- At the end of your answer, list all cited chunks under \"Sources:\" with their IDs";

fn format_chunk(chunk: &Chunk, include_score: bool) -> String {
    let score_line = if include_score {
        format!("Relevance Score: {:.3}\n", chunk.score)
    } else {
        String::new()
    };
    format!(
        "---\nChunk ID: {}\n{}Content:\n{}\n---",
        chunk.id, score_line, chunk.text
    )
}

/// Build the full grounded-generation prompt over the top `k` chunks.
pub fn build_rag_prompt(query: &str, chunks: &[Chunk], k: usize, include_scores: bool) -> String {
    let formatted: Vec<String> = chunks
        .iter()
        .take(k)
        .map(|c| format_chunk(c, include_scores))
        .collect();
    let context = if formatted.is_empty() {
        "(No relevant context found)".to_string()
    } else {
        formatted.join("\n\n")
    };

    format!(
        "{SYSTEM_PROMPT}\n\n{DEVELOPER_PROMPT}\n\n\
         ## Context Chunks\n\
         The following are relevant excerpts from the document corpus, ranked by relevance:\n\n\
         {context}\n\n\
         ## Question\n{query}\n\n## Answer"
    )
}

/// Format chunks as id-tagged evidence blocks, each capped at 800 chars.
pub fn format_evidence(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| {
            let text: String = c.text.chars().take(EVIDENCE_CHAR_LIMIT).collect();
            format!("[{}]\n{}", c.id, text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Select the reasoning prompt for a query type. Returns the prompt and
/// the reasoning type label recorded on the result.
pub fn reasoning_prompt(query_type: &str, query: &str, evidence: &str) -> (String, &'static str) {
    match query_type {
        "comparative" => (
            format!(
                "Compare the following based on the evidence provided.\n\n\
                 Query: {query}\n\nEvidence:\n{evidence}\n\n\
                 Structure your response as:\n\
                 1. Key aspects of the first subject\n\
                 2. Key aspects of the second subject\n\
                 3. Similarities\n\
                 4. Differences\n\
                 5. Conclusion\n\n\
                 Include citations [ID:chunk_id] for each claim.\n\nComparison:"
            ),
            "comparative",
        ),
        "analytical" => (
            format!(
                "Analyze and explain based on the evidence provided.\n\n\
                 Query: {query}\n\nEvidence:\n{evidence}\n\n\
                 Structure your response as:\n\
                 1. Identify the main factors/causes\n\
                 2. Explain the relationships between them\n\
                 3. Draw conclusions\n\
                 4. Note any limitations in the available evidence\n\n\
                 Include citations [ID:chunk_id] for each claim.\n\nAnalysis:"
            ),
            "analytical",
        ),
        _ => (
            format!(
                "Based on the evidence below, answer the query.\n\
                 Show your reasoning step by step, then provide the final answer.\n\n\
                 Query: {query}\n\nEvidence:\n{evidence}\n\n\
                 First, analyze each piece of evidence and its relevance.\n\
                 Then, synthesize the information to form a complete answer.\n\
                 Finally, provide your answer with citations [ID:chunk_id].\n\n\
                 Reasoning and Answer:"
            ),
            "synthesis",
        ),
    }
}
