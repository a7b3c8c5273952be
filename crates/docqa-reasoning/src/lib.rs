//! docqa-reasoning
//!
//! Grounded answer synthesis: the layered RAG prompt (`prompts`) and
//! chain-of-thought reasoning over retrieved evidence (`chain`),
//! including the iterative retrieve-and-reason loop.

pub mod chain;
pub mod prompts;

pub use chain::{
    iterative_reason, reason_over_evidence, EvidenceSource, ReasoningResult, ABSTENTION_ANSWER,
};
pub use prompts::{build_rag_prompt, format_evidence, reasoning_prompt};
