//! docqa-query
//!
//! Query understanding for the retrieval pipeline: pattern-based intent
//! classification and decomposition (`analyzer`) and recall-broadening
//! rewriting (`rewriter`).

pub mod analyzer;
pub mod rewriter;

pub use analyzer::{analyze_query, QueryAnalysis, QueryType, RetrievalStrategy};
pub use rewriter::{rewrite_query, QueryRewriteResult, RewriteStrategy};
