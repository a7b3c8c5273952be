//! docqa-retrieval
//!
//! Retrieval backends and fusion: a tantivy-backed lexical store with
//! atomic reload, a reference embedding searcher, weighted reciprocal
//! rank fusion, the hybrid fan-out retriever, and the reranker wrapper.

pub mod fusion;
pub mod hybrid;
pub mod rerank;
pub mod semantic;
pub mod store;

pub use hybrid::{HybridRetriever, HybridSearchResult, HybridStrategy};
pub use rerank::{RerankOutcome, Reranker};
pub use semantic::{EmbeddingSearcher, HashEmbedder};
pub use store::{ChunkStore, IndexStatus};
