use thiserror::Error;

/// Irrecoverable pipeline conditions. Everything else degrades in place
/// via [`crate::outcome::StageOutcome`] and never surfaces as an error.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Empty or otherwise unusable input query. No stage runs.
    #[error("invalid query")]
    InvalidInput,

    /// Every configured retrieval source failed or returned nothing across
    /// all query variants. Generation is never attempted.
    #[error("retrieval exhausted: {0}")]
    RetrievalExhausted(String),

    /// The final generation call itself failed or timed out.
    #[error("generation failed: {0}")]
    Generation(String),
}

impl PipelineError {
    /// Machine-readable code surfaced on `PipelineResult::error`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_query",
            Self::RetrievalExhausted(_) => "retrieval_failed",
            Self::Generation(_) => "llm_call_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
