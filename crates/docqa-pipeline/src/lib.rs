//! docqa-pipeline
//!
//! End-to-end orchestration of the question-answering pipeline, plus the
//! tracer that wraps stage execution, the post-hoc failure diagnoser and
//! heuristic answer-quality metrics.

pub mod citations;
pub mod diagnosis;
pub mod metrics;
pub mod orchestrator;
pub mod result;
pub mod tracer;

pub use diagnosis::{diagnose_failure, run_diagnostics, DiagnosisResult, DiagnosticsReport};
pub use metrics::{
    evaluate_full, evaluate_generation, evaluate_retrieval, EvaluationResult,
    GenerationEvaluation, RetrievalEvaluation,
};
pub use orchestrator::{AdvancedOptions, Orchestrator, QueryOptions};
pub use result::{PipelineResult, QueryRewriteInfo, RetrievalMeta, SourceRef};
pub use tracer::{format_trace_summary, PipelineTracer, StageSpan, TraceRecord};
