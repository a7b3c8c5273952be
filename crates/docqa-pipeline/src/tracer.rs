//! Scoped-span pipeline tracing.
//!
//! `PipelineTracer::stage` returns a guard; the span is recorded when
//! the guard drops, so closure is guaranteed on every exit path,
//! including early returns and degraded stages. `finish` consumes the
//! tracer and freezes the record; a `TraceRecord` is never mutated
//! afterward.

use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

const ERROR_TEXT_LIMIT: usize = 200;
const ANSWER_SUMMARY_LIMIT: usize = 200;

#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    pub name: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub metadata: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Immutable trace of one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub query: String,
    pub stages: Vec<StageTrace>,
    pub total_latency_ms: u64,
    pub success: bool,
    pub final_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct TracerState {
    stages: Vec<StageTrace>,
    success: bool,
    error: Option<String>,
}

pub struct PipelineTracer {
    trace_id: String,
    query: String,
    started: Instant,
    state: Mutex<TracerState>,
}

impl PipelineTracer {
    pub fn new(query: impl Into<String>) -> Self {
        let trace_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self {
            trace_id,
            query: query.into(),
            started: Instant::now(),
            state: Mutex::new(TracerState {
                stages: Vec::new(),
                success: true,
                error: None,
            }),
        }
    }

    /// Open a span for a named stage. Recording happens when the guard
    /// drops.
    pub fn stage(&self, name: impl Into<String>) -> StageSpan<'_> {
        StageSpan {
            tracer: self,
            name: name.into(),
            started: Instant::now(),
            metadata: serde_json::Map::new(),
            error: None,
        }
    }

    pub fn set_error(&self, error: impl Into<String>) {
        let mut state = self.lock_state();
        state.success = false;
        state.error = Some(truncate(&error.into(), ERROR_TEXT_LIMIT));
    }

    /// Freeze the trace. The tracer is consumed; the record is final.
    pub fn finish(self, final_answer: &str) -> TraceRecord {
        #[allow(clippy::cast_possible_truncation)]
        let total_latency_ms = self.started.elapsed().as_millis() as u64;
        let state = match self.state.into_inner() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        TraceRecord {
            trace_id: self.trace_id,
            query: self.query,
            stages: state.stages,
            total_latency_ms,
            success: state.success,
            final_answer: truncate(final_answer, ANSWER_SUMMARY_LIMIT),
            error: state.error,
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TracerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, stage: StageTrace) {
        let mut state = self.lock_state();
        if let Some(error) = &stage.error {
            state.success = false;
            state.error = Some(error.clone());
        }
        state.stages.push(stage);
    }
}

/// Guard for one traced stage.
pub struct StageSpan<'a> {
    tracer: &'a PipelineTracer,
    name: String,
    started: Instant,
    metadata: serde_json::Map<String, Value>,
    error: Option<String>,
}

impl StageSpan<'_> {
    pub fn meta(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Mark the stage (and the whole trace) as failed. The span still
    /// closes normally on drop.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error = Some(truncate(&reason.into(), ERROR_TEXT_LIMIT));
    }
}

impl Drop for StageSpan<'_> {
    fn drop(&mut self) {
        #[allow(clippy::cast_possible_truncation)]
        let latency_ms = self.started.elapsed().as_millis() as u64;
        self.tracer.record(StageTrace {
            name: std::mem::take(&mut self.name),
            latency_ms,
            metadata: std::mem::take(&mut self.metadata),
            error: self.error.take(),
        });
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Human-readable one-screen trace summary.
pub fn format_trace_summary(trace: &TraceRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Trace {} ===", trace.trace_id);
    let _ = writeln!(out, "Query: {}", truncate(&trace.query, 50));
    let _ = writeln!(
        out,
        "Status: {}",
        if trace.success { "SUCCESS" } else { "FAILED" }
    );
    let _ = writeln!(out, "Total Latency: {}ms", trace.total_latency_ms);
    let _ = writeln!(out, "\nStages:");
    for stage in &trace.stages {
        let status = match &stage.error {
            Some(e) => format!("ERROR: {}", truncate(e, 30)),
            None => "OK".to_string(),
        };
        let _ = writeln!(out, "  {}: {}ms [{}]", stage.name, stage.latency_ms, status);
        for (key, value) in stage.metadata.iter().take(3) {
            let _ = writeln!(out, "    {key}: {value}");
        }
    }
    if let Some(error) = &trace.error {
        let _ = writeln!(out, "\nError: {error}");
    }
    out
}
