//! Error taxonomy for the query pipeline.
//!
//! Adapters and setup code return `anyhow::Result`. Everything that can end up
//! in a response envelope is one of the typed errors below, so the orchestrator
//! can turn it into a safe, structured `error` field.

use std::time::Duration;
use thiserror::Error;

/// Failures of the language model call. None of these are retried.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model did not answer within {0:?}")]
    Timeout(Duration),
    #[error("language model unavailable: {0}")]
    Unavailable(String),
    #[error("language model returned an unusable response: {0}")]
    BadResponse(String),
}

/// Why a SQL statement was refused before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SafetyViolation {
    #[error("empty statement")]
    Empty,
    #[error("statement could not be parsed")]
    Unparseable,
    #[error("more than one statement")]
    MultipleStatements,
    #[error("only read-only SELECT queries are allowed (found {0})")]
    NotAQuery(String),
    #[error("query writes data ({0})")]
    WriteClause(&'static str),
}

/// Failures of the read-only query executor. Messages are safe to show to users.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("query exceeded the {0:?} time limit")]
    Timeout(Duration),
    #[error("query returned more than {cap} rows; please narrow it down")]
    RowCapExceeded { cap: usize },
    #[error("query is not read-only")]
    NotReadOnly,
    #[error("{0}")]
    Rejected(String),
    #[error("database unavailable")]
    Unavailable,
}

/// Per-request pipeline outcome errors, surfaced as envelope `error` text.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No SQL found in model response")]
    ExtractionFailed,
    #[error("Unsafe SQL rejected: {0}")]
    SafetyRejected(#[from] SafetyViolation),
    #[error("Query failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("The assistant is temporarily unavailable ({0})")]
    Llm(#[from] LlmError),
}

impl PipelineError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ExtractionFailed => "extraction_failed",
            PipelineError::SafetyRejected(_) => "safety_rejected",
            PipelineError::Execution(_) => "execution_error",
            PipelineError::Llm(_) => "llm_unavailable",
        }
    }
}
