//! The query pipeline: intent routing, prompt assembly, SQL extraction and
//! validation, read-only execution and chart inference.
pub mod chart;
pub mod envelope;
pub mod executor;
pub mod intent;
pub mod orchestrator;
pub mod prompt;
pub mod row;
pub mod schema_text;
pub mod sql_guard;

pub use chart::{infer as infer_chart, ChartOverride, ChartSpec};
pub use envelope::{
    BiEnvelope, InformationalEnvelope, MemorySnippet, Request, ResponseEnvelope, RetrievalHit, SourceRef,
};
pub use executor::{SqlExecutor, SqliteExecutor, UnavailableExecutor};
pub use intent::{Intent, IntentRouter};
pub use orchestrator::{OrchestratorConfig, QueryOrchestrator};
pub use prompt::{AssembledPrompt, PromptAssembler, PromptContext, PromptKind};
pub use row::{CellValue, Row};
