// hostel-insight/crates/hostel-insight/src/lib.rs

pub mod api;
pub mod background;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod memory_db;
pub mod metrics;
pub mod query_engine;
pub mod server;
pub mod shared_state;
pub mod telemetry;
pub mod utils;

// Public API exports
pub use config::Config;
pub use error::{ExecutionError, LlmError, PipelineError, SafetyViolation};
pub use memory::{ChatHistoryStore, InMemoryChatHistory, Message, Role};
pub use query_engine::{
    infer_chart, BiEnvelope, ChartOverride, ChartSpec, InformationalEnvelope, QueryOrchestrator, Request,
    ResponseEnvelope, Row,
};
pub use server::{build_router, run_server};
pub use shared_state::SharedState;
