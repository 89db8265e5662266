//! Language model and embedding seams.
//!
//! The orchestrator only sees these traits; `LlmClient` is the HTTP
//! implementation against an OpenAI-compatible server.

pub mod client;

use async_trait::async_trait;

use crate::error::LlmError;

pub use client::LlmClient;

/// One prompt in, one completion out. Implementations enforce their own
/// timeout and never retry.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>>;
}
