//! Knowledge-base passages: ingestion from JSON files and ranked retrieval
pub mod index;
pub mod ingest;

pub use index::{KnowledgeIndex, Passage, KNOWLEDGE_MIGRATIONS};
pub use ingest::{chunk_text, ingest_folder, json_to_passages, IngestReport};

use async_trait::async_trait;

use crate::query_engine::envelope::RetrievalHit;

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` passages for `query`, highest score first.
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<RetrievalHit>>;
}
