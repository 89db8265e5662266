//! Shared application state
//!
//! Built once at startup and handed to every handler behind an `Arc`. All
//! adapters (model client, stores, executor) live here so handlers never
//! construct their own.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{
    background::spawn_non_critical,
    config::Config,
    knowledge::{ingest_folder, IngestReport, KnowledgeIndex},
    llm::{Embedder, LlmClient},
    memory::InMemoryChatHistory,
    memory_db::MemoryDatabase,
    query_engine::{
        schema_text::load_schema_text, OrchestratorConfig, QueryOrchestrator, SqlExecutor, SqliteExecutor,
        UnavailableExecutor,
    },
};

/// Counters reported by the admin stats endpoint
#[derive(Default)]
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
    pub chat_turns: AtomicUsize,
    pub reindex_runs: AtomicUsize,
}

impl AtomicCounters {
    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed)
    }

    pub fn inc_chat_turns(&self) -> usize {
        self.chat_turns.fetch_add(1, Ordering::Relaxed)
    }
}

pub struct SharedState {
    /// Configuration (read-only after initialization)
    pub config: Arc<Config>,
    pub orchestrator: Arc<QueryOrchestrator>,
    pub knowledge: Arc<KnowledgeIndex>,
    pub memory_db: Arc<MemoryDatabase>,
    pub counters: Arc<AtomicCounters>,
    reindex_running: Arc<AtomicBool>,
}

impl SharedState {
    /// Wires every adapter from configuration. The hostel database is optional
    /// at startup: without it the data path reports the database as unavailable
    /// while the informational path keeps working.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let llm = Arc::new(LlmClient::new(&config));
        let embedder: Option<Arc<dyn Embedder>> = if config.embeddings_enabled {
            Some(llm.clone() as Arc<dyn Embedder>)
        } else {
            None
        };

        let memory_db = Arc::new(MemoryDatabase::new(
            &config.memory_db_path,
            embedder.clone(),
            config.embedding_model.clone(),
        )?);
        let knowledge = Arc::new(KnowledgeIndex::open(
            &config.knowledge_db_path,
            embedder,
            config.embedding_model.clone(),
        )?);

        let (executor, hostel_pool): (Arc<dyn SqlExecutor>, _) =
            match SqliteExecutor::open(&config.hostel_db_path, config.query_timeout(), config.max_result_rows) {
                Ok(executor) => {
                    let pool = executor.pool();
                    (Arc::new(executor) as Arc<dyn SqlExecutor>, Some(pool))
                }
                Err(e) => {
                    warn!("Hostel database unavailable, data questions will fail: {}", e);
                    (Arc::new(UnavailableExecutor) as Arc<dyn SqlExecutor>, None)
                }
            };

        let schema = load_schema_text(config.schema_pretext_path.as_deref(), hostel_pool.as_deref())
            .unwrap_or_else(|e| {
                warn!("Could not build schema description: {}", e);
                String::new()
            });

        let orchestrator = Arc::new(QueryOrchestrator::new(
            llm,
            executor,
            knowledge.clone(),
            Arc::new(memory_db.sessions.clone()),
            Arc::new(InMemoryChatHistory::new()),
            schema,
            OrchestratorConfig::from(&config),
        ));

        info!("Shared state initialized");
        Ok(Self {
            config: Arc::new(config),
            orchestrator,
            knowledge,
            memory_db,
            counters: Arc::new(AtomicCounters::default()),
            reindex_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Re-ingests the knowledge folder once, in the calling task.
    pub async fn reindex(&self) -> anyhow::Result<IngestReport> {
        self.counters.reindex_runs.fetch_add(1, Ordering::Relaxed);
        ingest_folder(&self.knowledge, &self.config.kb_folder).await
    }

    /// Starts a background reindex unless one is already running.
    pub fn spawn_reindex(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.reindex_running.swap(true, Ordering::SeqCst) {
            info!("Knowledge reindex already running");
            return None;
        }
        let state = Arc::clone(self);
        Some(spawn_non_critical("kb_reindex", async move {
            let result = state.reindex().await;
            state.reindex_running.store(false, Ordering::SeqCst);
            result.map(|report| {
                info!("Knowledge reindex finished: {} passage(s)", report.passages);
            })
        }))
    }

    pub fn reindex_running(&self) -> bool {
        self.reindex_running.load(Ordering::SeqCst)
    }
}
