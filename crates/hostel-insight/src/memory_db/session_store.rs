//! Per-session long-term memory: recall by similarity, append whole turns.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::sync::Arc;
use tracing::{debug, warn};

use super::facts::extract_fact;
use super::schema::{DatabaseStats, StoredMemory};
use crate::llm::Embedder;
use crate::query_engine::envelope::{sort_by_score_desc, MemoryPayload, MemorySnippet};
use crate::utils::{cosine_similarity, keyword_relevance};

/// Records scanned per recall; older records beyond this are not considered.
const RECALL_SCAN_LIMIT: i64 = 500;

/// One completed exchange, written as two records in a single transaction.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub user_text: String,
    pub assistant_text: String,
    pub meta: serde_json::Value,
}

#[async_trait]
pub trait SessionMemory: Send + Sync {
    /// Top `k` records for `session_id`, most relevant to `query` first.
    async fn recall(&self, session_id: &str, query: &str, k: usize) -> anyhow::Result<Vec<MemorySnippet>>;

    async fn append_turn(&self, session_id: &str, turn: TurnRecord) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct SessionMemoryStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    embedder: Option<Arc<dyn Embedder>>,
    embedding_model: String,
}

impl SessionMemoryStore {
    pub fn new(
        pool: Arc<Pool<SqliteConnectionManager>>,
        embedder: Option<Arc<dyn Embedder>>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            embedder,
            embedding_model: embedding_model.into(),
        }
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        match embedder.embed(vec![text.to_string()]).await {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                debug!("Embedding unavailable, using keyword scoring: {}", e);
                None
            }
        }
    }

    /// Most recent `limit` records of a session, newest first.
    pub fn load_session(&self, session_id: &str, limit: i64) -> anyhow::Result<Vec<StoredMemory>> {
        load_records(&self.pool, &self.embedding_model, session_id, limit)
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        let conn = self.pool.get()?;
        let total_records: i64 = conn.query_row("SELECT COUNT(*) FROM session_memory", [], |r| r.get(0))?;
        let total_sessions: i64 =
            conn.query_row("SELECT COUNT(DISTINCT session_id) FROM session_memory", [], |r| r.get(0))?;
        let database_size_bytes: i64 = conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);
        Ok(DatabaseStats {
            total_records,
            total_sessions,
            database_size_bytes,
        })
    }
}

fn load_records(
    pool: &Pool<SqliteConnectionManager>,
    embedding_model: &str,
    session_id: &str,
    limit: i64,
) -> anyhow::Result<Vec<StoredMemory>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, text, meta, fact_type, fact_value, embedding, embedding_model, ts
         FROM session_memory
         WHERE session_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )?;
    let mut rows = stmt.query(params![session_id, limit])?;
    let mut records = Vec::new();

    while let Some(row) = rows.next()? {
        let meta_text: String = row.get(4)?;
        let embedding_bytes: Option<Vec<u8>> = row.get(7)?;
        let stored_model: Option<String> = row.get(8)?;
        let ts_text: String = row.get(9)?;

        let embedding = match (embedding_bytes, stored_model) {
            (Some(bytes), Some(model)) if model == embedding_model => {
                bincode::deserialize::<Vec<f32>>(&bytes).ok()
            }
            _ => None,
        };
        let ts = DateTime::parse_from_rfc3339(&ts_text)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| anyhow::anyhow!("Failed to parse timestamp: {}", e))?;

        records.push(StoredMemory {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: row.get(2)?,
            text: row.get(3)?,
            meta: serde_json::from_str(&meta_text).unwrap_or(serde_json::Value::Null),
            fact_type: row.get(5)?,
            fact_value: row.get(6)?,
            embedding,
            ts,
        });
    }
    Ok(records)
}

fn to_snippet(record: StoredMemory, score: f32) -> MemorySnippet {
    MemorySnippet {
        text: record.text,
        score,
        payload: Some(MemoryPayload {
            role: Some(record.role),
            ts: Some(record.ts.to_rfc3339()),
            fact_type: record.fact_type,
            fact_value: record.fact_value,
        }),
    }
}

#[async_trait]
impl SessionMemory for SessionMemoryStore {
    async fn recall(&self, session_id: &str, query: &str, k: usize) -> anyhow::Result<Vec<MemorySnippet>> {
        if session_id.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embed_one(query).await;

        let pool = Arc::clone(&self.pool);
        let model = self.embedding_model.clone();
        let session = session_id.to_string();
        let records =
            tokio::task::spawn_blocking(move || load_records(&pool, &model, &session, RECALL_SCAN_LIMIT))
                .await??;

        let mut scored: Vec<MemorySnippet> = records
            .into_iter()
            .map(|record| {
                let score = match (&query_embedding, &record.embedding) {
                    (Some(q), Some(e)) => cosine_similarity(q, e),
                    _ => keyword_relevance(&record.text, query),
                };
                to_snippet(record, score)
            })
            .collect();

        sort_by_score_desc(&mut scored, |m| m.score);
        scored.truncate(k);
        debug!("Recalled {} memory record(s) for session {}", scored.len(), session_id);
        Ok(scored)
    }

    async fn append_turn(&self, session_id: &str, turn: TurnRecord) -> anyhow::Result<()> {
        if session_id.is_empty() {
            return Ok(());
        }
        let user_text = format!("user: {}", turn.user_text.trim());
        let assistant_text = format!("assistant: {}", turn.assistant_text.trim());

        let embeddings = match &self.embedder {
            Some(embedder) => match embedder.embed(vec![user_text.clone(), assistant_text.clone()]).await {
                Ok(vectors) if vectors.len() == 2 => vectors.into_iter().map(Some).collect(),
                Ok(_) => vec![None, None],
                Err(e) => {
                    warn!("Storing memory without embeddings: {}", e);
                    vec![None, None]
                }
            },
            None => vec![None, None],
        };

        let fact = extract_fact(&turn.user_text);
        let meta = serde_json::to_string(&turn.meta)?;
        let ts = Utc::now().to_rfc3339();
        let pool = Arc::clone(&self.pool);
        let session = session_id.to_string();
        let model = self.embedding_model.clone();

        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let mut conn = pool.get()?;
            let tx = conn.transaction()?;
            let records = [
                ("user", &user_text, fact.as_ref()),
                ("assistant", &assistant_text, None),
            ];
            for ((role, text, fact), embedding) in records.into_iter().zip(embeddings) {
                let blob = embedding.map(|e| bincode::serialize(&e)).transpose()?;
                let embedding_model = blob.as_ref().map(|_| model.as_str());
                tx.execute(
                    "INSERT INTO session_memory
                     (session_id, role, text, meta, fact_type, fact_value, embedding, embedding_model, ts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        session,
                        role,
                        text,
                        meta,
                        fact.map(|f| f.fact_type),
                        fact.map(|f| f.value.as_str()),
                        blob,
                        embedding_model,
                        ts,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await??;

        debug!("Appended turn to session memory for {}", session_id);
        Ok(())
    }
}
