//! SQLite passage index with optional embeddings

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Retriever;
use crate::llm::Embedder;
use crate::memory_db::{open_pool, SqlitePool};
use crate::query_engine::envelope::{sort_by_score_desc, RetrievalHit};
use crate::utils::{cosine_similarity, keyword_relevance};

const EMBED_BATCH_SIZE: usize = 64;

pub const KNOWLEDGE_MIGRATIONS: &[(i32, &str)] = &[(
    1,
    "CREATE TABLE IF NOT EXISTS kb_passages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB,
        embedding_model TEXT,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_kb_passages_source ON kb_passages (source);",
)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub source: String,
    pub text: String,
}

impl Passage {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

struct StoredPassage {
    id: i64,
    source: String,
    text: String,
    embedding: Option<Vec<f32>>,
}

pub struct KnowledgeIndex {
    pool: Arc<SqlitePool>,
    embedder: Option<Arc<dyn Embedder>>,
    embedding_model: String,
}

impl KnowledgeIndex {
    pub fn open(
        db_path: &Path,
        embedder: Option<Arc<dyn Embedder>>,
        embedding_model: impl Into<String>,
    ) -> anyhow::Result<Self> {
        info!("Opening knowledge index at: {}", db_path.display());
        Ok(Self {
            pool: open_pool(db_path, KNOWLEDGE_MIGRATIONS)?,
            embedder,
            embedding_model: embedding_model.into(),
        })
    }

    async fn embed_all(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let Some(embedder) = &self.embedder else {
            return vec![None; texts.len()];
        };
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            match embedder.embed(batch.to_vec()).await {
                Ok(vectors) if vectors.len() == batch.len() => out.extend(vectors.into_iter().map(Some)),
                Ok(vectors) => {
                    warn!("Embedding batch size mismatch ({} for {}), storing without vectors", vectors.len(), batch.len());
                    out.extend(std::iter::repeat(None).take(batch.len()));
                }
                Err(e) => {
                    warn!("Embedding failed, storing passages without vectors: {}", e);
                    out.extend(std::iter::repeat(None).take(batch.len()));
                }
            }
        }
        out
    }

    /// Replaces every stored passage with `passages` in one transaction.
    pub async fn replace_all(&self, passages: Vec<Passage>) -> anyhow::Result<usize> {
        let texts: Vec<String> = passages.iter().map(|p| p.text.clone()).collect();
        let embeddings = self.embed_all(&texts).await;
        let pool = Arc::clone(&self.pool);
        let model = self.embedding_model.clone();

        let count = tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
            let mut conn = pool.get()?;
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM kb_passages", [])?;
            let created_at = Utc::now().to_rfc3339();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO kb_passages (source, text, embedding, embedding_model, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (passage, embedding) in passages.iter().zip(embeddings) {
                    let blob = embedding.map(|e| bincode::serialize(&e)).transpose()?;
                    let blob_model = blob.as_ref().map(|_| model.as_str());
                    stmt.execute(params![passage.source, passage.text, blob, blob_model, created_at])?;
                }
            }
            tx.commit()?;
            Ok(passages.len())
        })
        .await??;

        info!("Knowledge index now holds {} passage(s)", count);
        Ok(count)
    }

    pub fn passage_count(&self) -> anyhow::Result<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM kb_passages", [], |r| r.get(0))?)
    }
}

fn load_passages(pool: &SqlitePool, embedding_model: &str) -> anyhow::Result<Vec<StoredPassage>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare("SELECT id, source, text, embedding, embedding_model FROM kb_passages ORDER BY id")?;
    let mut rows = stmt.query([])?;
    let mut passages = Vec::new();
    while let Some(row) = rows.next()? {
        let bytes: Option<Vec<u8>> = row.get(3)?;
        let stored_model: Option<String> = row.get(4)?;
        let embedding = match (bytes, stored_model) {
            (Some(bytes), Some(m)) if m == embedding_model => bincode::deserialize::<Vec<f32>>(&bytes).ok(),
            _ => None,
        };
        passages.push(StoredPassage {
            id: row.get(0)?,
            source: row.get(1)?,
            text: row.get(2)?,
            embedding,
        });
    }
    Ok(passages)
}

#[async_trait]
impl Retriever for KnowledgeIndex {
    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<RetrievalHit>> {
        if k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(vec![query.to_string()]).await {
                Ok(mut v) => v.pop(),
                Err(e) => {
                    debug!("Query embedding failed, using keyword scoring: {}", e);
                    None
                }
            },
            None => None,
        };

        let pool = Arc::clone(&self.pool);
        let model = self.embedding_model.clone();
        let stored = tokio::task::spawn_blocking(move || load_passages(&pool, &model)).await??;

        let mut hits: Vec<RetrievalHit> = stored
            .into_iter()
            .map(|p| {
                let score = match (&query_embedding, &p.embedding) {
                    (Some(q), Some(e)) => cosine_similarity(q, e),
                    _ => keyword_relevance(&p.text, query),
                };
                RetrievalHit {
                    source: p.source,
                    text: p.text,
                    score,
                    id: Some(p.id.to_string()),
                }
            })
            .collect();

        sort_by_score_desc(&mut hits, |h| h.score);
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> KnowledgeIndex {
        KnowledgeIndex::open(&dir.path().join("kb.db"), None, "none").unwrap()
    }

    #[tokio::test]
    async fn test_replace_all_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        let passages = vec![
            Passage::new("rules.json", "curfew: 10 pm"),
            Passage::new("fees.json", "hostel fees: 45000 per year"),
        ];
        assert_eq!(index.replace_all(passages.clone()).await.unwrap(), 2);
        assert_eq!(index.replace_all(passages).await.unwrap(), 2);
        assert_eq!(index.passage_count().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_keyword_relevance() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        index
            .replace_all(vec![
                Passage::new("rules.json", "curfew: 10 pm"),
                Passage::new("fees.json", "hostel fees: 45000 per year"),
                Passage::new("mess.json", "mess timings: breakfast 7-9"),
            ])
            .await
            .unwrap();

        let hits = index.retrieve("what are the hostel fees", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "fees.json");
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].id.is_some());
    }

    #[tokio::test]
    async fn test_retrieve_on_empty_index() {
        let dir = TempDir::new().unwrap();
        let index = open(&dir);
        assert!(index.retrieve("anything", 5).await.unwrap().is_empty());
        assert!(index.retrieve("   ", 5).await.unwrap().is_empty());
    }
}
