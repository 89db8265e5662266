//! Table layouts and row types for the session memory database

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Versioned migrations for the session memory database.
pub const MEMORY_MIGRATIONS: &[(i32, &str)] = &[
    (
        1,
        "CREATE TABLE IF NOT EXISTS session_memory (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
            text TEXT NOT NULL,
            meta TEXT NOT NULL DEFAULT '{}',
            fact_type TEXT,
            fact_value TEXT,
            ts TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_session_memory_session
            ON session_memory (session_id, id);",
    ),
    (
        2,
        "ALTER TABLE session_memory ADD COLUMN embedding BLOB;
         ALTER TABLE session_memory ADD COLUMN embedding_model TEXT;",
    ),
];

/// One persisted memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMemory {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub text: String,
    pub meta: serde_json::Value,
    pub fact_type: Option<String>,
    pub fact_value: Option<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_records: i64,
    pub total_sessions: i64,
    pub database_size_bytes: i64,
}
