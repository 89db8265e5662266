//! Memory database module - SQLite-backed session memory and the shared pool setup
pub mod facts;
pub mod migration;
pub mod schema;
pub mod session_store;

pub use facts::{extract_fact, Fact};
pub use migration::MigrationManager;
pub use schema::*;
pub use session_store::{SessionMemory, SessionMemoryStore, TurnRecord};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::llm::Embedder;

pub type SqlitePool = Pool<SqliteConnectionManager>;

/// Opens a writable pooled SQLite database, creating the file and its parent
/// directory if needed, and brings it up to the latest migration.
pub fn open_pool(db_path: &Path, migrations: &'static [(i32, &'static str)]) -> anyhow::Result<Arc<SqlitePool>> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;"));
    let pool = Pool::builder()
        .max_size(10)
        .build(manager)
        .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

    {
        let mut conn = pool.get()?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        let mut migrator = MigrationManager::new(&mut conn, migrations);
        migrator.initialize_database()?;
    }
    Ok(Arc::new(pool))
}

pub struct MemoryDatabase {
    pub sessions: SessionMemoryStore,
    pool: Arc<SqlitePool>,
}

impl MemoryDatabase {
    pub fn new(
        db_path: &Path,
        embedder: Option<Arc<dyn Embedder>>,
        embedding_model: impl Into<String>,
    ) -> anyhow::Result<Self> {
        info!("Opening memory database at: {}", db_path.display());
        let pool = open_pool(db_path, MEMORY_MIGRATIONS)?;
        info!("Memory database initialized successfully");
        Ok(Self {
            sessions: SessionMemoryStore::new(Arc::clone(&pool), embedder, embedding_model),
            pool,
        })
    }

    pub fn get_stats(&self) -> anyhow::Result<DatabaseStats> {
        self.sessions.get_stats()
    }

    pub fn schema_version(&self) -> anyhow::Result<i32> {
        let mut conn = self.pool.get()?;
        let migrator = MigrationManager::new(&mut conn, MEMORY_MIGRATIONS);
        Ok(migrator.get_current_version()?)
    }
}

impl Drop for MemoryDatabase {
    fn drop(&mut self) {
        if let Ok(conn) = self.pool.get() {
            if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                warn!("Failed to checkpoint memory database: {}", e);
            }
        }
    }
}
