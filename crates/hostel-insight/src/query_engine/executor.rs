//! Read-only execution of validated SQL against the hostel database.

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::row::{CellValue, Row};
use crate::error::ExecutionError;
use crate::memory_db::SqlitePool;

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError>;
}

pub struct SqliteExecutor {
    pool: Arc<SqlitePool>,
    timeout: Duration,
    max_rows: usize,
}

impl SqliteExecutor {
    /// Opens `db_path` read-only. Every pooled connection also runs with
    /// `query_only`, so writes fail even if a statement slips past validation.
    pub fn open(db_path: &Path, timeout: Duration, max_rows: usize) -> anyhow::Result<Self> {
        if !db_path.exists() {
            anyhow::bail!("Hostel database not found at {}", db_path.display());
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_URI
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .with_init(|conn| conn.execute_batch("PRAGMA query_only = ON; PRAGMA busy_timeout = 5000;"));
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to open hostel database: {}", e))?;
        Ok(Self {
            pool: Arc::new(pool),
            timeout,
            max_rows: max_rows.max(1),
        })
    }

    /// Shared pool, also used for schema introspection.
    pub fn pool(&self) -> Arc<SqlitePool> {
        Arc::clone(&self.pool)
    }
}

#[async_trait]
impl SqlExecutor for SqliteExecutor {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, ExecutionError> {
        let pool = Arc::clone(&self.pool);
        let conn = tokio::task::spawn_blocking(move || pool.get())
            .await
            .map_err(|_| ExecutionError::Unavailable)?
            .map_err(|e| {
                warn!("Could not obtain hostel database connection: {}", e);
                ExecutionError::Unavailable
            })?;

        let interrupt = conn.get_interrupt_handle();
        let sql = sql.to_string();
        let max_rows = self.max_rows;
        let task = tokio::task::spawn_blocking(move || run_query(&conn, &sql, max_rows));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!("Query task failed: {}", e);
                Err(ExecutionError::Unavailable)
            }
            Err(_) => {
                interrupt.interrupt();
                warn!("Query interrupted after {:?}", self.timeout);
                Err(ExecutionError::Timeout(self.timeout))
            }
        }
    }
}

/// Stands in when the hostel database could not be opened at startup.
pub struct UnavailableExecutor;

#[async_trait]
impl SqlExecutor for UnavailableExecutor {
    async fn execute(&self, _sql: &str) -> Result<Vec<Row>, ExecutionError> {
        Err(ExecutionError::Unavailable)
    }
}

fn run_query(conn: &Connection, sql: &str, max_rows: usize) -> Result<Vec<Row>, ExecutionError> {
    let mut stmt = conn.prepare(sql).map_err(map_db_error)?;
    if !stmt.readonly() {
        return Err(ExecutionError::NotReadOnly);
    }
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([]).map_err(map_db_error)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(map_db_error)? {
        if out.len() >= max_rows {
            return Err(ExecutionError::RowCapExceeded { cap: max_rows });
        }
        let mut result = Row::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let value = match row.get_ref(idx).map_err(map_db_error)? {
                ValueRef::Null => CellValue::Null,
                ValueRef::Integer(i) => CellValue::Integer(i),
                ValueRef::Real(f) => CellValue::Real(f),
                ValueRef::Text(t) => CellValue::Text(String::from_utf8_lossy(t).into_owned()),
                ValueRef::Blob(b) => CellValue::Text(format!("<{} bytes>", b.len())),
            };
            result.push(name.clone(), value);
        }
        out.push(result);
    }
    debug!("Query returned {} row(s)", out.len());
    Ok(out)
}

/// Raw database errors are logged; callers only ever see a short message.
fn map_db_error(err: rusqlite::Error) -> ExecutionError {
    warn!("Hostel database error: {}", err);
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) => match e.code {
            ErrorCode::ReadOnly => ExecutionError::NotReadOnly,
            ErrorCode::OperationInterrupted => ExecutionError::Rejected("query was interrupted".to_string()),
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ExecutionError::Unavailable,
            _ => {
                let msg = msg.as_deref().unwrap_or_default();
                if msg.starts_with("no such table") || msg.starts_with("no such column") {
                    ExecutionError::Rejected("query refers to a table or column that does not exist".to_string())
                } else if msg.contains("syntax error") {
                    ExecutionError::Rejected("query has a syntax error".to_string())
                } else {
                    ExecutionError::Rejected("database could not run the query".to_string())
                }
            }
        },
        _ => ExecutionError::Rejected("database could not run the query".to_string()),
    }
}
