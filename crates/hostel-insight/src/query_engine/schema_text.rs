//! Compact schema description that grounds the BI prompt.

use rusqlite::Connection;
use std::path::Path;
use tracing::{info, warn};

use crate::memory_db::SqlitePool;

const MAX_COLUMNS_PREVIEW: usize = 8;

const BI_RULES: &str = "\n=== RULES FOR BI AGENT ===\n\
1) ONLY produce SELECT SQL queries. No INSERT/UPDATE/DELETE/ALTER/DROP.\n\
2) Use only the tables and columns listed above.\n\
3) If the user asks to modify data, respond: 'This requires the Management Agent. I can only generate SELECT queries.'\n\
4) If ambiguous, ask for exactly one clarifying parameter (date range, hostel block, student id, etc.).\n\
5) Always return the SQL wrapped in ```sql ... ``` when responding with SQL.\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub columns: Vec<String>,
    pub table: String,
    pub referred: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

pub fn introspect(conn: &Connection) -> rusqlite::Result<Vec<TableInfo>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names: Vec<String> = stmt.query_map([], |r| r.get(0))?.collect::<rusqlite::Result<_>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let mut cols = conn.prepare("SELECT name, type, \"notnull\" FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = cols
            .query_map([&name], |r| {
                Ok(ColumnInfo {
                    name: r.get(0)?,
                    data_type: r.get(1)?,
                    nullable: r.get::<_, i64>(2)? == 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut fks = conn.prepare(
            "SELECT id, \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let mut rows = fks.query([&name])?;
        let mut foreign_keys: Vec<ForeignKeyInfo> = Vec::new();
        let mut last_id = None;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let from: String = row.get(1)?;
            let to: Option<String> = row.get(3)?;
            if last_id != Some(id) {
                foreign_keys.push(ForeignKeyInfo {
                    columns: Vec::new(),
                    table: row.get(2)?,
                    referred: Vec::new(),
                });
                last_id = Some(id);
            }
            if let Some(fk) = foreign_keys.last_mut() {
                fk.columns.push(from);
                fk.referred.extend(to);
            }
        }

        tables.push(TableInfo {
            name,
            columns,
            foreign_keys,
        });
    }
    Ok(tables)
}

/// Renders tables as the compact summary followed by the BI rules.
pub fn summarize(tables: &[TableInfo]) -> String {
    let mut lines = vec![
        "Database schema summary (compact). Use exact table and column names shown.".to_string(),
        "Do NOT invent columns. Only use these tables and columns.".to_string(),
        "----".to_string(),
    ];
    for table in tables {
        lines.push(format!("Table: {}", table.name));
        for col in table.columns.iter().take(MAX_COLUMNS_PREVIEW) {
            lines.push(format!("  - {} ({}, nullable={})", col.name, col.data_type, col.nullable));
        }
        if table.columns.len() > MAX_COLUMNS_PREVIEW {
            lines.push(format!(
                "  - ... (+{} more columns)",
                table.columns.len() - MAX_COLUMNS_PREVIEW
            ));
        }
        if !table.foreign_keys.is_empty() {
            lines.push("  Foreign keys:".to_string());
            for fk in &table.foreign_keys {
                lines.push(format!(
                    "    {} -> {}({})",
                    fk.columns.join(", "),
                    fk.table,
                    fk.referred.join(", ")
                ));
            }
        }
        lines.push(String::new());
    }
    let mut text = lines.join("\n");
    text.push_str(BI_RULES);
    text
}

/// Schema text from the pretext file when configured and readable, otherwise
/// introspected from the hostel database.
pub fn load_schema_text(pretext: Option<&Path>, pool: Option<&SqlitePool>) -> anyhow::Result<String> {
    if let Some(path) = pretext {
        match std::fs::read_to_string(path) {
            Ok(text) if !text.trim().is_empty() => {
                info!("Loaded schema pretext from {}", path.display());
                return Ok(text);
            }
            Ok(_) => warn!("Schema pretext {} is empty, introspecting instead", path.display()),
            Err(e) => warn!("Could not read schema pretext {}: {}", path.display(), e),
        }
    }
    let Some(pool) = pool else {
        return Ok(String::new());
    };
    let conn = pool.get()?;
    let tables = introspect(&conn)?;
    info!("Introspected {} table(s) from the hostel database", tables.len());
    Ok(summarize(&tables))
}
