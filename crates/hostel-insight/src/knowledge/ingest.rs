//! Turns the knowledge-base folder of JSON documents into indexed passages.

use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

use super::index::{KnowledgeIndex, Passage};

pub const MAX_PASSAGE_CHARS: usize = 1200;
const MAX_LIST_ITEMS: usize = 200;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub files: usize,
    pub skipped_files: usize,
    pub passages: usize,
}

/// Flattens a JSON document into `path > key: value` lines in document key
/// order. List items are numbered from 1 and only the first 200 of each list
/// are kept.
pub fn json_to_passages(value: &Value) -> Vec<String> {
    let mut out = Vec::new();
    flatten(value, "", &mut out);
    out
}

fn flatten(value: &Value, prefix: &str, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = format!("{}{}", prefix, key);
                match child {
                    Value::Object(_) | Value::Array(_) => flatten(child, &format!("{} > ", path), out),
                    scalar => out.push(format!("{}: {}", path, scalar_text(scalar))),
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().take(MAX_LIST_ITEMS).enumerate() {
                flatten(item, &format!("{}{}. ", prefix, i + 1), out);
            }
        }
        scalar => {
            let label = prefix.trim_end_matches(|c: char| c == ' ' || c == '>' || c == '.');
            if label.is_empty() {
                out.push(scalar_text(scalar));
            } else {
                out.push(format!("{}: {}", label, scalar_text(scalar)));
            }
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Splits `text` into chunks of at most `max_chars` characters, preferring line
/// boundaries and hard-splitting any single line that is still too long.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return if text.is_empty() { Vec::new() } else { vec![text.to_string()] };
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in text.lines() {
        let line_len = line.chars().count();
        if current_len + line_len + 1 > max_chars {
            if !current.trim().is_empty() {
                parts.push(current.trim().to_string());
            }
            current = line.to_string();
            current_len = line_len;
        } else {
            if !current.is_empty() {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(line);
            current_len += line_len;
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    let mut out = Vec::with_capacity(parts.len());
    for part in parts {
        if part.chars().count() <= max_chars {
            out.push(part);
        } else {
            let chars: Vec<char> = part.chars().collect();
            out.extend(chars.chunks(max_chars).map(|c| c.iter().collect::<String>()));
        }
    }
    out
}

/// Reads every `*.json` file in `folder`, in file-name order. Unreadable or
/// malformed files are logged and skipped.
pub fn collect_folder(folder: &Path) -> anyhow::Result<(Vec<Passage>, IngestReport)> {
    let mut report = IngestReport::default();
    let mut names: Vec<_> = std::fs::read_dir(folder)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "json"))
        .collect();
    names.sort();

    let mut passages = Vec::new();
    for path in names {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(anyhow::Error::from));
        let value = match parsed {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping knowledge file {}: {}", path.display(), e);
                report.skipped_files += 1;
                continue;
            }
        };
        report.files += 1;
        for line in json_to_passages(&value) {
            for chunk in chunk_text(&line, MAX_PASSAGE_CHARS) {
                passages.push(Passage::new(source.clone(), chunk));
            }
        }
    }
    report.passages = passages.len();
    Ok((passages, report))
}

/// Re-ingests `folder` into `index`. A missing folder or a folder with no
/// passages leaves the index untouched.
pub async fn ingest_folder(index: &KnowledgeIndex, folder: &Path) -> anyhow::Result<IngestReport> {
    if !folder.is_dir() {
        warn!("Knowledge folder not found: {}", folder.display());
        return Ok(IngestReport::default());
    }
    let dir = folder.to_path_buf();
    let (passages, report) = tokio::task::spawn_blocking(move || collect_folder(&dir)).await??;
    if passages.is_empty() {
        warn!("No passages found to ingest in {}", folder.display());
        return Ok(report);
    }
    index.replace_all(passages).await?;
    info!(
        "Ingested {} passage(s) from {} file(s), {} skipped",
        report.passages, report.files, report.skipped_files
    );
    Ok(report)
}
