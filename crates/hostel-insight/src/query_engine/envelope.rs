//! Request and response shapes shared by the orchestrator, the HTTP layer and
//! the CLI.

use serde::{Deserialize, Serialize};

use super::chart::ChartSpec;
use super::prompt::Truncation;
use super::row::Row;

/// One user turn. `session_id` is supplied by the client and is trusted as-is;
/// it only selects which memory records are read and written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Request {
    pub message: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub debug: bool,
}

impl Request {
    pub fn new(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            session_id: session_id.into(),
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// A knowledge-base passage returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub source: String,
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Metadata carried with a recalled memory record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fact_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnippet {
    pub text: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<MemoryPayload>,
}

impl MemorySnippet {
    pub fn fact(&self, fact_type: &str) -> Option<&str> {
        let payload = self.payload.as_ref()?;
        if payload.fact_type.as_deref() == Some(fact_type) {
            payload.fact_value.as_deref()
        } else {
            None
        }
    }

    pub fn timestamp(&self) -> &str {
        self.payload
            .as_ref()
            .and_then(|p| p.ts.as_deref())
            .unwrap_or("")
    }
}

/// Stable sort by descending score. Equal scores keep their input order.
pub fn sort_by_score_desc<T, F>(items: &mut [T], score: F)
where
    F: Fn(&T) -> f32,
{
    items.sort_by(|a, b| {
        score(b)
            .partial_cmp(&score(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub idx: usize,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiEnvelope {
    pub answer: String,
    pub sql: Option<String>,
    pub safety_ok: bool,
    pub data: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
    pub error: Option<String>,
    pub prompt: String,
    pub llm_raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used: Option<Vec<MemorySnippet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_context: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InformationalEnvelope {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub kb_hits: Vec<RetrievalHit>,
    pub memory_used: Vec<MemorySnippet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_truncated: Option<Truncation>,
}

impl InformationalEnvelope {
    pub fn with_answer(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            ..Self::default()
        }
    }
}

/// Result of one orchestrated turn, tagged by `type` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseEnvelope {
    Bi(BiEnvelope),
    Informational(InformationalEnvelope),
}

impl ResponseEnvelope {
    /// Text recorded as the assistant's side of the turn.
    pub fn answer(&self) -> &str {
        match self {
            ResponseEnvelope::Bi(bi) => &bi.answer,
            ResponseEnvelope::Informational(info) => &info.answer,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ResponseEnvelope::Bi(bi) => bi.error.as_deref(),
            ResponseEnvelope::Informational(info) => info.error.as_deref(),
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            ResponseEnvelope::Bi(_) => "bi",
            ResponseEnvelope::Informational(_) => "informational",
        }
    }
}
