//! Keyword routing between the data (BI) path and the informational path.

use lazy_static::lazy_static;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Bi,
    Informational,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Bi => "bi",
            Intent::Informational => "informational",
        }
    }
}

const BI_KEYWORDS: &[&str] = &[
    "show",
    "list",
    "count",
    "total",
    "per",
    "by",
    "how many",
    "available",
    "vacant",
    "occupied",
    "seats",
    "rooms",
    "bookings",
    "pending",
    "fees",
    "payment",
    "availability",
    "seat",
    "block",
    "vacancy",
    "students",
];

lazy_static! {
    static ref DATA_NOUN: Regex = Regex::new(
        r"(?i)\b(block|seat|room|student|gender|fees|booking|date|month|year|vacant|available)\b"
    )
    .unwrap();
    static ref RECALL_QUESTION: Regex = Regex::new(
        r"(?i)^\s*(?:what(?:['’]s|\s+is|\s+was)|do\s+you\s+(?:know|remember)|tell\s+me|remind\s+me)\b.*\bmy\s+(block(?:\s+(?:id|number|no))?|roll\s*(?:no\.?|number)?|allerg\w*)\s*[?.!]?\s*$"
    )
    .unwrap();
    static ref DATA_REQUEST: Regex =
        Regex::new(r"(?i)\b(?:how many|count|list|show|number of|total|vacant|available|occupied|seats?)\b").unwrap();
}

/// Deterministic, total classifier. Anything that is not clearly a data
/// question is informational.
#[derive(Debug, Clone, Default)]
pub struct IntentRouter;

impl IntentRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, message: &str) -> Intent {
        let lower = message.to_lowercase();
        if lower.contains("how many") || lower.contains("count") {
            return Intent::Bi;
        }
        let keyword_hit = BI_KEYWORDS.iter().any(|k| lower.contains(k));
        if keyword_hit && DATA_NOUN.is_match(&lower) {
            Intent::Bi
        } else {
            Intent::Informational
        }
    }

    /// Which session fact, if any, the message asks us to recall, e.g.
    /// "what is my block?" gives `Some("block")`. The message must ask for the
    /// fact itself; "how many vacant seats are in my block?" is a data question.
    pub fn recall_fact(&self, message: &str) -> Option<&'static str> {
        if DATA_REQUEST.is_match(message) {
            return None;
        }
        let fact = RECALL_QUESTION.captures(message)?.get(1)?.as_str().to_lowercase();
        if fact.starts_with("roll") {
            Some("rollno")
        } else if fact.starts_with("allerg") {
            Some("allergy")
        } else {
            Some("block")
        }
    }
}
