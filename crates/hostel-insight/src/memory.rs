// hostel-insight/crates/hostel-insight/src/memory.rs

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub ts: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ts: Utc::now(),
        }
    }
}

/// Short-term per-session chat buffer, separate from the long-term session
/// memory in `memory_db`.
pub trait ChatHistoryStore: Send + Sync {
    fn recent(&self, session_id: &str, limit: usize) -> Vec<Message>;
    fn append(&self, session_id: &str, message: Message);
    fn clear(&self, session_id: &str);
}

#[derive(Clone)]
pub struct InMemoryChatHistory {
    store: Arc<DashMap<String, Vec<Message>>>,
    max_per_session: usize,
}

impl InMemoryChatHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `max_per_session` messages per session, oldest evicted first.
    pub fn with_capacity(max_per_session: usize) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            max_per_session: max_per_session.max(1),
        }
    }
}

impl Default for InMemoryChatHistory {
    fn default() -> Self {
        Self::with_capacity(200)
    }
}

impl ChatHistoryStore for InMemoryChatHistory {
    fn recent(&self, session_id: &str, limit: usize) -> Vec<Message> {
        match self.store.get(session_id) {
            Some(history) => {
                let start = history.len().saturating_sub(limit);
                history[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    fn append(&self, session_id: &str, message: Message) {
        if session_id.is_empty() || message.content.is_empty() {
            return;
        }
        let mut entry = self.store.entry(session_id.to_string()).or_default();
        entry.push(message);
        let overflow = entry.len().saturating_sub(self.max_per_session);
        if overflow > 0 {
            entry.drain(..overflow);
        }
    }

    fn clear(&self, session_id: &str) {
        self.store.remove(session_id);
    }
}

/// Renders messages as `User: ...` / `Assistant: ...` lines.
pub fn format_for_prompt(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let prefix = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", prefix, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_returns_tail_in_order() {
        let store = InMemoryChatHistory::new();
        for i in 0..5 {
            store.append("s1", Message::new(Role::User, format!("q{}", i)));
        }
        let recent: Vec<String> = store.recent("s1", 2).into_iter().map(|m| m.content).collect();
        assert_eq!(recent, vec!["q3", "q4"]);
        assert!(store.recent("other", 10).is_empty());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = InMemoryChatHistory::with_capacity(3);
        for i in 0..5 {
            store.append("s1", Message::new(Role::User, format!("q{}", i)));
        }
        let all: Vec<String> = store.recent("s1", 10).into_iter().map(|m| m.content).collect();
        assert_eq!(all, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn test_empty_session_or_content_is_ignored() {
        let store = InMemoryChatHistory::new();
        store.append("", Message::new(Role::User, "hi"));
        store.append("s1", Message::new(Role::User, ""));
        assert!(store.recent("s1", 10).is_empty());
        store.append("s1", Message::new(Role::User, "hi"));
        store.clear("s1");
        assert!(store.recent("s1", 10).is_empty());
    }

    #[test]
    fn test_format_for_prompt() {
        let history = vec![
            Message::new(Role::User, "my block is 3"),
            Message::new(Role::Assistant, "Noted."),
        ];
        assert_eq!(format_for_prompt(&history), "User: my block is 3\nAssistant: Noted.");
        assert_eq!(format_for_prompt(&[]), "");
    }
}
