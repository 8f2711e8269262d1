//! Message module - transcript entries
//!
//! A transcript is an ordered `Vec<Message>`: insertion order is
//! conversational order, and every optimisation pass must preserve it for the
//! messages it keeps.

mod kind;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use kind::{ContextKind, WireRole};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub kind: ContextKind,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// Importance in `[0, 1]`, assigned by the context scorer.
    #[serde(default)]
    pub importance: f64,
    /// Whitespace-normalised content hash, assigned by the context scorer.
    #[serde(default)]
    pub content_hash: u64,
    #[serde(default)]
    pub compressed: bool,
}

impl Message {
    pub fn new(kind: ContextKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            importance: 0.0,
            content_hash: 0,
            compressed: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ContextKind::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ContextKind::Assistant, content)
    }

    pub fn file_context(path: &str, body: &str) -> Self {
        Self::injection(ContextKind::FileContext, path, body)
    }

    pub fn url_context(url: &str, body: &str) -> Self {
        Self::injection(ContextKind::UrlContext, url, body)
    }

    pub fn search_context(query: &str, body: &str) -> Self {
        Self::injection(ContextKind::SearchContext, query, body)
    }

    fn injection(kind: ContextKind, source: &str, body: &str) -> Self {
        let tag = kind.tag().unwrap_or_default();
        let content = format!("{}\n{}: {}\n\n{}", tag, kind.source_label(), source, body);
        Self::new(kind, content)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn wire_role(&self) -> WireRole {
        self.kind.wire_role()
    }

    /// Byte length of the body, the unit every budget is measured in.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Cumulative byte size of a transcript.
pub fn transcript_bytes(messages: &[Message]) -> usize {
    messages.iter().map(Message::len).sum()
}
