use chat_core::Message;
use chat_metrics::ChatAnalytics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_VERSION: &str = "1.0";

/// Everything needed to persist and later restore a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub version: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub analytics: ChatAnalytics,
}

impl SessionSnapshot {
    /// First user line, shortened for listings.
    pub fn title(&self, max_chars: usize) -> String {
        let first = self
            .messages
            .iter()
            .find(|m| m.kind == chat_core::ContextKind::User)
            .map(|m| m.content.lines().next().unwrap_or_default())
            .unwrap_or("(empty)");
        if first.chars().count() > max_chars {
            let cut: String = first.chars().take(max_chars).collect();
            format!("{}...", cut)
        } else {
            first.to_string()
        }
    }
}
