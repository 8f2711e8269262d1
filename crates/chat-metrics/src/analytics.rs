//! Running aggregate of everything a chat session did.

use std::collections::BTreeMap;

use chat_core::ContextKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{ChallengeClass, MetricsEvent, ProtocolEvent, SessionEvent, SystemEvent};

/// Rough bytes-per-token ratio used for the token estimate.
const BYTES_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatAnalytics {
    pub total_interactions: u64,
    pub successful_interactions: u64,
    pub failed_interactions: u64,
    pub total_latency_ms: u64,

    pub bot_challenges: u64,
    pub rate_limits: u64,
    pub invalid_tokens: u64,
    pub other_errors: u64,

    pub token_refreshes: u64,
    pub header_refreshes: u64,
    pub degraded_header_refreshes: u64,

    /// Message count per kind, keyed by the snake_case kind name
    pub messages_by_kind: BTreeMap<String, u64>,
    pub estimated_tokens: u64,

    pub optimizations: u64,
    pub bytes_saved: i64,
    pub duplicates_removed: u64,

    pub model_changes: u64,
    pub current_model: Option<String>,
    pub dropped_events: u64,

    pub last_activity: Option<DateTime<Utc>>,
}

impl ChatAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the aggregate.
    pub fn apply(&mut self, event: &MetricsEvent) {
        match event {
            MetricsEvent::Protocol(event) => self.apply_protocol(event),
            MetricsEvent::Session(event) => self.apply_session(event),
            MetricsEvent::System(SystemEvent::MetricsDropped { count, .. }) => {
                self.dropped_events += count;
            }
        }
    }

    fn apply_protocol(&mut self, event: &ProtocolEvent) {
        match event {
            ProtocolEvent::TokenRefreshed { meta } => {
                self.token_refreshes += 1;
                self.touch(meta.occurred_at);
            }
            ProtocolEvent::HeadersRefreshed { meta, degraded } => {
                self.header_refreshes += 1;
                if *degraded {
                    self.degraded_header_refreshes += 1;
                }
                self.touch(meta.occurred_at);
            }
            ProtocolEvent::ChallengeDetected { meta, class, .. } => {
                self.count_error(*class);
                self.touch(meta.occurred_at);
            }
            ProtocolEvent::RequestCompleted {
                meta,
                model,
                latency_ms,
                success,
                failure,
            } => {
                self.total_interactions += 1;
                self.total_latency_ms += latency_ms;
                if *success {
                    self.successful_interactions += 1;
                } else {
                    self.failed_interactions += 1;
                    // challenges were already counted when detected
                    if matches!(failure, Some(ChallengeClass::Other) | None) {
                        self.other_errors += 1;
                    }
                }
                if self.current_model.is_none() {
                    self.current_model = Some(model.clone());
                }
                self.touch(meta.occurred_at);
            }
        }
    }

    fn apply_session(&mut self, event: &SessionEvent) {
        match event {
            SessionEvent::MessageAdded { meta, kind, bytes } => {
                *self
                    .messages_by_kind
                    .entry(kind_name(*kind).to_string())
                    .or_insert(0) += 1;
                self.estimated_tokens += (bytes / BYTES_PER_TOKEN) as u64;
                self.touch(meta.occurred_at);
            }
            SessionEvent::ContextOptimized {
                meta,
                bytes_saved,
                duplicates_removed,
            } => {
                self.optimizations += 1;
                self.bytes_saved += bytes_saved;
                self.duplicates_removed += *duplicates_removed as u64;
                self.touch(meta.occurred_at);
            }
            SessionEvent::ModelChanged { meta, model } => {
                self.model_changes += 1;
                self.current_model = Some(model.clone());
                self.touch(meta.occurred_at);
            }
            SessionEvent::Cleared { meta } => self.touch(meta.occurred_at),
        }
    }

    fn count_error(&mut self, class: ChallengeClass) {
        match class {
            ChallengeClass::BotChallenge => self.bot_challenges += 1,
            ChallengeClass::RateLimited => self.rate_limits += 1,
            ChallengeClass::InvalidToken => self.invalid_tokens += 1,
            ChallengeClass::Other => self.other_errors += 1,
        }
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.last_activity = Some(at);
    }

    pub fn average_latency_ms(&self) -> f64 {
        if self.total_interactions == 0 {
            return 0.0;
        }
        self.total_latency_ms as f64 / self.total_interactions as f64
    }

    /// Share of successful interactions, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_interactions == 0 {
            return 0.0;
        }
        self.successful_interactions as f64 / self.total_interactions as f64 * 100.0
    }

    pub fn messages_of(&self, kind: ContextKind) -> u64 {
        self.messages_by_kind
            .get(kind_name(kind))
            .copied()
            .unwrap_or(0)
    }

    /// Human-readable report, one line per entry.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Interactions: {} ({} ok, {} failed, {:.1}% success)",
                self.total_interactions,
                self.successful_interactions,
                self.failed_interactions,
                self.success_rate()
            ),
            format!("Average latency: {:.0} ms", self.average_latency_ms()),
            format!(
                "Challenges: {} bot, {} rate-limited, {} invalid token, {} other",
                self.bot_challenges, self.rate_limits, self.invalid_tokens, self.other_errors
            ),
            format!(
                "Refreshes: {} token, {} header ({} degraded)",
                self.token_refreshes, self.header_refreshes, self.degraded_header_refreshes
            ),
            format!(
                "Messages: {} user, {} assistant, {} injected (~{} tokens)",
                self.messages_of(ContextKind::User),
                self.messages_of(ContextKind::Assistant),
                self.messages_of(ContextKind::FileContext)
                    + self.messages_of(ContextKind::UrlContext)
                    + self.messages_of(ContextKind::SearchContext),
                self.estimated_tokens
            ),
            format!(
                "Optimizations: {} ({} bytes saved, {} duplicates removed)",
                self.optimizations, self.bytes_saved, self.duplicates_removed
            ),
        ];
        if let Some(model) = &self.current_model {
            lines.push(format!("Model: {} ({} changes)", model, self.model_changes));
        }
        lines
    }
}

fn kind_name(kind: ContextKind) -> &'static str {
    match kind {
        ContextKind::User => "user",
        ContextKind::Assistant => "assistant",
        ContextKind::FileContext => "file_context",
        ContextKind::UrlContext => "url_context",
        ContextKind::SearchContext => "search_context",
    }
}
