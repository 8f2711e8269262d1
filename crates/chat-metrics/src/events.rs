use chat_core::ContextKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to every metrics event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    /// Unique event ID (UUID v4)
    pub event_id: String,
    /// When the event occurred
    pub occurred_at: DateTime<Utc>,
    /// Session the event belongs to, when known
    pub session_id: Option<String>,
}

impl EventMeta {
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            session_id: None,
        }
    }

    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::new()
        }
    }
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified metrics event enum
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MetricsEvent {
    Protocol(ProtocolEvent),
    Session(SessionEvent),
    System(SystemEvent),
}

/// Why an upstream call failed, as far as analytics is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeClass {
    /// HTTP 418
    BotChallenge,
    /// HTTP 429
    RateLimited,
    /// Body carried the invalid-token marker
    InvalidToken,
    Other,
}

// ============================================================================
// Protocol Events (token lifecycle and upstream calls)
// ============================================================================

/// Events emitted by the session protocol manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// A fresh token was fetched from the bootstrap endpoint
    TokenRefreshed { meta: EventMeta },
    /// Auxiliary headers were regenerated
    HeadersRefreshed { meta: EventMeta, degraded: bool },
    ChallengeDetected {
        meta: EventMeta,
        class: ChallengeClass,
        attempt: u32,
    },
    RequestCompleted {
        meta: EventMeta,
        model: String,
        latency_ms: u64,
        success: bool,
        failure: Option<ChallengeClass>,
    },
}

// ============================================================================
// Session Events (transcript changes)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    MessageAdded {
        meta: EventMeta,
        kind: ContextKind,
        bytes: usize,
    },
    ContextOptimized {
        meta: EventMeta,
        bytes_saved: i64,
        duplicates_removed: usize,
    },
    ModelChanged { meta: EventMeta, model: String },
    Cleared { meta: EventMeta },
}

// ============================================================================
// System Events
// ============================================================================

/// System-level events for operational metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SystemEvent {
    MetricsDropped { count: u64, reason: String },
}

impl MetricsEvent {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            MetricsEvent::Protocol(ProtocolEvent::TokenRefreshed { .. }) => "protocol.token_refreshed",
            MetricsEvent::Protocol(ProtocolEvent::HeadersRefreshed { .. }) => "protocol.headers_refreshed",
            MetricsEvent::Protocol(ProtocolEvent::ChallengeDetected { .. }) => "protocol.challenge_detected",
            MetricsEvent::Protocol(ProtocolEvent::RequestCompleted { .. }) => "protocol.request_completed",
            MetricsEvent::Session(SessionEvent::MessageAdded { .. }) => "session.message_added",
            MetricsEvent::Session(SessionEvent::ContextOptimized { .. }) => "session.context_optimized",
            MetricsEvent::Session(SessionEvent::ModelChanged { .. }) => "session.model_changed",
            MetricsEvent::Session(SessionEvent::Cleared { .. }) => "session.cleared",
            MetricsEvent::System(SystemEvent::MetricsDropped { .. }) => "system.metrics_dropped",
        }
    }
}
