//! The caller-owned chat session.
//!
//! A [`ChatSession`] ties the transcript to one protocol manager, the
//! compaction engine, analytics and optional history. It is a plain value:
//! whoever needs to share it wraps it in a [`SharedSession`].

use std::path::PathBuf;
use std::sync::Arc;

use chat_core::{display_name, resolve_model, Config, ContextKind, Message};
use chat_metrics::{AnalyticsWorker, ChatAnalytics, EventMeta, MetricsBus, MetricsEvent, SessionEvent};
use chrono::{DateTime, Utc};
use context_optimizer::{ContextAnalysis, ContextOptimizer};
use duck_llm::{ChatStream, ProtocolConfig, SessionProtocolManager};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::history::HistoryManager;
use crate::snapshot::{SessionSnapshot, SNAPSHOT_VERSION};

const METRICS_CAPACITY: usize = 256;

/// Handle held by every concurrent caller of one session.
pub type SharedSession = Arc<Mutex<ChatSession>>;

pub struct ChatSession {
    id: String,
    started_at: DateTime<Utc>,
    global_prompt: Option<String>,
    transcript: Vec<Message>,
    protocol: SessionProtocolManager,
    optimizer: ContextOptimizer,
    metrics: MetricsBus,
    analytics: AnalyticsWorker,
    history: Option<HistoryManager>,
}

impl ChatSession {
    pub async fn open(config: Config) -> SessionResult<Self> {
        let protocol = ProtocolConfig::from_config(&config);
        Self::open_with(config, protocol).await
    }

    /// Open with explicit transport settings.
    pub async fn open_with(config: Config, protocol: ProtocolConfig) -> SessionResult<Self> {
        let (metrics, analytics) = AnalyticsWorker::start(METRICS_CAPACITY);
        let model = config.model_id();
        let protocol = SessionProtocolManager::open(protocol, &model, metrics.clone()).await?;

        Ok(Self {
            id: new_session_id(),
            started_at: Utc::now(),
            global_prompt: config.global_prompt.clone().filter(|p| !p.trim().is_empty()),
            transcript: Vec::new(),
            optimizer: ContextOptimizer::new(config.context.clone()),
            history: config
                .save_history
                .then(|| HistoryManager::new(config.history_dir())),
            protocol,
            metrics,
            analytics,
        })
    }

    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        self.protocol.model()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn protocol(&self) -> &SessionProtocolManager {
        &self.protocol
    }

    pub fn history(&self) -> Option<&HistoryManager> {
        self.history.as_ref()
    }

    /// Append a user turn, compact if needed, and send the transcript.
    ///
    /// On failure the user turn stays in the transcript.
    pub async fn send_turn(&mut self, input: &str) -> SessionResult<ChatStream> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SessionError::EmptyInput);
        }

        let first_turn = !self.transcript.iter().any(|m| m.kind == ContextKind::User);
        let content = match (&self.global_prompt, first_turn) {
            (Some(prompt), true) => format!("{}\n\n{}", prompt, input),
            _ => input.to_string(),
        };
        self.push(Message::user(content));
        self.optimize_if_needed();
        self.metrics.report_drops("metrics channel full");

        Ok(self.protocol.send(&self.transcript).await?)
    }

    /// Record the assistant reply for the last turn.
    pub fn complete_turn(&mut self, text: &str) {
        if text.is_empty() {
            log::debug!("Empty reply, nothing appended");
            return;
        }
        self.push(Message::assistant(text));
    }

    /// Send a turn, hand each chunk to `on_chunk`, and record the full reply.
    pub async fn ask<F>(&mut self, input: &str, mut on_chunk: F) -> SessionResult<String>
    where
        F: FnMut(&str),
    {
        let mut stream = self.send_turn(input).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            on_chunk(&chunk);
            reply.push_str(&chunk);
        }
        self.complete_turn(&reply);
        Ok(reply)
    }

    pub fn add_file_context(&mut self, path: &str, body: &str) {
        self.push(Message::file_context(path, body));
    }

    pub fn add_url_context(&mut self, url: &str, body: &str) {
        self.push(Message::url_context(url, body));
    }

    pub fn add_search_context(&mut self, query: &str, results: &str) {
        self.push(Message::search_context(query, results));
    }

    /// Switch model by alias or full id. Returns the upstream id in use.
    pub fn change_model(&mut self, model: &str) -> String {
        let id = resolve_model(model);
        self.protocol.change_model(&id);
        self.emit(SessionEvent::ModelChanged {
            meta: self.meta(),
            model: id.clone(),
        });
        log::info!("Model is now {} ({})", display_name(&id), id);
        id
    }

    /// Start a fresh conversation. A non-empty transcript is saved in the
    /// background first; a failed save is only logged.
    pub async fn clear(&mut self) -> SessionResult<()> {
        if !self.transcript.is_empty() {
            if let Some(history) = self.history.clone() {
                let snapshot = self.snapshot().await;
                tokio::spawn(async move {
                    if let Err(e) = history.save_session(&snapshot).await {
                        log::warn!("Failed to save session {}: {}", snapshot.id, e);
                        return;
                    }
                    if let Err(e) = history.cleanup_old_sessions().await {
                        log::warn!("History cleanup failed: {}", e);
                    }
                });
            }
        }

        self.transcript.clear();
        self.id = new_session_id();
        self.started_at = Utc::now();
        self.emit(SessionEvent::Cleared { meta: self.meta() });
        self.protocol.reset().await?;
        Ok(())
    }

    /// Save the current conversation and wait for the write.
    pub async fn save(&self) -> SessionResult<Option<PathBuf>> {
        let Some(history) = &self.history else {
            return Ok(None);
        };
        if self.transcript.is_empty() {
            return Ok(None);
        }
        let path = history.save_session(&self.snapshot().await).await?;
        Ok(Some(path))
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.metrics.report_drops("metrics channel full");
        SessionSnapshot {
            id: self.id.clone(),
            model: self.model().to_string(),
            started_at: self.started_at,
            saved_at: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
            messages: self.transcript.clone(),
            analytics: self.analytics.snapshot().await,
        }
    }

    /// Continue a saved conversation. The session keeps its own token.
    pub async fn restore(&mut self, snapshot: SessionSnapshot) {
        log::info!(
            "Restoring session {} with {} messages",
            snapshot.id,
            snapshot.messages.len()
        );
        self.id = snapshot.id;
        self.started_at = snapshot.started_at;
        self.transcript = snapshot.messages;
        self.protocol.change_model(&snapshot.model);
        self.analytics.replace(snapshot.analytics).await;
    }

    pub fn analysis(&self) -> ContextAnalysis {
        self.optimizer.analyze(&self.transcript)
    }

    pub async fn analytics(&self) -> ChatAnalytics {
        self.analytics.snapshot().await
    }

    fn push(&mut self, message: Message) {
        self.emit(SessionEvent::MessageAdded {
            meta: self.meta(),
            kind: message.kind,
            bytes: message.len(),
        });
        self.transcript.push(message);
    }

    fn optimize_if_needed(&mut self) {
        if !self.optimizer.is_optimization_needed(&self.transcript) {
            return;
        }
        // The pending turn is pinned: only the history before it is compacted.
        let result = self
            .optimizer
            .optimize_pinned(std::mem::take(&mut self.transcript), 1);
        self.transcript = result.messages;
        self.emit(SessionEvent::ContextOptimized {
            meta: self.meta(),
            bytes_saved: result.bytes_saved,
            duplicates_removed: result.duplicates_removed,
        });
    }

    fn meta(&self) -> EventMeta {
        EventMeta::for_session(self.id.clone())
    }

    fn emit(&self, event: SessionEvent) {
        self.metrics.emit(MetricsEvent::Session(event));
    }
}

fn new_session_id() -> String {
    format!("{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), &Uuid::new_v4().simple().to_string()[..8])
}
