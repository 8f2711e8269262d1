//! Result and analysis types.

use chat_core::Message;
use serde::{Deserialize, Serialize};

/// Output of one optimisation pass.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// The rewritten transcript, in conversational order
    pub messages: Vec<Message>,
    /// Original size minus optimised size
    pub bytes_saved: i64,
    pub duplicates_removed: usize,
    pub messages_compressed: usize,
    pub messages_truncated: usize,
}

impl OptimizationResult {
    pub(crate) fn unchanged(messages: Vec<Message>) -> Self {
        Self {
            messages,
            bytes_saved: 0,
            duplicates_removed: 0,
            messages_compressed: 0,
            messages_truncated: 0,
        }
    }
}

/// Snapshot of transcript health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextAnalysis {
    pub total_messages: usize,
    pub total_bytes: usize,
    /// Messages scoring above the importance threshold
    pub important_messages: usize,
    pub duplicate_count: usize,
    /// 0 (needs work) to 100 (healthy)
    pub optimization_score: f64,
    pub recommendations: Vec<String>,
}
