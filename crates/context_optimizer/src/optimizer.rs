//! Compaction façade.

use chat_core::{transcript_bytes, ContextBudget, Message};

use crate::compressor::Compressor;
use crate::dedup::{count_duplicates, Deduplicator};
use crate::scorer::ContextScorer;
use crate::truncator::Truncator;
use crate::types::{ContextAnalysis, OptimizationResult};

/// Message count above which a transcript is compacted regardless of size.
pub const MAX_MESSAGES: usize = 30;
/// Duplicate count above which a transcript is compacted.
pub const MAX_DUPLICATES: usize = 3;
const LONG_CONVERSATION: usize = 50;

/// Composes scorer, deduplicator, compressor and truncator. Holds only the
/// budget; transcripts pass through by value and are never retained.
#[derive(Debug, Clone)]
pub struct ContextOptimizer {
    budget: ContextBudget,
    scorer: ContextScorer,
    deduplicator: Deduplicator,
    compressor: Compressor,
    truncator: Truncator,
}

impl ContextOptimizer {
    pub fn new(budget: ContextBudget) -> Self {
        // Deserialized budgets bypass `ContextBudget::new`, so clamp again here.
        let budget = ContextBudget::new(
            budget.max_bytes,
            budget.importance_threshold,
            budget.target_compression_ratio,
        );
        Self {
            scorer: ContextScorer::new(),
            deduplicator: Deduplicator::new(),
            compressor: Compressor::new(budget.importance_threshold),
            truncator: Truncator::new(budget.max_bytes),
            budget,
        }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// True when the transcript is over budget, too long, or has more than a
    /// few exact duplicates.
    pub fn is_optimization_needed(&self, messages: &[Message]) -> bool {
        transcript_bytes(messages) > self.budget.max_bytes
            || messages.len() > MAX_MESSAGES
            || count_duplicates(messages) > MAX_DUPLICATES
    }

    /// Score, deduplicate, compress and, if still over budget, truncate.
    /// Deterministic for a given input; an empty transcript is a no-op.
    pub fn optimize(&self, messages: Vec<Message>) -> OptimizationResult {
        self.run(messages, &self.truncator)
    }

    /// Like [`optimize`](Self::optimize), but the last `pinned` messages pass
    /// through verbatim and their size is reserved out of the budget. Used
    /// for the turn about to be sent, which must never be dropped.
    pub fn optimize_pinned(&self, mut messages: Vec<Message>, pinned: usize) -> OptimizationResult {
        let split = messages.len().saturating_sub(pinned);
        let tail = messages.split_off(split);
        let reserved = transcript_bytes(&tail);
        let truncator = Truncator::new(self.budget.max_bytes.saturating_sub(reserved));

        let mut result = self.run(messages, &truncator);
        result.messages.extend(tail);
        result
    }

    fn run(&self, messages: Vec<Message>, truncator: &Truncator) -> OptimizationResult {
        if messages.is_empty() {
            return OptimizationResult::unchanged(messages);
        }

        let original_bytes = transcript_bytes(&messages);
        let mut messages = messages;

        self.scorer.score_all(&mut messages);
        let (mut messages, duplicates_removed) = self.deduplicator.dedup(messages);
        let messages_compressed = self.compressor.compress_all(&mut messages);
        let (messages, messages_truncated) = truncator.truncate(messages);

        let optimized_bytes = transcript_bytes(&messages);
        let bytes_saved = original_bytes as i64 - optimized_bytes as i64;
        if bytes_saved > 0 {
            log::info!(
                "Context optimized: {} -> {} bytes ({:.1}% reduction)",
                original_bytes,
                optimized_bytes,
                bytes_saved as f64 / original_bytes as f64 * 100.0
            );
        }

        OptimizationResult {
            messages,
            bytes_saved,
            duplicates_removed,
            messages_compressed,
            messages_truncated,
        }
    }

    pub fn analyze(&self, messages: &[Message]) -> ContextAnalysis {
        let mut scored = messages.to_vec();
        self.scorer.score_all(&mut scored);

        let total_bytes = transcript_bytes(&scored);
        let important_messages = scored
            .iter()
            .filter(|m| m.importance > self.budget.importance_threshold)
            .count();

        let mut analysis = ContextAnalysis {
            total_messages: scored.len(),
            total_bytes,
            important_messages,
            duplicate_count: count_duplicates(&scored),
            optimization_score: 0.0,
            recommendations: Vec::new(),
        };
        analysis.optimization_score = self.optimization_score(&analysis);
        analysis.recommendations = self.recommendations(&analysis);
        analysis
    }

    fn optimization_score(&self, analysis: &ContextAnalysis) -> f64 {
        let mut score = 100.0;
        let max_bytes = self.budget.max_bytes.max(1) as f64;

        if analysis.total_bytes > self.budget.max_bytes {
            let overflow = (analysis.total_bytes - self.budget.max_bytes) as f64;
            score -= 30.0 * overflow / max_bytes;
        }
        if analysis.total_messages > 0 {
            let total = analysis.total_messages as f64;
            score -= analysis.duplicate_count as f64 / total * 20.0;
            if analysis.important_messages as f64 / total > 0.5 {
                score += 10.0;
            }
        }

        score.clamp(0.0, 100.0)
    }

    fn recommendations(&self, analysis: &ContextAnalysis) -> Vec<String> {
        let mut out = Vec::new();
        if analysis.total_bytes > self.budget.max_bytes {
            out.push(format!(
                "Context size ({} bytes) exceeds the limit ({} bytes); compaction targets about {} bytes",
                analysis.total_bytes,
                self.budget.max_bytes,
                self.budget.target_bytes()
            ));
        }
        if analysis.duplicate_count > MAX_DUPLICATES {
            out.push(format!(
                "Found {} duplicate messages that could be removed",
                analysis.duplicate_count
            ));
        }
        if analysis.total_messages > LONG_CONVERSATION {
            out.push("Consider starting a new conversation to improve performance".to_string());
        }
        if analysis.optimization_score < 70.0 {
            out.push("Context optimization could significantly improve performance".to_string());
        }
        out
    }
}

impl Default for ContextOptimizer {
    fn default() -> Self {
        Self::new(ContextBudget::default())
    }
}
