//! Importance scoring.
//!
//! Each message is scored independently of the others, except for its
//! distance from the end of the transcript.

use chat_core::{ContextKind, Message};

use crate::hashing::content_hash;

const ASSISTANT_WEIGHT: f64 = 0.4;
const USER_WEIGHT: f64 = 0.3;
const INJECTION_WEIGHT: f64 = 0.1;

const RECENCY_WEIGHT: f64 = 0.3;
const RECENCY_DECAY: f64 = 0.1;

const LONG_BODY_BYTES: usize = 100;
const LONG_BODY_BONUS: f64 = 0.1;
const CODE_BLOCK_BONUS: f64 = 0.2;
const QUESTION_BONUS: f64 = 0.1;
const INJECTION_TAG_BONUS: f64 = 0.15;
const WORDY_THRESHOLD: usize = 50;
const WORDY_BONUS: f64 = 0.1;
const KEYWORD_BONUS: f64 = 0.05;

const TECHNICAL_KEYWORDS: &[&str] = &[
    "function",
    "class",
    "method",
    "algorithm",
    "implementation",
    "error",
    "debug",
    "solution",
    "code",
    "api",
    "database",
    "optimize",
    "performance",
    "security",
    "architecture",
];

/// Assigns an importance in `[0, 1]` to each transcript message.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContextScorer;

impl ContextScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score every message in place and refresh its content hash.
    pub fn score_all(&self, messages: &mut [Message]) {
        let total = messages.len();
        for (position, message) in messages.iter_mut().enumerate() {
            message.importance = self.score(message, position, total);
            message.content_hash = content_hash(&message.content);
        }
    }

    /// Score of the message at `position` in a transcript of `total` messages.
    pub fn score(&self, message: &Message, position: usize, total: usize) -> f64 {
        let mut score = match message.kind {
            ContextKind::Assistant => ASSISTANT_WEIGHT,
            ContextKind::User => USER_WEIGHT,
            ContextKind::FileContext | ContextKind::UrlContext | ContextKind::SearchContext => {
                INJECTION_WEIGHT
            }
        };

        score += recency(position, total) * RECENCY_WEIGHT;

        let content = message.content.to_lowercase();
        if content.len() > LONG_BODY_BYTES {
            score += LONG_BODY_BONUS;
        }
        if content.contains("```") {
            score += CODE_BLOCK_BONUS;
        }
        if content.contains('?') {
            score += QUESTION_BONUS;
        }
        if message.kind.is_injection() {
            score += INJECTION_TAG_BONUS;
        }
        if content.split_whitespace().count() > WORDY_THRESHOLD {
            score += WORDY_BONUS;
        }
        if TECHNICAL_KEYWORDS.iter().any(|kw| content.contains(kw)) {
            score += KEYWORD_BONUS;
        }

        score.clamp(0.0, 1.0)
    }
}

/// Decays with the distance from the end; the last message sits at distance 1.
fn recency(position: usize, total: usize) -> f64 {
    let distance = total.saturating_sub(position) as f64;
    1.0 / (1.0 + distance * RECENCY_DECAY)
}
