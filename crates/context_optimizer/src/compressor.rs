//! Compression of low-importance message bodies.
//!
//! Plain turns are compacted losslessly in spirit: whitespace runs collapse
//! and repeated lines are dropped. Injected context blocks are replaced by a
//! lossy summary: their header, a handful of structural key lines and a count
//! of elided code blocks. Either way a message is compressed at most once and
//! never grows.

use std::collections::HashSet;

use chat_core::Message;

use crate::hashing::{content_hash, normalize_whitespace};

/// Bodies at or below this length are left alone.
const MIN_COMPRESSIBLE_BYTES: usize = 500;
const MAX_KEY_LINES: usize = 5;
const MAX_HEADER_LINES: usize = 2;

const STRUCTURAL_KEYWORDS: &[&str] = &[
    "error",
    "function",
    "class ",
    "struct ",
    "enum ",
    "trait ",
    "impl ",
    "interface ",
    "import ",
    "def ",
    "fn ",
    "func ",
    "return ",
    "if ",
    "for ",
    "while ",
    "match ",
    "switch ",
];

#[derive(Debug, Clone)]
pub struct Compressor {
    importance_threshold: f64,
    min_bytes: usize,
}

impl Compressor {
    pub fn new(importance_threshold: f64) -> Self {
        Self {
            importance_threshold,
            min_bytes: MIN_COMPRESSIBLE_BYTES,
        }
    }

    pub fn with_min_bytes(mut self, min_bytes: usize) -> Self {
        self.min_bytes = min_bytes;
        self
    }

    pub fn is_eligible(&self, message: &Message) -> bool {
        !message.compressed
            && message.importance < self.importance_threshold
            && message.len() > self.min_bytes
    }

    /// Compress every eligible message in place; returns how many shrank.
    pub fn compress_all(&self, messages: &mut [Message]) -> usize {
        let count = messages
            .iter_mut()
            .filter(|m| self.is_eligible(m))
            .map(|m| self.compress(m))
            .filter(|shrank| *shrank)
            .count();
        if count > 0 {
            log::info!("Compressed {} low-importance messages", count);
        }
        count
    }

    /// Compress one message if eligible. The body is only replaced when the
    /// candidate is strictly shorter.
    pub fn compress(&self, message: &mut Message) -> bool {
        if !self.is_eligible(message) {
            return false;
        }

        let candidate = if message.kind.is_injection() {
            summarize_injection(&message.content)
        } else {
            compact_text(&message.content)
        };

        if candidate.len() >= message.content.len() {
            return false;
        }

        message.content = candidate;
        message.content_hash = content_hash(&message.content);
        message.compressed = true;
        true
    }
}

/// Collapse whitespace within lines, drop blank lines and exact repeats.
fn compact_text(content: &str) -> String {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(normalize_whitespace)
        .filter(|line| !line.is_empty() && seen.insert(line.clone()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn summarize_injection(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    if lines.len() < 3 {
        return content.to_string();
    }

    let header_len = lines
        .iter()
        .take(MAX_HEADER_LINES)
        .take_while(|line| !line.trim().is_empty())
        .count()
        .max(1);
    let (header, body) = lines.split_at(header_len);

    let mut fences = 0usize;
    let mut key_lines = Vec::new();
    for line in body {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            fences += 1;
            continue;
        }
        let lowered = trimmed.to_lowercase();
        if STRUCTURAL_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            key_lines.push(trimmed);
        }
    }
    let code_blocks = fences.div_ceil(2);

    let mut summary = header.join("\n");
    summary.push_str(&format!(
        "\n[Summary: {} key lines, {} code blocks elided]",
        key_lines.len(),
        code_blocks
    ));
    for line in key_lines.iter().take(MAX_KEY_LINES) {
        summary.push('\n');
        summary.push_str(line);
    }
    if key_lines.len() > MAX_KEY_LINES {
        summary.push_str("\n...");
    }
    summary
}
