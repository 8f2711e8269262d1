//! Exact-content deduplication over whitespace-normalised hashes.

use std::collections::HashMap;

use chat_core::Message;

use crate::hashing::content_hash;

/// Collapses repeated bodies, keeping the highest-scored occurrence in its
/// own position. Ties keep the earliest occurrence.
#[derive(Debug, Default, Clone, Copy)]
pub struct Deduplicator;

impl Deduplicator {
    pub fn new() -> Self {
        Self
    }

    /// Returns the surviving messages in transcript order and how many were
    /// removed. A second pass over the output removes nothing.
    pub fn dedup(&self, messages: Vec<Message>) -> (Vec<Message>, usize) {
        let hashes: Vec<u64> = messages.iter().map(|m| content_hash(&m.content)).collect();

        let mut best: HashMap<u64, usize> = HashMap::with_capacity(messages.len());
        for (index, hash) in hashes.iter().enumerate() {
            let replace = match best.get(hash) {
                Some(&kept) => messages[index].importance > messages[kept].importance,
                None => true,
            };
            if replace {
                best.insert(*hash, index);
            }
        }

        let before = messages.len();
        let survivors: Vec<Message> = messages
            .into_iter()
            .zip(hashes)
            .enumerate()
            .filter(|(index, (_, hash))| best.get(hash) == Some(index))
            .map(|(_, (mut message, hash))| {
                message.content_hash = hash;
                message
            })
            .collect();

        let removed = before - survivors.len();
        if removed > 0 {
            log::info!("Removed {} duplicate messages", removed);
        }
        (survivors, removed)
    }
}

/// Number of messages whose normalised body already appeared earlier.
pub fn count_duplicates(messages: &[Message]) -> usize {
    let mut seen = std::collections::HashSet::with_capacity(messages.len());
    messages
        .iter()
        .filter(|m| !seen.insert(content_hash(&m.content)))
        .count()
}
