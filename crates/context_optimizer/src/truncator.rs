//! Hard budget enforcement by greedy selection.

use chat_core::{transcript_bytes, Message};

/// Keeps the most important messages that fit in `max_bytes`, then restores
/// transcript order. Selection order never leaks into the output.
#[derive(Debug, Clone, Copy)]
pub struct Truncator {
    max_bytes: usize,
}

impl Truncator {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    /// Returns the kept messages and how many were dropped. A transcript
    /// already within budget comes back untouched.
    pub fn truncate(&self, messages: Vec<Message>) -> (Vec<Message>, usize) {
        if transcript_bytes(&messages) <= self.max_bytes {
            return (messages, 0);
        }

        // Highest importance first; on ties the more recent message wins.
        let mut order: Vec<usize> = (0..messages.len()).collect();
        order.sort_by(|&a, &b| {
            messages[b]
                .importance
                .total_cmp(&messages[a].importance)
                .then(b.cmp(&a))
        });

        let mut keep = vec![false; messages.len()];
        let mut used = 0usize;
        for index in order {
            let size = messages[index].len();
            if used + size <= self.max_bytes {
                keep[index] = true;
                used += size;
            }
        }

        let before = messages.len();
        let kept: Vec<Message> = messages
            .into_iter()
            .zip(keep)
            .filter_map(|(message, keep)| keep.then_some(message))
            .collect();

        let removed = before - kept.len();
        if removed > 0 {
            log::warn!(
                "Removed {} least important messages to fit the {} byte budget",
                removed,
                self.max_bytes
            );
        }
        (kept, removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(content: &str, importance: f64) -> Message {
        let mut msg = Message::user(content);
        msg.importance = importance;
        msg
    }

    #[test]
    fn within_budget_is_untouched() {
        let messages = vec![scored("aaaa", 0.1), scored("bbbb", 0.9)];
        let (out, removed) = Truncator::new(8).truncate(messages.clone());
        assert_eq!(removed, 0);
        assert_eq!(out, messages);
    }

    #[test]
    fn keeps_important_messages_in_original_order() {
        let messages = vec![
            scored("first-10ch", 0.9),
            scored("second-10c", 0.1),
            scored("third-10ch", 0.5),
            scored("fourth-10c", 0.8),
        ];
        let (out, removed) = Truncator::new(30).truncate(messages);
        assert_eq!(removed, 1);
        let contents: Vec<_> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first-10ch", "third-10ch", "fourth-10c"]);
    }

    #[test]
    fn skips_oversized_message_and_keeps_filling() {
        let messages = vec![
            scored(&"x".repeat(50), 1.0),
            scored("small", 0.2),
            scored("tiny", 0.1),
        ];
        let (out, removed) = Truncator::new(20).truncate(messages);
        assert_eq!(removed, 1);
        assert_eq!(out.len(), 2);
        assert!(transcript_bytes(&out) <= 20);
    }

    #[test]
    fn equal_scores_prefer_recent() {
        let messages = vec![scored("old-msg", 0.5), scored("new-msg", 0.5)];
        let (out, _) = Truncator::new(10).truncate(messages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].content, "new-msg");
    }
}
