//! Inbound message coalescing.
//!
//! User input can arrive while a turn is in flight. It is buffered here and
//! merged into a single user message at the next turn boundary, so the model
//! sees one coherent prompt instead of a burst of fragments. This is not a
//! compaction mechanism; it just feeds the same history compaction later
//! operates on.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::types::{ContentPart, Message};

/// One buffered user submission.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub parts: Vec<ContentPart>,
    pub queued_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(parts: Vec<ContentPart>) -> Self {
        Self {
            parts,
            queued_at: Utc::now(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(vec![ContentPart::text(text)])
    }
}

/// Everything queued during one in-flight turn, merged.
#[derive(Debug, Clone, PartialEq)]
pub struct CoalescedMessage {
    pub parts: Vec<ContentPart>,
    /// How many queued submissions went into the merge.
    pub merged_count: usize,
}

impl CoalescedMessage {
    pub fn into_message(self) -> Message {
        Message::user_parts(self.parts)
    }
}

/// Arrival-ordered buffer shared between the input side and the turn loop.
/// The queue is the only internally synchronized structure in the crate; the
/// rest relies on the single-turn-per-session contract.
#[derive(Debug, Default)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<QueuedMessage>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedMessage>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn push(&self, message: QueuedMessage) {
        self.lock().push_back(message);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain everything queued so far into one message. Text parts merge
    /// into a single leading text part separated by blank lines; non-text
    /// parts follow in arrival order.
    pub fn drain(&self) -> Option<CoalescedMessage> {
        let entries: Vec<QueuedMessage> = {
            let mut queue = self.lock();
            if queue.is_empty() {
                return None;
            }
            queue.drain(..).collect()
        };

        let merged_count = entries.len();
        let mut texts: Vec<String> = Vec::new();
        let mut others: Vec<ContentPart> = Vec::new();
        for entry in entries {
            for part in entry.parts {
                match part {
                    ContentPart::Text { text } => texts.push(text),
                    other => others.push(other),
                }
            }
        }

        let mut parts = Vec::with_capacity(1 + others.len());
        if !texts.is_empty() {
            parts.push(ContentPart::text(texts.join("\n\n")));
        }
        parts.extend(others);

        Some(CoalescedMessage {
            parts,
            merged_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn empty_queue_drains_to_none() {
        let queue = MessageQueue::new();
        assert!(queue.is_empty());
        assert!(queue.drain().is_none());
    }

    #[test]
    fn single_message_passes_through() {
        let queue = MessageQueue::new();
        queue.push(QueuedMessage::text("hello"));
        let merged = queue.drain().unwrap();
        assert_eq!(merged.merged_count, 1);
        assert_eq!(merged.parts, vec![ContentPart::text("hello")]);
        assert!(queue.is_empty());
    }

    #[test]
    fn coalescing_preserves_arrival_order() {
        let queue = MessageQueue::new();
        queue.push(QueuedMessage::text("first"));
        queue.push(QueuedMessage::new(vec![
            ContentPart::text("second"),
            ContentPart::image(Some(100)),
        ]));
        queue.push(QueuedMessage::new(vec![ContentPart::image(Some(200))]));
        queue.push(QueuedMessage::text("third"));

        let merged = queue.drain().unwrap();
        assert_eq!(merged.merged_count, 4);
        assert_eq!(
            merged.parts,
            vec![
                ContentPart::text("first\n\nsecond\n\nthird"),
                ContentPart::image(Some(100)),
                ContentPart::image(Some(200)),
            ]
        );
    }

    #[test]
    fn coalesced_message_is_a_single_user_message() {
        let queue = MessageQueue::new();
        queue.push(QueuedMessage::text("a"));
        queue.push(QueuedMessage::text("b"));
        let message = queue.drain().unwrap().into_message();
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text(), "a\n\nb");
    }

    #[test]
    fn drain_empties_the_queue_for_the_next_turn() {
        let queue = MessageQueue::new();
        queue.push(QueuedMessage::text("turn one"));
        assert_eq!(queue.len(), 1);
        queue.drain().unwrap();
        assert!(queue.drain().is_none());

        queue.push(QueuedMessage::text("turn two"));
        let merged = queue.drain().unwrap();
        assert_eq!(merged.merged_count, 1);
        assert_eq!(merged.parts, vec![ContentPart::text("turn two")]);
    }
}
