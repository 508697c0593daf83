//! Approximate token estimation.
//!
//! Estimates are used for pre-call sizing and for the post-compaction
//! validation check. Overflow decisions use the real [`TokenUsage`] reported
//! by the model call, never these numbers.
//!
//! [`TokenUsage`]: crate::types::TokenUsage

use crate::types::{ContentPart, Message, MessageContent};

/// Chars-per-token heuristic divisor.
pub const CHARS_PER_TOKEN: u32 = 4;

/// Fixed cost for an image of unknown byte size.
pub const DEFAULT_IMAGE_TOKENS: u32 = 1_000;

/// Bytes-per-token heuristic for images of known size.
pub const IMAGE_BYTES_PER_TOKEN: u64 = 750;

/// Per-message structural overhead (role, framing).
pub const MESSAGE_OVERHEAD: u32 = 4;

/// Heuristic token counting, pluggable per provider family.
pub trait TokenEstimator: Send + Sync {
    /// Estimate tokens for a piece of text. Never fails; empty input is 0.
    fn count_tokens(&self, text: &str) -> u32;

    /// Estimate tokens for an image. Unknown size gets a fixed conservative
    /// cost.
    fn estimate_image_tokens(&self, byte_size: Option<u64>) -> u32;
}

/// chars/4 heuristic, rounded up. Over-counting is the safe direction: it
/// triggers compaction earlier rather than later.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl TokenEstimator for HeuristicEstimator {
    fn count_tokens(&self, text: &str) -> u32 {
        (text.len() as u32).div_ceil(CHARS_PER_TOKEN)
    }

    fn estimate_image_tokens(&self, byte_size: Option<u64>) -> u32 {
        match byte_size {
            Some(bytes) => bytes.div_ceil(IMAGE_BYTES_PER_TOKEN) as u32,
            None => DEFAULT_IMAGE_TOKENS,
        }
    }
}

/// Estimate tokens for one message, structural overhead included.
pub fn estimate_message(estimator: &dyn TokenEstimator, message: &Message) -> u32 {
    let content = match &message.content {
        MessageContent::Text(text) => estimator.count_tokens(text),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => estimator.count_tokens(text),
                ContentPart::Image { byte_size } => estimator.estimate_image_tokens(*byte_size),
            })
            .sum(),
    };
    content + MESSAGE_OVERHEAD
}

/// Estimate tokens for a whole history.
pub fn estimate_history(estimator: &dyn TokenEstimator, messages: &[Message]) -> u32 {
    messages
        .iter()
        .map(|m| estimate_message(estimator, m))
        .sum()
}
