//! Overflow detection.
//!
//! Pure math over [`ModelLimits`] and real [`TokenUsage`]. A slice of the
//! window is always reserved for the model's reply, so the usable budget is
//! what remains after the output buffer.

use crate::types::{ModelLimits, TokenUsage};

/// Reserved output slice, capped so huge `max_output` values do not starve
/// the input side.
pub const DEFAULT_OUTPUT_BUFFER: u32 = 16_000;

/// Post-compaction target fraction of usable tokens. Sits below any sane
/// trigger threshold so one compaction buys headroom for several turns.
pub const DEFAULT_COMPACTION_TARGET: f64 = 0.7;

/// Tokens available for input: the context window minus the output buffer.
/// The buffer clamp applies before subtraction, so `max_output` larger than
/// the window still yields zero rather than wrapping.
pub fn usable_tokens(limits: &ModelLimits) -> u32 {
    let output_buffer = limits.max_output.min(DEFAULT_OUTPUT_BUFFER);
    limits.context_window.saturating_sub(output_buffer)
}

/// Input-token ceiling at the given threshold fraction.
pub fn effective_limit(limits: &ModelLimits, threshold_percent: f64) -> u32 {
    (usable_tokens(limits) as f64 * threshold_percent).floor() as u32
}

/// Overflow check on a raw input-token count.
pub fn is_overflow(input_tokens: u32, limits: &ModelLimits, threshold_percent: f64) -> bool {
    input_tokens > effective_limit(limits, threshold_percent)
}

/// Will the next call overflow? Driven by the actual usage the last call
/// reported.
pub fn is_context_overflow(
    usage: &TokenUsage,
    limits: &ModelLimits,
    threshold_percent: f64,
) -> bool {
    is_overflow(usage.input_tokens, limits, threshold_percent)
}

/// Token count compaction should shrink the history to.
pub fn compaction_target(limits: &ModelLimits, target_percentage: f64) -> u32 {
    (usable_tokens(limits) as f64 * target_percentage).floor() as u32
}
