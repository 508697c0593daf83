//! Tool-output size control.
//!
//! Two separate paths. Truncation clamps a fresh tool output before it is
//! appended to history, so oversized content never lands in the first place.
//! Pruning rewrites old tool outputs already in durable history down to a
//! placeholder, keeping the message itself so tool-call pairing stays valid.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{Message, MessageContent};

/// Character and line caps for one tool's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutputLimits {
    pub max_chars: usize,
    pub max_lines: usize,
}

impl Default for ToolOutputLimits {
    fn default() -> Self {
        Self {
            max_chars: 30_000,
            max_lines: 1_000,
        }
    }
}

/// Default caps plus per-tool overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOutputConfig {
    #[serde(default)]
    pub defaults: ToolOutputLimits,
    #[serde(default)]
    pub overrides: HashMap<String, ToolOutputLimits>,
}

impl ToolOutputConfig {
    pub fn with_override(mut self, tool_name: impl Into<String>, limits: ToolOutputLimits) -> Self {
        self.overrides.insert(tool_name.into(), limits);
        self
    }

    pub fn limits_for(&self, tool_name: &str) -> ToolOutputLimits {
        self.overrides
            .get(tool_name)
            .copied()
            .unwrap_or(self.defaults)
    }
}

/// Result of a truncation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TruncatedOutput {
    pub content: String,
    pub truncated: bool,
    /// Byte length of the input before clamping.
    pub original_size: usize,
}

impl TruncatedOutput {
    fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            truncated: false,
            original_size: content.len(),
        }
    }
}

/// Clamp by line count only.
pub fn truncate_by_lines(content: &str, max_lines: usize) -> TruncatedOutput {
    let total_lines = content.lines().count();
    if total_lines <= max_lines {
        return TruncatedOutput::unchanged(content);
    }
    let kept = content.lines().take(max_lines).collect::<Vec<_>>().join("\n");
    let omitted = total_lines - max_lines;
    TruncatedOutput {
        content: format!("{kept}\n... {omitted} more lines truncated ..."),
        truncated: true,
        original_size: content.len(),
    }
}

/// Clamp by both caps, whichever is hit first. Truncation is never silent: a
/// clamped output always ends with an explicit marker.
pub fn truncate_tool_output(content: &str, limits: &ToolOutputLimits) -> TruncatedOutput {
    let total_chars = content.chars().count();
    let total_lines = content.lines().count();
    if total_chars <= limits.max_chars && total_lines <= limits.max_lines {
        return TruncatedOutput::unchanged(content);
    }

    let mut kept = content
        .lines()
        .take(limits.max_lines)
        .collect::<Vec<_>>()
        .join("\n");
    if kept.chars().count() > limits.max_chars {
        kept = kept.chars().take(limits.max_chars).collect();
    }

    let lines_omitted = total_lines.saturating_sub(kept.lines().count());
    let marker = if lines_omitted > 0 {
        format!("\n... {lines_omitted} more lines truncated ...")
    } else {
        // the character cap cut inside the final kept line
        let chars_omitted = total_chars - kept.chars().count();
        format!("\n... {chars_omitted} more characters truncated ...")
    };

    TruncatedOutput {
        content: kept + &marker,
        truncated: true,
        original_size: content.len(),
    }
}

/// Clamp a tool-result message before it is appended to history. Records the
/// pre-clamp size in metadata so later pruning reports the true original.
pub fn truncate_tool_result(message: &Message, limits: &ToolOutputLimits) -> Message {
    let MessageContent::Text(text) = &message.content else {
        return message.clone();
    };
    let output = truncate_tool_output(text, limits);
    if !output.truncated {
        return message.clone();
    }
    debug!(
        tool_call_id = message.tool_call_id.as_deref().unwrap_or(""),
        original_size = output.original_size,
        clamped_size = output.content.len(),
        "tool output truncated"
    );
    let mut clamped = message.clone();
    clamped.content = MessageContent::Text(output.content);
    clamped.metadata.truncated = true;
    clamped.metadata.original_size.get_or_insert(output.original_size);
    clamped
}

/// Deterministic stand-in for a pruned tool output.
pub fn compacted_placeholder(original_size: usize) -> String {
    format!("[tool output pruned: {original_size} bytes]")
}

/// Has this tool output already been pruned?
pub fn is_compacted(message: &Message) -> bool {
    message.metadata.compacted
}

/// Pruning options. `keep_recent` tool results at the tail stay intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneOptions {
    pub keep_recent: usize,
}

impl Default for PruneOptions {
    fn default() -> Self {
        Self { keep_recent: 3 }
    }
}

/// Result of a pruning pass.
#[derive(Debug, Clone)]
pub struct PruneOutcome {
    pub history: Vec<Message>,
    pub pruned_count: usize,
}

/// Replace old tool outputs with placeholders, keeping the messages in place.
/// Already-pruned outputs are skipped, which makes the pass idempotent, and
/// outputs no bigger than their placeholder are left alone.
pub fn prune_old_tool_outputs(mut history: Vec<Message>, options: &PruneOptions) -> PruneOutcome {
    let tool_indexes: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| m.is_tool_result())
        .map(|(i, _)| i)
        .collect();
    let prunable = tool_indexes.len().saturating_sub(options.keep_recent);

    let mut pruned_count = 0;
    for &index in &tool_indexes[..prunable] {
        let message = &mut history[index];
        if is_compacted(message) {
            continue;
        }
        let size = message
            .metadata
            .original_size
            .unwrap_or_else(|| message.content_len());
        let placeholder = compacted_placeholder(size);
        if message.content_len() <= placeholder.len() {
            continue;
        }
        message.content = MessageContent::Text(placeholder);
        message.metadata.compacted = true;
        message.metadata.original_size.get_or_insert(size);
        pruned_count += 1;
    }

    if pruned_count > 0 {
        debug!(pruned = pruned_count, "old tool outputs pruned");
    }
    PruneOutcome {
        history,
        pruned_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn big_output() -> String {
        "line of tool output that goes on for a while\n".repeat(50)
    }

    #[test]
    fn output_below_caps_passes_through() {
        let limits = ToolOutputLimits::default();
        let out = truncate_tool_output("short output\nwith two lines", &limits);
        assert!(!out.truncated);
        assert_eq!(out.content, "short output\nwith two lines");
    }

    #[test]
    fn line_cap_appends_a_marker() {
        let limits = ToolOutputLimits {
            max_chars: 100_000,
            max_lines: 10,
        };
        let out = truncate_tool_output(&big_output(), &limits);
        assert!(out.truncated);
        assert!(out.content.ends_with("... 40 more lines truncated ..."));
        assert_eq!(out.content.lines().count(), 11);
    }

    #[test]
    fn char_cap_on_a_single_line_reports_characters() {
        let limits = ToolOutputLimits {
            max_chars: 100,
            max_lines: 1_000,
        };
        let input = "x".repeat(250);
        let out = truncate_tool_output(&input, &limits);
        assert!(out.truncated);
        assert!(out.content.contains("... 150 more characters truncated ..."));
        assert_eq!(out.original_size, 250);
    }

    #[test]
    fn truncate_by_lines_matches_the_line_path() {
        let out = truncate_by_lines(&big_output(), 5);
        assert!(out.truncated);
        assert!(out.content.ends_with("... 45 more lines truncated ..."));
    }

    #[test]
    fn truncating_a_tool_result_records_metadata() {
        let limits = ToolOutputLimits {
            max_chars: 50,
            max_lines: 2,
        };
        let message = Message::tool_result("call_1", big_output());
        let clamped = truncate_tool_result(&message, &limits);
        assert!(clamped.metadata.truncated);
        assert_eq!(clamped.metadata.original_size, Some(big_output().len()));
        assert_eq!(clamped.tool_call_id.as_deref(), Some("call_1"));
        assert!(clamped.text().contains("more lines truncated"));

        let small = Message::tool_result("call_2", "ok");
        let untouched = truncate_tool_result(&small, &limits);
        assert!(!untouched.metadata.truncated);
        assert_eq!(untouched, small);
    }

    #[test]
    fn per_tool_overrides_win_over_defaults() {
        let config = ToolOutputConfig::default().with_override(
            "read_file",
            ToolOutputLimits {
                max_chars: 5,
                max_lines: 1,
            },
        );
        assert_eq!(config.limits_for("read_file").max_chars, 5);
        assert_eq!(
            config.limits_for("anything_else"),
            ToolOutputLimits::default()
        );
    }

    fn history_with_tool_results(n: usize) -> Vec<Message> {
        let mut history = vec![Message::user("do things")];
        for i in 0..n {
            history.push(Message::assistant(format!("calling tool {i}")));
            history.push(Message::tool_result(format!("call_{i}"), big_output()));
        }
        history
    }

    #[test]
    fn pruning_keeps_the_recent_tail_intact() {
        let history = history_with_tool_results(5);
        let outcome = prune_old_tool_outputs(history, &PruneOptions { keep_recent: 3 });
        assert_eq!(outcome.pruned_count, 2);

        let tool_results: Vec<&Message> = outcome
            .history
            .iter()
            .filter(|m| m.is_tool_result())
            .collect();
        assert!(is_compacted(tool_results[0]));
        assert!(is_compacted(tool_results[1]));
        assert!(!is_compacted(tool_results[2]));
        assert!(!is_compacted(tool_results[4]));

        // structure survives: role and call id are still there
        assert_eq!(tool_results[0].role, Role::Tool);
        assert_eq!(tool_results[0].tool_call_id.as_deref(), Some("call_0"));
        assert_eq!(
            tool_results[0].text(),
            compacted_placeholder(big_output().len())
        );
    }

    #[test]
    fn pruning_twice_equals_pruning_once() {
        let history = history_with_tool_results(6);
        let options = PruneOptions { keep_recent: 2 };
        let once = prune_old_tool_outputs(history, &options);
        assert_eq!(once.pruned_count, 4);
        let again = prune_old_tool_outputs(once.history.clone(), &options);
        assert_eq!(again.pruned_count, 0);
        assert_eq!(again.history, once.history);
    }

    #[test]
    fn tiny_outputs_are_not_worth_pruning() {
        let history = vec![
            Message::tool_result("call_0", "ok"),
            Message::tool_result("call_1", big_output()),
            Message::tool_result("call_2", big_output()),
        ];
        let outcome = prune_old_tool_outputs(history, &PruneOptions { keep_recent: 1 });
        assert_eq!(outcome.pruned_count, 1);
        assert_eq!(outcome.history[0].text(), "ok");
        assert!(!is_compacted(&outcome.history[0]));
    }

    #[test]
    fn pruned_size_reports_the_pre_truncation_original() {
        let limits = ToolOutputLimits {
            max_chars: 120,
            max_lines: 2,
        };
        let raw = Message::tool_result("call_0", big_output());
        let clamped = truncate_tool_result(&raw, &limits);
        let history = vec![
            clamped,
            Message::tool_result("call_1", big_output()),
            Message::tool_result("call_2", big_output()),
        ];
        let outcome = prune_old_tool_outputs(history, &PruneOptions { keep_recent: 2 });
        assert_eq!(outcome.pruned_count, 1);
        assert_eq!(
            outcome.history[0].text(),
            compacted_placeholder(big_output().len())
        );
    }
}
