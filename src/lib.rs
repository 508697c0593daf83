//! Context-window budget management for the Harbor agent runtime.
//!
//! Decides when a growing conversation will overflow the model's context
//! window and shrinks it so the session can continue: overflow detection
//! from real token usage, pluggable compaction strategies (noop,
//! middle-removal, reactive summarization), tool-output truncation and
//! pruning, and the coalescing queue that feeds user input into turns.
//!
//! The crate computes the next version of a history; persistence lives
//! behind [`HistoryStore`] and the model client behind [`TextGenerator`].

pub mod config;
pub mod error;
pub mod estimator;
pub mod history;
pub mod overflow;
pub mod provider;
pub mod queue;
pub mod session;
pub mod strategy;
pub mod tool_output;
pub mod types;

pub use config::CompactionConfig;
pub use error::{CompactError, ConfigError, ContextError, GenerateError};
pub use estimator::{estimate_history, estimate_message, HeuristicEstimator, TokenEstimator};
pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
pub use overflow::{
    compaction_target, effective_limit, is_context_overflow, usable_tokens, DEFAULT_OUTPUT_BUFFER,
};
pub use provider::{AnthropicGenerator, TextGenerator};
pub use queue::{CoalescedMessage, MessageQueue, QueuedMessage};
pub use session::{CompactionOutcome, CompactionReport, ContextSession};
pub use strategy::{
    create_compaction_strategy, CompactionStrategy, MiddleRemovalStrategy, NoopStrategy,
    ReactiveOverflowStrategy, StrategyContext, StrategyRegistry,
};
pub use tool_output::{
    compacted_placeholder, is_compacted, prune_old_tool_outputs, truncate_by_lines,
    truncate_tool_output, truncate_tool_result, PruneOptions, PruneOutcome, ToolOutputConfig,
    ToolOutputLimits, TruncatedOutput,
};
pub use types::{
    CompactionSettings, ContentPart, Message, MessageContent, MessageMetadata, ModelLimits, Role,
    TokenUsage,
};
