use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::CompactionConfig;
use crate::error::{CompactError, ConfigError};
use crate::provider::TextGenerator;
use crate::types::{CompactionSettings, Message, Role};

use super::{CompactionStrategy, StrategyContext};

pub const DEFAULT_PRESERVE_LAST_N_TURNS: usize = 2;
pub const DEFAULT_MAX_SUMMARY_TOKENS: u32 = 2_000;

/// Placeholder a custom summary prompt must contain.
pub const CONVERSATION_PLACEHOLDER: &str = "{conversation}";

/// Tool results are clipped to this many characters in the transcript sent
/// to the summarizer. The real messages are untouched.
const TRANSCRIPT_TOOL_RESULT_LIMIT: usize = 500;

const DEFAULT_SUMMARY_PROMPT: &str = "\
Summarize the conversation below. The summary will replace the original \
messages in an ongoing session, so preserve everything needed to continue \
the work without re-reading them:

1. **Task and current state**: what was asked, what has been accomplished
2. **Key technical context**: files, identifiers, decisions and their reasons
3. **Errors and resolutions**: what went wrong, how it was fixed
4. **Pending work**: what still needs to happen

Be concise but complete. Omit pleasantries and meta-discussion.

Conversation:
{conversation}";

const SUMMARIZER_SYSTEM_PROMPT: &str = "\
You compress conversation history for an AI agent. Accuracy over style: \
never invent details that are not in the conversation.";

/// Summarizes the old part of the conversation with a nested model call,
/// keeping the last N whole turns verbatim. The only strategy that performs
/// I/O; its failures propagate instead of degrading to a silent no-op.
pub struct ReactiveOverflowStrategy {
    settings: CompactionSettings,
    preserve_last_n_turns: usize,
    max_summary_tokens: u32,
    summary_prompt: String,
    generator: Arc<dyn TextGenerator>,
}

impl ReactiveOverflowStrategy {
    pub fn from_config(
        config: &CompactionConfig,
        ctx: &StrategyContext,
    ) -> Result<Self, ConfigError> {
        config.validate_common()?;
        if config.preserve_last_n_turns == 0 {
            return Err(ConfigError::InvalidField {
                field: "preserve_last_n_turns",
                reason: "must be at least 1".into(),
            });
        }
        if config.max_summary_tokens == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_summary_tokens",
                reason: "must be greater than zero".into(),
            });
        }
        let summary_prompt = config
            .summary_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SUMMARY_PROMPT.to_string());
        if !summary_prompt.contains(CONVERSATION_PLACEHOLDER) {
            return Err(ConfigError::InvalidField {
                field: "summary_prompt",
                reason: format!("must contain the {CONVERSATION_PLACEHOLDER} placeholder"),
            });
        }
        let generator = ctx
            .generator
            .clone()
            .ok_or(ConfigError::MissingCapability {
                strategy: "reactive-overflow".into(),
                capability: "text-generation",
            })?;
        Ok(Self {
            settings: config.settings(),
            preserve_last_n_turns: config.preserve_last_n_turns,
            max_summary_tokens: config.max_summary_tokens,
            summary_prompt,
            generator,
        })
    }

    /// Partition the history by walking backward from the end, keeping whole
    /// turns (a turn starts at a user message) until the preserve count is
    /// satisfied. Leading system messages stay in place and are never
    /// summarized.
    fn summarize_span(&self, history: &[Message]) -> Option<Range<usize>> {
        let head = history.iter().take_while(|m| m.role == Role::System).count();

        let mut turns = 0;
        let mut cut = history.len();
        for index in (head..history.len()).rev() {
            if history[index].role == Role::User {
                turns += 1;
                cut = index;
                if turns == self.preserve_last_n_turns {
                    break;
                }
            }
        }
        if turns < self.preserve_last_n_turns || cut <= head {
            return None;
        }
        Some(head..cut)
    }
}

/// Role-labeled flattening of the span for the summarizer.
fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let text = message.text();
        match message.role {
            Role::System => {
                out.push_str("System: ");
                out.push_str(&text);
            }
            Role::User => {
                out.push_str("User: ");
                out.push_str(&text);
            }
            Role::Assistant => {
                out.push_str("Assistant: ");
                out.push_str(&text);
            }
            Role::Tool => {
                out.push_str("Tool result: ");
                if text.chars().count() > TRANSCRIPT_TOOL_RESULT_LIMIT {
                    let clipped: String =
                        text.chars().take(TRANSCRIPT_TOOL_RESULT_LIMIT).collect();
                    out.push_str(&clipped);
                    out.push_str(" [clipped]");
                } else {
                    out.push_str(&text);
                }
            }
        }
        out.push('\n');
    }
    out
}

#[async_trait]
impl CompactionStrategy for ReactiveOverflowStrategy {
    fn name(&self) -> &'static str {
        "reactive-overflow"
    }

    fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    fn compaction_span(&self, history: &[Message]) -> Option<Range<usize>> {
        self.summarize_span(history)
    }

    async fn compact(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, CompactError> {
        let Some(span) = self.summarize_span(history) else {
            return Ok(Vec::new());
        };
        let to_summarize = &history[span];
        let transcript = render_transcript(to_summarize);
        let prompt = self
            .summary_prompt
            .replace(CONVERSATION_PLACEHOLDER, &transcript);

        debug!(
            messages = to_summarize.len(),
            prompt_len = prompt.len(),
            "requesting conversation summary"
        );

        let summary_text = tokio::select! {
            result = self.generator.generate(
                SUMMARIZER_SYSTEM_PROMPT,
                &prompt,
                self.max_summary_tokens,
            ) => result?,
            _ = cancel.cancelled() => return Err(CompactError::Cancelled),
        };

        let mut summary =
            Message::assistant(format!("[Conversation summary]\n\n{}", summary_text.trim()))
                .as_summary(to_summarize.len());
        summary.metadata.is_recompaction = to_summarize.iter().any(Message::is_summary);

        Ok(vec![summary])
    }
}
