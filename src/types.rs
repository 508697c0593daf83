use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One piece of structured message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// Non-text content is carried by reference only; the byte size (when
    /// known) feeds the token estimate.
    Image {
        #[serde(skip_serializing_if = "Option::is_none")]
        byte_size: Option<u64>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(byte_size: Option<u64>) -> Self {
        Self::Image { byte_size }
    }
}

/// Message content: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// Flags the compaction machinery stamps onto messages it produced or
/// rewrote. Empty metadata serializes to nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Marks a message that replaced a compacted span.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_summary: bool,
    /// How many messages the summary replaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message_count: Option<usize>,
    /// Set when the summarized span already contained a prior summary.
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_recompaction: bool,
    /// Marks a tool output whose content was replaced by a placeholder.
    #[serde(default, skip_serializing_if = "is_false")]
    pub compacted: bool,
    /// Content bytes before truncation or pruning rewrote it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
    /// Set when the content was clamped at creation time.
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        !self.is_summary
            && !self.is_recompaction
            && !self.compacted
            && !self.truncated
            && self.original_message_count.is_none()
            && self.original_size.is_none()
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// A single history entry. Ordering within a history is significant and is
/// preserved except where compaction collapses a contiguous span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Links a tool-result message back to the call that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "MessageMetadata::is_empty")]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(role: Role, content: MessageContent) -> Self {
        Self {
            role,
            content,
            id: None,
            timestamp: Some(Utc::now()),
            tool_call_id: None,
            metadata: MessageMetadata::default(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, MessageContent::Text(text.into()))
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, MessageContent::Text(text.into()))
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::new(Role::User, MessageContent::Parts(parts))
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, MessageContent::Text(text.into()))
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, MessageContent::Text(content.into()));
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Stamp the summary contract onto this message.
    pub fn as_summary(mut self, original_message_count: usize) -> Self {
        self.metadata.is_summary = true;
        self.metadata.original_message_count = Some(original_message_count);
        self
    }

    /// All textual content, parts joined by newlines.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Byte length of the textual content.
    pub fn content_len(&self) -> usize {
        match &self.content {
            MessageContent::Text(text) => text.len(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.len(),
                    ContentPart::Image { .. } => 0,
                })
                .sum(),
        }
    }

    pub fn is_summary(&self) -> bool {
        self.metadata.is_summary
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }
}

/// Context-window geometry of the target model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLimits {
    /// Total context window in tokens.
    pub context_window: u32,
    /// Maximum tokens the model may generate in one call.
    pub max_output: u32,
}

impl ModelLimits {
    pub fn new(context_window: u32, max_output: u32) -> Self {
        Self {
            context_window,
            max_output,
        }
    }
}

/// Actual token usage reported by the last model call. Overflow decisions
/// use this, never a re-estimate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u32>,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            reasoning_tokens: None,
        }
    }

    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        if let Some(r) = other.reasoning_tokens {
            *self.reasoning_tokens.get_or_insert(0) += r;
        }
    }
}

/// Per-strategy activation settings shared by every strategy kind.
#[derive(Debug, Clone, PartialEq)]
pub struct CompactionSettings {
    pub enabled: bool,
    /// Caps the effective window below the model's own context window.
    pub max_context_tokens: Option<u32>,
    /// Fraction of usable tokens that triggers compaction.
    pub threshold_percent: f64,
}

impl Default for CompactionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_tokens: None,
            threshold_percent: 1.0,
        }
    }
}
