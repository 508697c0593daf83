//! Compaction configuration.
//!
//! Deserialized from external config once at startup and validated by the
//! factory before any strategy is constructed. One flat struct covers every
//! strategy kind; each kind reads the fields it cares about.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::CompactionSettings;

pub const DEFAULT_THRESHOLD_PERCENT: f64 = 1.0;
pub const MIN_THRESHOLD_PERCENT: f64 = 0.1;

/// Configuration for one compaction strategy instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Strategy identifier, resolved against the registry.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// When false the factory yields no strategy at all and the pipeline
    /// skips compaction entirely.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Optional cap on the effective window, below the model's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<u32>,
    /// Fraction of usable tokens that triggers compaction.
    #[serde(default = "default_threshold")]
    pub threshold_percent: f64,

    // middle-removal
    #[serde(default = "default_preserve_start")]
    pub preserve_start: usize,
    #[serde(default = "default_preserve_end")]
    pub preserve_end: usize,
    #[serde(default = "default_min_removal")]
    pub min_removal: usize,

    // reactive-overflow
    #[serde(default = "default_preserve_last_n_turns")]
    pub preserve_last_n_turns: usize,
    #[serde(default = "default_max_summary_tokens")]
    pub max_summary_tokens: u32,
    /// Custom summarization prompt; must contain the `{conversation}`
    /// placeholder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_prompt: Option<String>,
}

fn default_kind() -> String {
    "noop".to_string()
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD_PERCENT
}

fn default_preserve_start() -> usize {
    2
}

fn default_preserve_end() -> usize {
    10
}

fn default_min_removal() -> usize {
    3
}

fn default_preserve_last_n_turns() -> usize {
    2
}

fn default_max_summary_tokens() -> u32 {
    2_000
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            kind: default_kind(),
            enabled: true,
            max_context_tokens: None,
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            preserve_start: default_preserve_start(),
            preserve_end: default_preserve_end(),
            min_removal: default_min_removal(),
            preserve_last_n_turns: default_preserve_last_n_turns(),
            max_summary_tokens: default_max_summary_tokens(),
            summary_prompt: None,
        }
    }
}

impl CompactionConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_threshold_percent(mut self, threshold: f64) -> Self {
        self.threshold_percent = threshold;
        self
    }

    pub fn with_max_context_tokens(mut self, tokens: u32) -> Self {
        self.max_context_tokens = Some(tokens);
        self
    }

    pub fn with_summary_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.summary_prompt = Some(prompt.into());
        self
    }

    /// The settings every strategy kind shares.
    pub fn settings(&self) -> CompactionSettings {
        CompactionSettings {
            enabled: self.enabled,
            max_context_tokens: self.max_context_tokens,
            threshold_percent: self.threshold_percent,
        }
    }

    /// Validation common to all strategy kinds. Strategy constructors layer
    /// their own checks on top.
    pub fn validate_common(&self) -> Result<(), ConfigError> {
        if !(MIN_THRESHOLD_PERCENT..=1.0).contains(&self.threshold_percent) {
            return Err(ConfigError::InvalidField {
                field: "threshold_percent",
                reason: format!(
                    "must be between {MIN_THRESHOLD_PERCENT} and 1.0, got {}",
                    self.threshold_percent
                ),
            });
        }
        if self.max_context_tokens == Some(0) {
            return Err(ConfigError::InvalidField {
                field: "max_context_tokens",
                reason: "must be greater than zero when set".into(),
            });
        }
        Ok(())
    }
}
