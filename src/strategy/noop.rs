use std::ops::Range;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::CompactionConfig;
use crate::error::{CompactError, ConfigError};
use crate::types::{CompactionSettings, Message, ModelLimits};

use super::CompactionStrategy;

/// Never compacts. Exists so a pipeline configured without compaction still
/// holds a strategy object instead of branching on absence everywhere.
pub struct NoopStrategy {
    settings: CompactionSettings,
}

impl NoopStrategy {
    pub fn new(settings: CompactionSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &CompactionConfig) -> Result<Self, ConfigError> {
        config.validate_common()?;
        Ok(Self::new(config.settings()))
    }
}

#[async_trait]
impl CompactionStrategy for NoopStrategy {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    fn should_compact(&self, _input_tokens: u32, _limits: &ModelLimits) -> bool {
        false
    }

    fn compaction_span(&self, _history: &[Message]) -> Option<Range<usize>> {
        None
    }

    async fn compact(
        &self,
        _history: &[Message],
        _cancel: &CancellationToken,
    ) -> Result<Vec<Message>, CompactError> {
        Ok(Vec::new())
    }
}
