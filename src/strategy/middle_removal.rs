use std::ops::Range;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::CompactionConfig;
use crate::error::{CompactError, ConfigError};
use crate::types::{CompactionSettings, Message};

use super::CompactionStrategy;

pub const DEFAULT_PRESERVE_START: usize = 2;
pub const DEFAULT_PRESERVE_END: usize = 10;
pub const DEFAULT_MIN_REMOVAL: usize = 3;

/// Synchronous fallback compaction: drop the middle of the conversation,
/// keep the head (usually the opening instructions) and the recent tail.
/// Cheap and model-free, at the cost of losing the dropped content outright.
pub struct MiddleRemovalStrategy {
    settings: CompactionSettings,
    preserve_start: usize,
    preserve_end: usize,
    min_removal: usize,
}

impl MiddleRemovalStrategy {
    pub fn from_config(config: &CompactionConfig) -> Result<Self, ConfigError> {
        config.validate_common()?;
        if config.min_removal == 0 {
            return Err(ConfigError::InvalidField {
                field: "min_removal",
                reason: "must be at least 1".into(),
            });
        }
        Ok(Self {
            settings: config.settings(),
            preserve_start: config.preserve_start,
            preserve_end: config.preserve_end,
            min_removal: config.min_removal,
        })
    }

    /// The middle span to drop, if the history is long enough to be worth
    /// it. Histories at or below `preserve_start + preserve_end +
    /// min_removal` are left alone.
    fn removal_span(&self, len: usize) -> Option<Range<usize>> {
        if len <= self.preserve_start + self.preserve_end + self.min_removal {
            return None;
        }
        let to_remove = len - self.preserve_start - self.preserve_end;
        if to_remove < self.min_removal {
            return None;
        }
        Some(self.preserve_start..len - self.preserve_end)
    }
}

#[async_trait]
impl CompactionStrategy for MiddleRemovalStrategy {
    fn name(&self) -> &'static str {
        "middle-removal"
    }

    fn settings(&self) -> &CompactionSettings {
        &self.settings
    }

    fn compaction_span(&self, history: &[Message]) -> Option<Range<usize>> {
        self.removal_span(history.len())
    }

    async fn compact(
        &self,
        history: &[Message],
        _cancel: &CancellationToken,
    ) -> Result<Vec<Message>, CompactError> {
        let Some(span) = self.removal_span(history.len()) else {
            return Ok(Vec::new());
        };
        let removed = span.len();
        let marker = Message::system(format!(
            "[{removed} earlier messages removed to stay within the context window]"
        ))
        .as_summary(removed);
        Ok(vec![marker])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{estimate_history, HeuristicEstimator};
    use crate::types::Role;

    fn strategy() -> MiddleRemovalStrategy {
        MiddleRemovalStrategy::from_config(&CompactionConfig::new("middle-removal")).unwrap()
    }

    fn history_of(len: usize) -> Vec<Message> {
        (0..len)
            .map(|i| Message::user(format!("message number {i} with some padding text")))
            .collect()
    }

    #[tokio::test]
    async fn short_history_is_a_no_op() {
        let strategy = strategy();
        // exactly preserve_start + preserve_end + min_removal
        let history = history_of(15);
        assert!(strategy.compaction_span(&history).is_none());
        let replacement = strategy
            .compact(&history, &CancellationToken::new())
            .await
            .unwrap();
        assert!(replacement.is_empty());
    }

    #[tokio::test]
    async fn long_history_yields_one_marker_for_the_middle() {
        let strategy = strategy();
        let history = history_of(20);

        let span = strategy.compaction_span(&history).unwrap();
        assert_eq!(span, 2..10);

        let replacement = strategy
            .compact(&history, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(replacement.len(), 1);
        let marker = &replacement[0];
        assert_eq!(marker.role, Role::System);
        assert!(marker.is_summary());
        assert_eq!(marker.metadata.original_message_count, Some(8));
        assert!(marker.text().contains("8 earlier messages removed"));
    }

    #[tokio::test]
    async fn splicing_the_marker_reduces_estimated_tokens() {
        let strategy = strategy();
        let history = history_of(40);
        let span = strategy.compaction_span(&history).unwrap();
        let replacement = strategy
            .compact(&history, &CancellationToken::new())
            .await
            .unwrap();

        let mut spliced = history[..span.start].to_vec();
        spliced.extend(replacement);
        spliced.extend_from_slice(&history[span.end..]);

        let est = HeuristicEstimator;
        assert!(estimate_history(&est, &spliced) < estimate_history(&est, &history));
        assert_eq!(spliced.len(), 40 - span.len() + 1);
    }

    #[test]
    fn zero_min_removal_is_rejected() {
        let mut config = CompactionConfig::new("middle-removal");
        config.min_removal = 0;
        assert!(matches!(
            MiddleRemovalStrategy::from_config(&config),
            Err(ConfigError::InvalidField {
                field: "min_removal",
                ..
            })
        ));
    }
}
