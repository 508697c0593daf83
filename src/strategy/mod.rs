//! Compaction strategies.
//!
//! Flat trait implementations behind dynamic dispatch. A strategy decides
//! whether the history needs compacting and produces the replacement for one
//! contiguous span; the session splices and persists the result.

pub mod middle_removal;
pub mod noop;
pub mod reactive_overflow;
pub mod registry;

use std::ops::Range;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::CompactError;
use crate::overflow;
use crate::provider::TextGenerator;
use crate::types::{CompactionSettings, Message, ModelLimits};

pub use middle_removal::MiddleRemovalStrategy;
pub use noop::NoopStrategy;
pub use reactive_overflow::ReactiveOverflowStrategy;
pub use registry::{create_compaction_strategy, StrategyRegistry};

/// Per-session runtime context the factory binds strategies to.
#[derive(Clone, Default)]
pub struct StrategyContext {
    /// Text-generation capability, required by summarizing strategies.
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub session_id: Option<String>,
}

impl StrategyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// One way of shrinking a history.
///
/// `compact` returns only the messages that replace the span reported by
/// `compaction_span`; an empty result means nothing to compact and is always
/// a safe no-op. The per-call context is the enclosing turn's cancellation
/// token; everything else a strategy needs is bound at construction.
#[async_trait]
pub trait CompactionStrategy: Send + Sync {
    /// Stable identifier used in logs and registry lookups.
    fn name(&self) -> &'static str;

    fn settings(&self) -> &CompactionSettings;

    /// Model limits with the configured context cap applied.
    fn model_limits(&self, model: &ModelLimits) -> ModelLimits {
        match self.settings().max_context_tokens {
            Some(cap) => ModelLimits {
                context_window: model.context_window.min(cap),
                max_output: model.max_output,
            },
            None => *model,
        }
    }

    /// Should a compaction pass run for this input-token count?
    fn should_compact(&self, input_tokens: u32, limits: &ModelLimits) -> bool {
        let settings = self.settings();
        settings.enabled && overflow::is_overflow(input_tokens, limits, settings.threshold_percent)
    }

    /// The contiguous span `compact` would replace, so the caller can splice
    /// without re-deriving strategy internals. `None` means nothing to do.
    fn compaction_span(&self, history: &[Message]) -> Option<Range<usize>>;

    async fn compact(
        &self,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>, CompactError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompactionConfig;

    #[test]
    fn max_context_tokens_caps_the_window() {
        let config = CompactionConfig::new("noop").with_max_context_tokens(50_000);
        let strategy = NoopStrategy::from_config(&config).unwrap();
        let capped = strategy.model_limits(&ModelLimits::new(200_000, 8_000));
        assert_eq!(capped.context_window, 50_000);
        assert_eq!(capped.max_output, 8_000);

        // a cap above the model window changes nothing
        let config = CompactionConfig::new("noop").with_max_context_tokens(500_000);
        let strategy = NoopStrategy::from_config(&config).unwrap();
        let limits = strategy.model_limits(&ModelLimits::new(200_000, 8_000));
        assert_eq!(limits.context_window, 200_000);
    }

    #[test]
    fn should_compact_respects_enabled_and_threshold() {
        let config = CompactionConfig::new("middle-removal").with_threshold_percent(0.9);
        let strategy = MiddleRemovalStrategy::from_config(&config).unwrap();
        let limits = ModelLimits::new(100_000, 20_000);
        assert!(!strategy.should_compact(75_600, &limits));
        assert!(strategy.should_compact(75_601, &limits));

        let config = CompactionConfig::new("middle-removal")
            .with_threshold_percent(0.9)
            .disabled();
        let strategy = MiddleRemovalStrategy::from_config(&config).unwrap();
        assert!(!strategy.should_compact(75_601, &limits));
    }
}
