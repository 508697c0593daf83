use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ContextError;
use crate::estimator::{estimate_history, HeuristicEstimator, TokenEstimator};
use crate::history::HistoryStore;
use crate::queue::{MessageQueue, QueuedMessage};
use crate::strategy::CompactionStrategy;
use crate::tool_output::{
    prune_old_tool_outputs, truncate_tool_result, PruneOptions, ToolOutputConfig,
};
use crate::types::{ContentPart, Message, ModelLimits, TokenUsage};

/// What a compaction attempt did to the session's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionOutcome {
    /// Nothing to do: no strategy, under threshold, or nothing to compact.
    Skipped,
    /// The replacement was spliced in and persisted.
    Applied(CompactionReport),
    /// The replacement failed the token-reduction check and was discarded.
    Rejected(CompactionReport),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub strategy: &'static str,
    pub messages_removed: usize,
    pub messages_inserted: usize,
    pub tokens_before: u32,
    pub tokens_after: u32,
}

/// Per-session coordinator. Owns the inbound queue, drives truncation,
/// compaction and pruning, and talks to the history store.
///
/// Concurrency contract: at most one turn (and therefore one compaction
/// pass) in flight per session. The queue is the only piece shared with the
/// input side and is internally synchronized; everything else relies on that
/// contract.
pub struct ContextSession {
    session_id: String,
    store: Box<dyn HistoryStore>,
    strategy: Option<Box<dyn CompactionStrategy>>,
    estimator: Box<dyn TokenEstimator>,
    model_limits: ModelLimits,
    tool_output: ToolOutputConfig,
    prune_options: PruneOptions,
    queue: MessageQueue,
}

impl ContextSession {
    pub fn new(
        session_id: impl Into<String>,
        store: impl HistoryStore + 'static,
        model_limits: ModelLimits,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            store: Box::new(store),
            strategy: None,
            estimator: Box::new(HeuristicEstimator),
            model_limits,
            tool_output: ToolOutputConfig::default(),
            prune_options: PruneOptions::default(),
            queue: MessageQueue::new(),
        }
    }

    /// Wire in the factory's output. `None` leaves compaction off.
    pub fn with_compaction(mut self, strategy: Option<Box<dyn CompactionStrategy>>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_estimator(mut self, estimator: impl TokenEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn with_tool_output(mut self, config: ToolOutputConfig) -> Self {
        self.tool_output = config;
        self
    }

    pub fn with_prune_options(mut self, options: PruneOptions) -> Self {
        self.prune_options = options;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue user input. Callable at any time, including mid-turn.
    pub fn submit(&self, parts: Vec<ContentPart>) {
        self.queue.push(QueuedMessage::new(parts));
    }

    pub fn submit_text(&self, text: impl Into<String>) {
        self.queue.push(QueuedMessage::text(text));
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Drain everything queued so far into one user message and append it.
    /// Returns `None` when nothing was queued.
    pub async fn begin_turn(&self) -> Result<Option<Message>, ContextError> {
        let Some(coalesced) = self.queue.drain() else {
            return Ok(None);
        };
        if coalesced.merged_count > 1 {
            debug!(
                merged = coalesced.merged_count,
                "coalesced queued messages into one turn"
            );
        }
        let message = coalesced.into_message();
        self.store
            .append(&self.session_id, std::slice::from_ref(&message))
            .await?;
        Ok(Some(message))
    }

    /// Append the model's reply for the turn.
    pub async fn record_response(&self, message: Message) -> Result<(), ContextError> {
        self.store
            .append(&self.session_id, std::slice::from_ref(&message))
            .await
    }

    /// Clamp a fresh tool output to the per-tool limits and append it.
    /// Truncation happens strictly before the append, so oversized content
    /// never reaches the store.
    pub async fn record_tool_result(
        &self,
        tool_name: &str,
        tool_call_id: &str,
        content: String,
    ) -> Result<Message, ContextError> {
        let limits = self.tool_output.limits_for(tool_name);
        let message = truncate_tool_result(&Message::tool_result(tool_call_id, content), &limits);
        self.store
            .append(&self.session_id, std::slice::from_ref(&message))
            .await?;
        Ok(message)
    }

    pub async fn history(&self) -> Result<Vec<Message>, ContextError> {
        self.store.read_all(&self.session_id).await
    }

    /// Run a compaction pass if the configured strategy says the history is
    /// about to overflow. The trigger is the real usage the last model call
    /// reported; estimates are only used for the post-splice validation.
    pub async fn maybe_compact(
        &self,
        usage: &TokenUsage,
        cancel: &CancellationToken,
    ) -> Result<CompactionOutcome, ContextError> {
        let Some(strategy) = &self.strategy else {
            return Ok(CompactionOutcome::Skipped);
        };
        let limits = strategy.model_limits(&self.model_limits);
        if !strategy.should_compact(usage.input_tokens, &limits) {
            return Ok(CompactionOutcome::Skipped);
        }

        let history = self.store.read_all(&self.session_id).await?;
        let Some(span) = strategy.compaction_span(&history) else {
            debug!(
                strategy = strategy.name(),
                len = history.len(),
                "nothing to compact"
            );
            return Ok(CompactionOutcome::Skipped);
        };

        let replacement = strategy.compact(&history, cancel).await?;
        if replacement.is_empty() {
            return Ok(CompactionOutcome::Skipped);
        }

        // Splice: retained head, replacement, retained tail. Relative order
        // of retained messages is untouched and the replacement sits where
        // the first removed message was.
        let mut next = Vec::with_capacity(history.len() - span.len() + replacement.len());
        next.extend_from_slice(&history[..span.start]);
        next.extend(replacement.iter().cloned());
        next.extend_from_slice(&history[span.end..]);

        let tokens_before = estimate_history(self.estimator.as_ref(), &history);
        let tokens_after = estimate_history(self.estimator.as_ref(), &next);
        let report = CompactionReport {
            strategy: strategy.name(),
            messages_removed: span.len(),
            messages_inserted: replacement.len(),
            tokens_before,
            tokens_after,
        };

        if tokens_after >= tokens_before {
            warn!(
                strategy = report.strategy,
                tokens_before,
                tokens_after,
                "compaction did not reduce estimated tokens, discarding result"
            );
            return Ok(CompactionOutcome::Rejected(report));
        }

        self.store.replace_all(&self.session_id, &next).await?;
        info!(
            strategy = report.strategy,
            tokens_before,
            tokens_after,
            messages_removed = report.messages_removed,
            messages_inserted = report.messages_inserted,
            "compaction applied"
        );
        Ok(CompactionOutcome::Applied(report))
    }

    /// Maintenance pass over durable history: prune old tool outputs down to
    /// placeholders. Persists only when something changed; repeatable.
    pub async fn prune_tool_outputs(&self) -> Result<usize, ContextError> {
        let history = self.store.read_all(&self.session_id).await?;
        let outcome = prune_old_tool_outputs(history, &self.prune_options);
        if outcome.pruned_count > 0 {
            self.store
                .replace_all(&self.session_id, &outcome.history)
                .await?;
            info!(
                pruned = outcome.pruned_count,
                "old tool outputs pruned from history"
            );
        }
        Ok(outcome.pruned_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompactionConfig;
    use crate::error::{CompactError, GenerateError};
    use crate::history::MemoryHistoryStore;
    use crate::provider::TextGenerator;
    use crate::strategy::{MiddleRemovalStrategy, ReactiveOverflowStrategy, StrategyContext};
    use crate::tool_output::{is_compacted, ToolOutputLimits};
    use crate::types::{CompactionSettings, Role};
    use async_trait::async_trait;
    use std::ops::Range;
    use std::sync::Arc;

    fn limits() -> ModelLimits {
        ModelLimits::new(100_000, 20_000)
    }

    fn over_threshold() -> TokenUsage {
        TokenUsage::new(90_000, 500)
    }

    async fn seed_conversation(session: &ContextSession, turns: usize) {
        for n in 0..turns {
            session.submit_text(format!("question {n} with a bit of padding text"));
            session.begin_turn().await.unwrap();
            session
                .record_response(Message::assistant(format!(
                    "answer {n} with enough words to carry some weight"
                )))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn begin_turn_coalesces_queued_input() {
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits());
        assert!(session.begin_turn().await.unwrap().is_none());

        session.submit_text("first");
        session.submit_text("second");
        assert_eq!(session.queued(), 2);

        let message = session.begin_turn().await.unwrap().unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text(), "first\n\nsecond");
        assert_eq!(session.queued(), 0);

        let history = session.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0], message);
    }

    #[tokio::test]
    async fn tool_results_are_truncated_before_the_store_sees_them() {
        let tool_output = ToolOutputConfig::default().with_override(
            "run_command",
            ToolOutputLimits {
                max_chars: 40,
                max_lines: 1,
            },
        );
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits())
            .with_tool_output(tool_output);

        let recorded = session
            .record_tool_result("run_command", "call_1", "a\n".repeat(100))
            .await
            .unwrap();
        assert!(recorded.metadata.truncated);

        let history = session.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].text().contains("more lines truncated"));

        // a different tool keeps the default caps
        let untouched = session
            .record_tool_result("other_tool", "call_2", "a\n".repeat(100))
            .await
            .unwrap();
        assert!(!untouched.metadata.truncated);
    }

    #[tokio::test]
    async fn compaction_splices_and_persists() {
        let strategy =
            MiddleRemovalStrategy::from_config(&CompactionConfig::new("middle-removal")).unwrap();
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits())
            .with_compaction(Some(Box::new(strategy)));
        seed_conversation(&session, 10).await;

        let outcome = session
            .maybe_compact(&over_threshold(), &CancellationToken::new())
            .await
            .unwrap();

        let report = match outcome {
            CompactionOutcome::Applied(report) => report,
            other => panic!("expected Applied, got {other:?}"),
        };
        assert_eq!(report.strategy, "middle-removal");
        assert_eq!(report.messages_removed, 8);
        assert_eq!(report.messages_inserted, 1);
        assert!(report.tokens_after < report.tokens_before);

        let history = session.history().await.unwrap();
        assert_eq!(history.len(), 13);
        // retained head, marker at the first removed position, retained tail
        assert_eq!(history[0].text(), "question 0 with a bit of padding text");
        assert_eq!(history[2].role, Role::System);
        assert!(history[2].is_summary());
        assert_eq!(
            history[12].text(),
            "answer 9 with enough words to carry some weight"
        );
    }

    #[tokio::test]
    async fn under_threshold_usage_skips_compaction() {
        let strategy =
            MiddleRemovalStrategy::from_config(&CompactionConfig::new("middle-removal")).unwrap();
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits())
            .with_compaction(Some(Box::new(strategy)));
        seed_conversation(&session, 10).await;

        let outcome = session
            .maybe_compact(&TokenUsage::new(1_000, 50), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, CompactionOutcome::Skipped);
        assert_eq!(session.history().await.unwrap().len(), 20);
    }

    // --- Inflating strategy, for the validation path ---

    struct InflatingStrategy {
        settings: CompactionSettings,
    }

    #[async_trait]
    impl CompactionStrategy for InflatingStrategy {
        fn name(&self) -> &'static str {
            "inflating"
        }

        fn settings(&self) -> &CompactionSettings {
            &self.settings
        }

        fn compaction_span(&self, history: &[Message]) -> Option<Range<usize>> {
            (history.len() > 2).then_some(0..2)
        }

        async fn compact(
            &self,
            _history: &[Message],
            _cancel: &CancellationToken,
        ) -> Result<Vec<Message>, CompactError> {
            Ok(vec![Message::assistant("x".repeat(50_000)).as_summary(2)])
        }
    }

    #[tokio::test]
    async fn non_reducing_compaction_is_discarded() {
        let strategy = InflatingStrategy {
            settings: CompactionSettings::default(),
        };
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits())
            .with_compaction(Some(Box::new(strategy)));
        seed_conversation(&session, 5).await;
        let before = session.history().await.unwrap();

        let outcome = session
            .maybe_compact(&over_threshold(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(outcome, CompactionOutcome::Rejected(_)));
        // history is untouched
        assert_eq!(session.history().await.unwrap(), before);
    }

    // --- Failing generator, for error propagation ---

    struct FailingGenerator;

    #[async_trait]
    impl TextGenerator for FailingGenerator {
        async fn generate(
            &self,
            _system_prompt: &str,
            _conversation: &str,
            _max_tokens: u32,
        ) -> Result<String, GenerateError> {
            Err(GenerateError::Request("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn reactive_failure_propagates_and_leaves_history_intact() {
        let ctx = StrategyContext::new().with_generator(Arc::new(FailingGenerator));
        let strategy = ReactiveOverflowStrategy::from_config(
            &CompactionConfig::new("reactive-overflow"),
            &ctx,
        )
        .unwrap();
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits())
            .with_compaction(Some(Box::new(strategy)));
        seed_conversation(&session, 6).await;
        let before = session.history().await.unwrap();

        let err = session
            .maybe_compact(&over_threshold(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::Compaction(_)));
        assert_eq!(session.history().await.unwrap(), before);
    }

    #[tokio::test]
    async fn no_strategy_means_compaction_never_runs() {
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits());
        seed_conversation(&session, 10).await;
        let outcome = session
            .maybe_compact(&over_threshold(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome, CompactionOutcome::Skipped);
    }

    #[tokio::test]
    async fn prune_pass_rewrites_the_store_once() {
        let session = ContextSession::new("s1", MemoryHistoryStore::new(), limits());
        for n in 0..5 {
            session
                .record_tool_result(
                    "run_command",
                    &format!("call_{n}"),
                    "tool output line\n".repeat(40),
                )
                .await
                .unwrap();
        }

        let pruned = session.prune_tool_outputs().await.unwrap();
        assert_eq!(pruned, 2);

        let history = session.history().await.unwrap();
        assert!(is_compacted(&history[0]));
        assert!(is_compacted(&history[1]));
        assert!(!is_compacted(&history[2]));

        // second pass finds nothing new
        assert_eq!(session.prune_tool_outputs().await.unwrap(), 0);
    }
}
