use tracing::debug;

use crate::config::CompactionConfig;
use crate::error::ConfigError;

use super::{
    CompactionStrategy, MiddleRemovalStrategy, NoopStrategy, ReactiveOverflowStrategy,
    StrategyContext,
};

type BuildFn =
    fn(&CompactionConfig, &StrategyContext) -> Result<Box<dyn CompactionStrategy>, ConfigError>;

struct StrategyEntry {
    name: String,
    /// Declared up front so the factory can fail fast instead of handing out
    /// a half-usable strategy.
    requires_generator: bool,
    build: BuildFn,
}

/// Catalog of strategy constructors. Immutable once built and passed into
/// the factory explicitly; there is no global registry.
pub struct StrategyRegistry {
    entries: Vec<StrategyEntry>,
}

impl StrategyRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The three built-in strategies.
    pub fn builtin() -> Self {
        Self::empty()
            .with_strategy("noop", false, |config, _ctx| {
                Ok(Box::new(NoopStrategy::from_config(config)?))
            })
            .with_strategy("middle-removal", false, |config, _ctx| {
                Ok(Box::new(MiddleRemovalStrategy::from_config(config)?))
            })
            .with_strategy("reactive-overflow", true, |config, ctx| {
                Ok(Box::new(ReactiveOverflowStrategy::from_config(config, ctx)?))
            })
    }

    /// Register a strategy constructor under an identifier. Re-registering
    /// an existing name replaces that entry in place.
    pub fn with_strategy(
        mut self,
        name: impl Into<String>,
        requires_generator: bool,
        build: BuildFn,
    ) -> Self {
        let entry = StrategyEntry {
            name: name.into(),
            requires_generator,
            build,
        };
        match self.entries.iter().position(|e| e.name == entry.name) {
            Some(index) => self.entries[index] = entry,
            None => self.entries.push(entry),
        }
        self
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    fn get(&self, name: &str) -> Option<&StrategyEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Build the configured strategy, bound to the session's runtime context.
///
/// `Ok(None)` means compaction is disabled outright, which is not the same
/// as a noop strategy: the pipeline skips the compaction step entirely.
pub fn create_compaction_strategy(
    config: &CompactionConfig,
    ctx: &StrategyContext,
    registry: &StrategyRegistry,
) -> Result<Option<Box<dyn CompactionStrategy>>, ConfigError> {
    if !config.enabled {
        debug!(kind = %config.kind, "compaction disabled by configuration");
        return Ok(None);
    }

    let entry = registry
        .get(&config.kind)
        .ok_or_else(|| ConfigError::UnknownStrategy(config.kind.clone()))?;

    if entry.requires_generator && ctx.generator.is_none() {
        return Err(ConfigError::MissingCapability {
            strategy: entry.name.clone(),
            capability: "text-generation",
        });
    }

    let strategy = (entry.build)(config, ctx)?;
    debug!(strategy = strategy.name(), "compaction strategy created");
    Ok(Some(strategy))
}
