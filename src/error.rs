/// Failures from the text-generation capability.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("API returned {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Parse(String),
}

/// Construction-time configuration failures. Raised synchronously by the
/// factory; fatal to startup, never silently defaulted away.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown compaction strategy type: {0}")]
    UnknownStrategy(String),
    #[error("strategy '{strategy}' requires a {capability} capability")]
    MissingCapability {
        strategy: String,
        capability: &'static str,
    },
    #[error("invalid value for {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Execution-time compaction failures. Recoverable at the turn level; a
/// failed compaction leaves history untouched.
#[derive(Debug, thiserror::Error)]
pub enum CompactError {
    #[error("summarization failed: {0}")]
    Generate(#[from] GenerateError),
    #[error("compaction cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("history store error: {0}")]
    Store(String),
    #[error("compaction error: {0}")]
    Compaction(#[from] CompactError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
