use crate::models::MetricSource;

/// Errors raised inside the engine.
///
/// Collection, reasoning and persistence failures are recoverable: callers log
/// them and continue with retained or fallback values.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{channel} collection failed: {reason}")]
    Collection { channel: MetricSource, reason: String },

    #[error("{channel} collector timed out after {secs}s")]
    CollectorTimeout { channel: MetricSource, secs: u64 },

    #[error("reasoning service unavailable: {0}")]
    ReasoningUnavailable(String),

    #[error("malformed reasoning response: {0}")]
    MalformedResponse(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error("migraine event not found: {0}")]
    EventNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn collection(channel: MetricSource, reason: impl Into<String>) -> Self {
        Self::Collection {
            channel,
            reason: reason.into(),
        }
    }

    /// True for failures the risk engine answers with the rule-based fallback.
    pub fn is_reasoning_failure(&self) -> bool {
        matches!(
            self,
            Self::ReasoningUnavailable(_) | Self::MalformedResponse(_)
        )
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("serialization: {}", err))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        Self::ReasoningUnavailable(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
