//! Domain Errors
//!
//! Every failure the APY pipeline knows how to recover from.
//! None of these ever reach the public `get_apy` caller.

/// Errors raised inside the APY pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApyError {
    /// One source errored; the next source is tried.
    #[error("source {name} failed: {reason}")]
    SourceFailure { name: String, reason: String },

    /// A source returned a value outside `(0, 50]`.
    #[error("source {name} returned implausible value {value}")]
    ImplausibleValue { name: String, value: f64 },

    /// A store-backed source holds data older than its freshness window.
    #[error("source {name} data is stale ({age_ms}ms old)")]
    StaleData { name: String, age_ms: u64 },

    /// Every registered source failed.
    #[error("all {attempted} sources exhausted")]
    AllSourcesExhausted { attempted: usize },

    /// The breaker short-circuited the call.
    #[error("circuit {name} is open")]
    CircuitOpen { name: String },

    /// The request did not complete before its deadline.
    #[error("request timed out after {timeout_ms}ms")]
    RequestTimeout { timeout_ms: u64 },

    /// The persisted store failed.
    #[error("store error: {0}")]
    Store(String),

    /// The external yield provider failed.
    #[error("provider error: {0}")]
    Provider(String),
}

impl ApyError {
    /// Whether a source manager should move on to the next source.
    pub fn is_source_level(&self) -> bool {
        matches!(
            self,
            Self::SourceFailure { .. }
                | Self::ImplausibleValue { .. }
                | Self::StaleData { .. }
                | Self::Store(_)
                | Self::Provider(_)
        )
    }
}
