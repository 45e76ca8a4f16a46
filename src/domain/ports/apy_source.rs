//! APY Source Port
//!
//! Defines the interface for one named entry in the source fallback chain.

use crate::domain::entities::SourceReading;
use crate::domain::errors::ApyError;
use async_trait::async_trait;
use std::time::Duration;

/// A named, prioritized source of APY readings.
///
/// The source manager orders sources by priority and live health score and
/// tries them in turn. A source only produces a raw reading; validation,
/// timing and health bookkeeping belong to the manager.
#[async_trait]
pub trait ApySource: Send + Sync {
    /// Stable name used in logs, health records and responses.
    fn name(&self) -> &str;

    /// Lower values are tried first.
    fn priority(&self) -> u8;

    /// Confidence of a fresh, fast reading from this source.
    fn base_confidence(&self) -> f64;

    /// Window over which a dated reading decays; `None` for live sources.
    fn freshness_window(&self) -> Option<Duration> {
        None
    }

    /// Produce a reading.
    async fn fetch(&self) -> Result<SourceReading, ApyError>;
}
