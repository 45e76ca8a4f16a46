//! Yield Provider Port
//!
//! Defines the interface for fetching the live yield percentage.

use crate::domain::errors::ApyError;
use async_trait::async_trait;

/// Upstream provider of the live yield percentage.
///
/// This is an outbound port. Implementations may call an HTTP API, an
/// on-chain view function, or anything else that can produce a number.
/// Implementations are allowed to be slow and to fail; callers bound them
/// with timeouts and a circuit breaker.
#[async_trait]
pub trait YieldProvider: Send + Sync {
    /// Fetch the current yield percentage.
    async fn fetch(&self) -> Result<f64, ApyError>;
}
