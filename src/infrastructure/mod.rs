//! Infrastructure Layer
//!
//! Cross-cutting concerns and infrastructure components.

pub mod circuit_breaker;
pub mod refresh_scheduler;
pub mod shutdown;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitMetrics, CircuitState};
pub use refresh_scheduler::{RefreshScheduler, RefreshSchedulerConfig};
pub use shutdown::{shutdown_signal, RequestGuard, ShutdownController};
