//! apy-guard Library
//!
//! Resilient APY lookups: a circuit breaker, a four-tier cache and a
//! health-scored source fallback chain behind a single orchestrator.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::{ApyOrchestrator, ApyRequest, ApyResponse, HealthReport, RequestOptions};
pub use config::load_config;
pub use domain::entities::{CachedApy, FreshApy, SourceHealth, StoredApy};
pub use domain::errors::ApyError;
pub use domain::ports::{ApySource, ApyStore, Clock, YieldProvider};
pub use domain::value_objects::{CacheTier, Confidence, OverallHealth};
pub use infrastructure::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
