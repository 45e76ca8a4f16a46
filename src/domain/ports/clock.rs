//! Clock Port
//!
//! Wall-clock abstraction so cache ages and breaker timeouts can be driven
//! deterministically in tests.

/// Source of the current time in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}
