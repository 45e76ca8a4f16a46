//! APY Store Port
//!
//! Defines the interface for the persisted key/value store.

use crate::domain::entities::StoredApy;
use crate::domain::errors::ApyError;
use async_trait::async_trait;

/// Persisted store for APY snapshots.
///
/// The store is opaque: it does not enforce freshness, callers compare
/// `last_updated_ms` against their own windows. Implementations stamp
/// `last_updated_ms` on every `set`.
#[async_trait]
pub trait ApyStore: Send + Sync {
    /// Read the snapshot stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<StoredApy>, ApyError>;

    /// Write a snapshot under `key`, replacing any previous one.
    async fn set(
        &self,
        key: &str,
        value: f64,
        base_component: f64,
        reward_component: f64,
        tvl: f64,
    ) -> Result<(), ApyError>;
}
