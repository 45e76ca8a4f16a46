//! DashMap APY Store
//!
//! Implements ApyStore in memory using DashMap for lock-free concurrent access.
//! Used when no database path is configured and as a test double.

use crate::domain::entities::StoredApy;
use crate::domain::errors::ApyError;
use crate::domain::ports::{ApyStore, Clock};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory snapshot store.
pub struct DashMapApyStore {
    entries: DashMap<String, StoredApy>,
    clock: Arc<dyn Clock>,
}

impl DashMapApyStore {
    /// Create an empty store.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Insert a snapshot with an explicit timestamp.
    ///
    /// Lets callers seed data written "in the past", e.g. by an indexer.
    pub fn insert(&self, key: impl Into<String>, snapshot: StoredApy) {
        self.entries.insert(key.into(), snapshot);
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ApyStore for DashMapApyStore {
    async fn get(&self, key: &str) -> Result<Option<StoredApy>, ApyError> {
        Ok(self.entries.get(key).map(|e| e.value().clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: f64,
        base_component: f64,
        reward_component: f64,
        tvl: f64,
    ) -> Result<(), ApyError> {
        self.entries.insert(
            key.to_string(),
            StoredApy {
                value,
                base_component,
                reward_component,
                tvl,
                last_updated_ms: self.clock.now_ms(),
            },
        );
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::ManualClock;

    fn store() -> (DashMapApyStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5_000));
        (DashMapApyStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (store, _clock) = store();
        assert!(store.get("apy:latest").await.unwrap().is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_set_stamps_last_updated() {
        let (store, _clock) = store();
        store.set("apy:latest", 8.5, 5.0, 3.5, 1_000.0).await.unwrap();

        let stored = store.get("apy:latest").await.unwrap().unwrap();
        assert_eq!(stored.value, 8.5);
        assert_eq!(stored.base_component, 5.0);
        assert_eq!(stored.reward_component, 3.5);
        assert_eq!(stored.tvl, 1_000.0);
        assert_eq!(stored.last_updated_ms, 5_000);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let (store, clock) = store();
        store.set("k", 8.5, 8.5, 0.0, 0.0).await.unwrap();
        clock.advance(std::time::Duration::from_secs(1));
        store.set("k", 9.0, 9.0, 0.0, 0.0).await.unwrap();

        let stored = store.get("k").await.unwrap().unwrap();
        assert_eq!(stored.value, 9.0);
        assert_eq!(stored.last_updated_ms, 6_000);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_keeps_given_timestamp() {
        let (store, _clock) = store();
        store.insert(
            "apy:protocol:lido",
            StoredApy {
                value: 3.1,
                base_component: 3.1,
                reward_component: 0.0,
                tvl: 0.0,
                last_updated_ms: 42,
            },
        );

        let stored = store.get("apy:protocol:lido").await.unwrap().unwrap();
        assert_eq!(stored.last_updated_ms, 42);
    }
}
