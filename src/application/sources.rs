//! Concrete APY sources
//!
//! The default fallback chain, tried in priority order:
//! `primary` (external provider), `persisted` (latest stored snapshot),
//! `cross_protocol` (best stored per-protocol rate) and `static`.

use crate::domain::entities::SourceReading;
use crate::domain::errors::ApyError;
use crate::domain::ports::{ApySource, ApyStore, Clock, YieldProvider};
use crate::domain::value_objects::is_plausible_apy;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// How long a stored snapshot stays usable as a source.
pub const STORED_FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Live value from the external yield provider.
pub struct PrimarySource {
    provider: Arc<dyn YieldProvider>,
}

impl PrimarySource {
    pub const NAME: &'static str = "primary";

    pub fn new(provider: Arc<dyn YieldProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl ApySource for PrimarySource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u8 {
        1
    }

    fn base_confidence(&self) -> f64 {
        0.95
    }

    async fn fetch(&self) -> Result<SourceReading, ApyError> {
        self.provider.fetch().await.map(SourceReading::live)
    }
}

/// Latest snapshot written to the persisted store.
pub struct PersistedSource {
    store: Arc<dyn ApyStore>,
    key: String,
    window: Duration,
}

impl PersistedSource {
    pub const NAME: &'static str = "persisted";

    pub fn new(store: Arc<dyn ApyStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            window: STORED_FRESHNESS_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

#[async_trait]
impl ApySource for PersistedSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u8 {
        2
    }

    fn base_confidence(&self) -> f64 {
        0.85
    }

    fn freshness_window(&self) -> Option<Duration> {
        Some(self.window)
    }

    async fn fetch(&self) -> Result<SourceReading, ApyError> {
        let stored = self
            .store
            .get(&self.key)
            .await?
            .ok_or_else(|| ApyError::SourceFailure {
                name: Self::NAME.to_string(),
                reason: format!("no snapshot under '{}'", self.key),
            })?;

        Ok(SourceReading::as_of(stored.value, stored.last_updated_ms))
    }
}

/// Highest recent rate among related protocols.
///
/// Each protocol is read from `<prefix><protocol>`; entries older than the
/// window or outside the plausible range are skipped.
pub struct CrossProtocolSource {
    store: Arc<dyn ApyStore>,
    clock: Arc<dyn Clock>,
    keys: Vec<String>,
    window: Duration,
}

impl CrossProtocolSource {
    pub const NAME: &'static str = "cross_protocol";

    pub fn new(
        store: Arc<dyn ApyStore>,
        clock: Arc<dyn Clock>,
        key_prefix: &str,
        protocols: &[String],
    ) -> Self {
        Self {
            store,
            clock,
            keys: protocols
                .iter()
                .map(|p| format!("{}{}", key_prefix, p))
                .collect(),
            window: STORED_FRESHNESS_WINDOW,
        }
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

#[async_trait]
impl ApySource for CrossProtocolSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u8 {
        3
    }

    fn base_confidence(&self) -> f64 {
        0.7
    }

    fn freshness_window(&self) -> Option<Duration> {
        Some(self.window)
    }

    async fn fetch(&self) -> Result<SourceReading, ApyError> {
        let now = self.clock.now_ms();
        let window_ms = self.window.as_millis() as u64;
        let mut best: Option<SourceReading> = None;

        for key in &self.keys {
            let stored = match self.store.get(key).await {
                Ok(Some(stored)) => stored,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!("cross-protocol read of {} failed: {}", key, e);
                    continue;
                }
            };

            if now.saturating_sub(stored.last_updated_ms) > window_ms || !is_plausible_apy(stored.value) {
                continue;
            }

            if best.as_ref().map_or(true, |b| stored.value > b.value) {
                best = Some(SourceReading::as_of(stored.value, stored.last_updated_ms));
            }
        }

        best.ok_or_else(|| ApyError::SourceFailure {
            name: Self::NAME.to_string(),
            reason: format!("no recent rate among {} protocols", self.keys.len()),
        })
    }
}

/// Fixed constant; the last resort of the chain.
pub struct StaticSource {
    value: f64,
}

impl StaticSource {
    pub const NAME: &'static str = "static";

    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Default for StaticSource {
    fn default() -> Self {
        Self::new(7.5)
    }
}

#[async_trait]
impl ApySource for StaticSource {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn priority(&self) -> u8 {
        4
    }

    fn base_confidence(&self) -> f64 {
        0.5
    }

    async fn fetch(&self) -> Result<SourceReading, ApyError> {
        Ok(SourceReading::live(self.value))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::{DashMapApyStore, ManualClock};
    use crate::domain::entities::StoredApy;

    const T0: u64 = 1_700_000_000_000;
    const HOUR_MS: u64 = 60 * 60 * 1000;

    struct FixedProvider(Result<f64, ApyError>);

    #[async_trait]
    impl YieldProvider for FixedProvider {
        async fn fetch(&self) -> Result<f64, ApyError> {
            self.0.clone()
        }
    }

    fn snapshot(value: f64, last_updated_ms: u64) -> StoredApy {
        StoredApy {
            value,
            base_component: value,
            reward_component: 0.0,
            tvl: 0.0,
            last_updated_ms,
        }
    }

    fn store() -> (Arc<DashMapApyStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        (Arc::new(DashMapApyStore::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_primary_source() {
        let source = PrimarySource::new(Arc::new(FixedProvider(Ok(8.5))));
        assert_eq!(source.name(), "primary");
        assert_eq!(source.priority(), 1);
        assert_eq!(source.fetch().await.unwrap(), SourceReading::live(8.5));

        let failing = PrimarySource::new(Arc::new(FixedProvider(Err(ApyError::Provider(
            "timeout".to_string(),
        )))));
        assert!(failing.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_persisted_source_reads_snapshot() {
        let (store, _) = store();
        store.insert("apy:latest", snapshot(6.2, T0 - 60_000));

        let source = PersistedSource::new(store, "apy:latest");
        let reading = source.fetch().await.unwrap();
        assert_eq!(reading, SourceReading::as_of(6.2, T0 - 60_000));
        assert_eq!(source.freshness_window(), Some(STORED_FRESHNESS_WINDOW));
    }

    #[tokio::test]
    async fn test_persisted_source_missing_snapshot() {
        let (store, _) = store();
        let source = PersistedSource::new(store, "apy:latest");

        let err = source.fetch().await.unwrap_err();
        assert!(matches!(err, ApyError::SourceFailure { .. }));
    }

    #[tokio::test]
    async fn test_cross_protocol_takes_max_recent() {
        let (store, clock) = store();
        store.insert("apy:protocol:aave", snapshot(4.1, T0 - HOUR_MS));
        store.insert("apy:protocol:compound", snapshot(5.3, T0 - 2 * HOUR_MS));
        // Too old and implausible entries are skipped
        store.insert("apy:protocol:old", snapshot(9.9, T0 - 25 * HOUR_MS));
        store.insert("apy:protocol:broken", snapshot(80.0, T0));

        let protocols: Vec<String> = ["aave", "compound", "old", "broken", "missing"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let source = CrossProtocolSource::new(store, clock, "apy:protocol:", &protocols);

        let reading = source.fetch().await.unwrap();
        assert_eq!(reading.value, 5.3);
        assert_eq!(reading.as_of_ms, Some(T0 - 2 * HOUR_MS));
    }

    #[tokio::test]
    async fn test_cross_protocol_nothing_recent() {
        let (store, clock) = store();
        store.insert("apy:protocol:aave", snapshot(4.1, T0 - 25 * HOUR_MS));

        let source = CrossProtocolSource::new(store, clock, "apy:protocol:", &["aave".to_string()]);
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::default();
        assert_eq!(source.priority(), 4);
        assert_eq!(source.fetch().await.unwrap().value, 7.5);
        assert_eq!(source.freshness_window(), None);
    }
}
