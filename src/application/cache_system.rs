//! Cache System - four-tier APY cache
//!
//! Tiers, fastest first:
//! 1. L2 session entries, keyed by user (read first when a user is given)
//! 2. L1 single global hot entry
//! 3. L3 persisted snapshot behind the `ApyStore` port
//! 4. L4 static constants, always available
//!
//! The first tier that hits wins and is copied into the faster tiers.

use crate::domain::entities::{CachedApy, GlobalEntry, SessionEntry};
use crate::domain::ports::{ApyStore, Clock};
use crate::domain::services::Scoring;
use crate::domain::value_objects::{CacheTier, Confidence};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Name of the static constant served by L4.
pub const DEFAULT_STATIC_KEY: &str = "default";

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// L1 time to live
    pub global_ttl: Duration,
    /// L2 time to live
    pub session_ttl: Duration,
    /// L3 freshness window
    pub persisted_ttl: Duration,
    /// Store key of the L3 snapshot
    pub persisted_key: String,
    /// Store key read by the persisted source; fresh values are mirrored here
    pub latest_key: String,
    /// L4 named constants; `default` is served
    pub static_values: HashMap<String, f64>,
    /// Fixed confidence of L4
    pub static_confidence: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut static_values = HashMap::new();
        static_values.insert(DEFAULT_STATIC_KEY.to_string(), 7.5);

        Self {
            global_ttl: Duration::from_secs(30),
            session_ttl: Duration::from_secs(60),
            persisted_ttl: Duration::from_secs(300),
            persisted_key: "apy:cache".to_string(),
            latest_key: "apy:latest".to_string(),
            static_values,
            static_confidence: 0.5,
        }
    }
}

#[derive(Debug, Default)]
struct HitCounters {
    session: AtomicU64,
    global: AtomicU64,
    persisted: AtomicU64,
    fallback: AtomicU64,
    persisted_errors: AtomicU64,
}

impl HitCounters {
    fn record(&self, tier: CacheTier) {
        let counter = match tier {
            CacheTier::Session => &self.session,
            CacheTier::Global => &self.global,
            CacheTier::Persisted => &self.persisted,
            CacheTier::Static => &self.fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Per-tier hit counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierHits {
    pub l1: u64,
    pub l2: u64,
    pub l3: u64,
    pub l4: u64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub global_value: Option<f64>,
    pub global_age_ms: Option<u64>,
    pub sessions: usize,
    pub hits: TierHits,
    pub persisted_errors: u64,
}

/// Four-tier APY cache.
pub struct CacheSystem {
    config: CacheConfig,
    store: Arc<dyn ApyStore>,
    clock: Arc<dyn Clock>,
    global: RwLock<Option<GlobalEntry>>,
    sessions: DashMap<String, SessionEntry>,
    counters: HitCounters,
}

impl CacheSystem {
    pub fn new(config: CacheConfig, store: Arc<dyn ApyStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            store,
            clock,
            global: RwLock::new(None),
            sessions: DashMap::new(),
            counters: HitCounters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Best cached value for the caller.
    ///
    /// Never fails: L4 always answers. Serving tier hits are copied upward
    /// (L3 into L1 and L2, L1 into L2) stamped with the current time.
    /// Confidence is `clamp(1 - age/ttl, 0, 1)` of the serving entry.
    pub async fn get_apy(&self, user_id: Option<&str>, journey_state: Option<&str>) -> CachedApy {
        let now = self.clock.now_ms();

        if let Some(user) = user_id {
            if let Some(hit) = self.read_session(user, journey_state, now) {
                self.counters.record(CacheTier::Session);
                return hit;
            }
        }

        if let Some(hit) = self.read_global(now) {
            self.counters.record(CacheTier::Global);
            if let Some(user) = user_id {
                self.promote_to_session(user, journey_state, &hit, now);
            }
            return hit;
        }

        if let Some(hit) = self.read_persisted(now).await {
            self.counters.record(CacheTier::Persisted);
            // Re-read the clock: the store call may have taken a while
            let now = self.clock.now_ms();
            *self.global.write() = Some(GlobalEntry {
                value: hit.value,
                timestamp_ms: now,
            });
            if let Some(user) = user_id {
                self.promote_to_session(user, journey_state, &hit, now);
            }
            return hit;
        }

        self.counters.record(CacheTier::Static);
        self.read_static(now)
    }

    /// Store a freshly fetched value.
    ///
    /// Overwrites L1 immediately. On a spawned task the value is written to
    /// the L3 key and mirrored to the latest-snapshot key that backs the
    /// persisted source, so an outage longer than the L3 window still has a
    /// recent value to fall back on. Store failures are logged and dropped;
    /// the returned handle may be ignored.
    pub fn set_fresh_apy(&self, value: f64, source: &str) -> JoinHandle<()> {
        let now = self.clock.now_ms();
        *self.global.write() = Some(GlobalEntry {
            value,
            timestamp_ms: now,
        });
        tracing::debug!("cache L1 set to {} from {}", value, source);

        let store = self.store.clone();
        let mut keys = vec![self.config.persisted_key.clone()];
        if self.config.latest_key != self.config.persisted_key {
            keys.push(self.config.latest_key.clone());
        }
        let source = source.to_string();
        tokio::spawn(async move {
            for key in &keys {
                if let Err(e) = store.set(key, value, value, 0.0, 0.0).await {
                    tracing::warn!("snapshot write of {} to {} from {} failed: {}", value, key, source, e);
                }
            }
        })
    }

    /// Copy the current L1 value into the user's session.
    ///
    /// Used after a fresh fetch so the next step of the same journey is
    /// answered from L2. No-op when L1 is empty or expired.
    pub fn pin_session(&self, user_id: &str, journey_state: Option<&str>) {
        let now = self.clock.now_ms();
        if let Some(hit) = self.read_global(now) {
            self.promote_to_session(user_id, journey_state, &hit, now);
        }
    }

    /// Clear one tier, or every in-memory tier when `tier` is `None`.
    pub fn clear_cache(&self, tier: Option<CacheTier>) {
        match tier {
            None => {
                *self.global.write() = None;
                self.sessions.clear();
                tracing::info!("cache L1 and L2 cleared, L3 left to the store");
            }
            Some(CacheTier::Global) => {
                *self.global.write() = None;
                tracing::info!("cache L1 cleared");
            }
            Some(CacheTier::Session) => {
                self.sessions.clear();
                tracing::info!("cache L2 cleared");
            }
            Some(CacheTier::Persisted) => {
                tracing::info!("cache L3 cannot be cleared through the store, skipped");
            }
            Some(CacheTier::Static) => {
                tracing::debug!("cache L4 is immutable, skipped");
            }
        }
    }

    /// Drop every expired session entry.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired_sessions(&self) -> usize {
        let now = self.clock.now_ms();
        let ttl_ms = self.config.session_ttl.as_millis() as u64;
        let before = self.sessions.len();

        self.sessions
            .retain(|_, entry| now.saturating_sub(entry.timestamp_ms) < ttl_ms);

        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!("cleaned up {} expired sessions", removed);
        }
        removed
    }

    /// Look up a session entry without touching it.
    pub fn session(&self, user_id: &str) -> Option<SessionEntry> {
        self.sessions.get(user_id).map(|e| e.value().clone())
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now_ms();
        let global = self.global.read().clone();

        CacheStats {
            global_value: global.as_ref().map(|e| e.value),
            global_age_ms: global.as_ref().map(|e| now.saturating_sub(e.timestamp_ms)),
            sessions: self.sessions.len(),
            hits: TierHits {
                l1: self.counters.global.load(Ordering::Relaxed),
                l2: self.counters.session.load(Ordering::Relaxed),
                l3: self.counters.persisted.load(Ordering::Relaxed),
                l4: self.counters.fallback.load(Ordering::Relaxed),
            },
            persisted_errors: self.counters.persisted_errors.load(Ordering::Relaxed),
        }
    }

    /// The L4 value for a named constant, falling back to `default`.
    pub fn static_value(&self, name: &str) -> f64 {
        self.config
            .static_values
            .get(name)
            .or_else(|| self.config.static_values.get(DEFAULT_STATIC_KEY))
            .copied()
            .unwrap_or(7.5)
    }

    fn read_session(&self, user_id: &str, journey_state: Option<&str>, now: u64) -> Option<CachedApy> {
        let ttl = self.config.session_ttl;
        let ttl_ms = ttl.as_millis() as u64;

        let expired = self
            .sessions
            .remove_if(user_id, |_, e| now.saturating_sub(e.timestamp_ms) >= ttl_ms);
        if expired.is_some() {
            tracing::debug!("session for {} expired, evicted", user_id);
            return None;
        }

        let mut entry = self.sessions.get_mut(user_id)?;
        entry.touch(journey_state);
        let age = now.saturating_sub(entry.timestamp_ms);

        Some(CachedApy {
            value: entry.value,
            timestamp_ms: entry.timestamp_ms,
            tier: CacheTier::Session,
            confidence: Scoring::tier_confidence(age, ttl),
        })
    }

    fn read_global(&self, now: u64) -> Option<CachedApy> {
        let ttl = self.config.global_ttl;
        let guard = self.global.read();
        let entry = guard.as_ref()?;

        let age = now.saturating_sub(entry.timestamp_ms);
        if age >= ttl.as_millis() as u64 {
            return None;
        }

        Some(CachedApy {
            value: entry.value,
            timestamp_ms: entry.timestamp_ms,
            tier: CacheTier::Global,
            confidence: Scoring::tier_confidence(age, ttl),
        })
    }

    async fn read_persisted(&self, now: u64) -> Option<CachedApy> {
        let ttl = self.config.persisted_ttl;

        let stored = match self.store.get(&self.config.persisted_key).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                self.counters.persisted_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("cache L3 read failed: {}", e);
                return None;
            }
        };

        let age = now.saturating_sub(stored.last_updated_ms);
        if age >= ttl.as_millis() as u64 {
            tracing::debug!("cache L3 snapshot is {}ms old, ignored", age);
            return None;
        }

        Some(CachedApy {
            value: stored.value,
            timestamp_ms: stored.last_updated_ms,
            tier: CacheTier::Persisted,
            confidence: Scoring::tier_confidence(age, ttl),
        })
    }

    fn read_static(&self, now: u64) -> CachedApy {
        CachedApy {
            value: self.static_value(DEFAULT_STATIC_KEY),
            timestamp_ms: now,
            tier: CacheTier::Static,
            confidence: Confidence::new(self.config.static_confidence),
        }
    }

    fn promote_to_session(&self, user_id: &str, journey_state: Option<&str>, hit: &CachedApy, now: u64) {
        self.sessions.insert(
            user_id.to_string(),
            SessionEntry::new(
                user_id,
                journey_state.map(str::to_string),
                hit.value,
                now,
            ),
        );
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::adapters::outbound::{DashMapApyStore, ManualClock};
    use crate::domain::entities::StoredApy;
    use crate::domain::errors::ApyError;
    use async_trait::async_trait;

    const T0: u64 = 1_700_000_000_000;

    struct FailingStore;

    #[async_trait]
    impl ApyStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<StoredApy>, ApyError> {
            Err(ApyError::Store("database is locked".to_string()))
        }

        async fn set(&self, _: &str, _: f64, _: f64, _: f64, _: f64) -> Result<(), ApyError> {
            Err(ApyError::Store("database is locked".to_string()))
        }
    }

    fn setup() -> (CacheSystem, Arc<DashMapApyStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(DashMapApyStore::new(clock.clone()));
        let cache = CacheSystem::new(CacheConfig::default(), store.clone(), clock.clone());
        (cache, store, clock)
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

    // ===== Tier order Tests =====

    #[tokio::test]
    async fn test_empty_cache_serves_static() {
        let (cache, _, _) = setup();

        let hit = cache.get_apy(None, None).await;
        assert_eq!(hit.tier, CacheTier::Static);
        assert_eq!(hit.value, 7.5);
        assert_eq!(hit.confidence, Confidence::new(0.5));
    }

    #[tokio::test]
    async fn test_static_is_never_promoted() {
        let (cache, _, _) = setup();

        cache.get_apy(Some("user-1"), Some("initial")).await;
        assert!(cache.session("user-1").is_none());
        assert!(cache.stats().global_value.is_none());
    }

    #[tokio::test]
    async fn test_fresh_l1_preferred_over_l3_and_l4() {
        let (cache, store, clock) = setup();
        store.insert("apy:cache", snapshot(6.2, T0));
        cache.set_fresh_apy(8.5, "primary").await.unwrap();

        clock.advance(Duration::from_secs(10));
        let hit = cache.get_apy(None, None).await;
        assert_eq!(hit.tier, CacheTier::Global);
        assert_eq!(hit.value, 8.5);
    }

    #[tokio::test]
    async fn test_expired_l1_falls_through_to_l3() {
        let (cache, store, clock) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        clock.advance(Duration::from_secs(31));
        store.insert("apy:cache", snapshot(6.2, clock.now_ms()));

        let hit = cache.get_apy(None, None).await;
        assert_eq!(hit.tier, CacheTier::Persisted);
        assert_eq!(hit.value, 6.2);
    }

    #[tokio::test]
    async fn test_l3_hit_promotes_to_l1_and_l2() {
        let (cache, store, clock) = setup();
        store.insert("apy:cache", snapshot(6.2, T0));
        clock.advance(Duration::from_secs(150));

        let first = cache.get_apy(Some("user-1"), None).await;
        assert_eq!(first.tier, CacheTier::Persisted);
        assert!((first.confidence.value() - 0.5).abs() < 1e-9);

        // L2 now answers for the user, L1 for everyone else
        let session = cache.session("user-1").unwrap();
        assert_eq!(session.value, 6.2);
        assert_eq!(session.timestamp_ms, clock.now_ms());

        // The promoted L1 entry ages from the promotion time
        let global = cache.get_apy(None, None).await;
        assert_eq!(global.tier, CacheTier::Global);
        assert_eq!(global.value, 6.2);
        assert_eq!(global.confidence, Confidence::FULL);
    }

    #[tokio::test]
    async fn test_stale_l3_is_ignored() {
        let (cache, store, clock) = setup();
        store.insert("apy:cache", snapshot(6.2, T0));
        clock.advance(Duration::from_secs(301));

        let hit = cache.get_apy(None, None).await;
        assert_eq!(hit.tier, CacheTier::Static);
    }

    #[tokio::test]
    async fn test_store_errors_degrade_to_static() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = CacheSystem::new(CacheConfig::default(), Arc::new(FailingStore), clock);

        let hit = cache.get_apy(None, None).await;
        assert_eq!(hit.tier, CacheTier::Static);
        assert_eq!(cache.stats().persisted_errors, 1);

        // L3 write failure is swallowed, L1 still set
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        assert_eq!(cache.get_apy(None, None).await.value, 8.5);
    }

    #[tokio::test]
    async fn test_set_fresh_apy_writes_l3() {
        let (cache, store, _) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();

        let stored = store.get("apy:cache").await.unwrap().unwrap();
        assert_eq!(stored.value, 8.5);
        assert_eq!(stored.last_updated_ms, T0);
    }

    // ===== Session Tests =====

    #[tokio::test]
    async fn test_session_keeps_value_stable_within_ttl() {
        let (cache, _, clock) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();

        let first = cache.get_apy(Some("user-a"), Some("initial")).await;
        assert_eq!(first.tier, CacheTier::Global);

        // New value arrives, but user A keeps seeing what they saw
        clock.advance(Duration::from_secs(30));
        cache.set_fresh_apy(9.1, "primary").await.unwrap();

        let second = cache.get_apy(Some("user-a"), Some("confirm")).await;
        assert_eq!(second.tier, CacheTier::Session);
        assert_eq!(second.value, first.value);

        let session = cache.session("user-a").unwrap();
        assert_eq!(session.interaction_count, 2);
        assert_eq!(session.journey_state.as_deref(), Some("confirm"));
    }

    #[tokio::test]
    async fn test_expired_session_never_returned_and_evicted() {
        let (cache, _, clock) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("user-a"), None).await;

        cache.get_apy(Some("user-a"), None).await;
        assert_eq!(cache.session("user-a").unwrap().interaction_count, 2);

        clock.advance(Duration::from_secs(61));
        let hit = cache.get_apy(Some("user-a"), None).await;
        assert_eq!(hit.tier, CacheTier::Persisted);

        // The expired entry was dropped; the L3 hit started a new one
        let session = cache.session("user-a").unwrap();
        assert_eq!(session.interaction_count, 1);
        assert_eq!(session.timestamp_ms, clock.now_ms());
    }

    #[tokio::test]
    async fn test_expired_session_evicted_without_replacement() {
        let clock = Arc::new(ManualClock::new(T0));
        let cache = CacheSystem::new(CacheConfig::default(), Arc::new(FailingStore), clock.clone());
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("user-a"), None).await;

        clock.advance(Duration::from_secs(61));
        let hit = cache.get_apy(Some("user-a"), None).await;
        assert_eq!(hit.tier, CacheTier::Static);
        assert!(cache.session("user-a").is_none());
    }

    #[tokio::test]
    async fn test_session_confidence_decays() {
        let (cache, _, clock) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("user-a"), None).await;

        let mut previous = Confidence::FULL;
        for _ in 0..5 {
            clock.advance(Duration::from_secs(10));
            let hit = cache.get_apy(Some("user-a"), None).await;
            assert_eq!(hit.tier, CacheTier::Session);
            assert!(hit.confidence <= previous);
            previous = hit.confidence;
        }
    }

    #[tokio::test]
    async fn test_session_confidence_ignores_promoting_tier_age() {
        let (cache, _, clock) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();

        // Promoted from an L1 entry that is already 5s old
        clock.advance(Duration::from_secs(5));
        let promoted = cache.get_apy(Some("u"), None).await;
        assert_eq!(promoted.tier, CacheTier::Global);

        clock.advance(Duration::from_secs(10));
        let hit = cache.get_apy(Some("u"), None).await;
        assert_eq!(hit.tier, CacheTier::Session);
        assert!((hit.confidence.value() - (1.0 - 10.0 / 60.0)).abs() < 1e-9);
        assert!(hit.confidence.value() > 0.7);
    }

    #[tokio::test]
    async fn test_set_fresh_mirrors_latest_snapshot() {
        let (cache, store, _) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();

        assert_eq!(store.get("apy:cache").await.unwrap().unwrap().value, 8.5);
        assert_eq!(store.get("apy:latest").await.unwrap().unwrap().value, 8.5);
    }

    #[tokio::test]
    async fn test_set_fresh_writes_once_when_keys_match() {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(DashMapApyStore::new(clock.clone()));
        let config = CacheConfig {
            latest_key: "apy:cache".to_string(),
            ..Default::default()
        };
        let cache = CacheSystem::new(config, store.clone(), clock);
        cache.set_fresh_apy(8.5, "primary").await.unwrap();

        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_pin_session_copies_global_value() {
        let (cache, _, clock) = setup();
        cache.pin_session("u", Some("initial"));
        assert!(cache.session("u").is_none());

        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        clock.advance(Duration::from_secs(3));
        cache.pin_session("u", Some("initial"));

        let session = cache.session("u").unwrap();
        assert_eq!(session.value, 8.5);
        assert_eq!(session.interaction_count, 1);
        assert_eq!(session.timestamp_ms, clock.now_ms());
        assert_eq!(cache.stats().hits.l1, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired_sessions() {
        let (cache, _, clock) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("old"), None).await;

        clock.advance(Duration::from_secs(20));
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("new"), None).await;

        clock.advance(Duration::from_secs(45));
        assert_eq!(cache.cleanup_expired_sessions(), 1);
        assert!(cache.session("old").is_none());
        assert!(cache.session("new").is_some());
    }

    // ===== Maintenance Tests =====

    #[tokio::test]
    async fn test_clear_cache_by_tier() {
        let (cache, _, _) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("user-a"), None).await;

        cache.clear_cache(Some(CacheTier::Session));
        assert_eq!(cache.stats().sessions, 0);
        assert!(cache.stats().global_value.is_some());

        cache.clear_cache(Some(CacheTier::Global));
        assert!(cache.stats().global_value.is_none());
    }

    #[tokio::test]
    async fn test_clear_all_keeps_l3() {
        let (cache, store, _) = setup();
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("user-a"), None).await;

        cache.clear_cache(None);
        let stats = cache.stats();
        assert!(stats.global_value.is_none());
        assert_eq!(stats.sessions, 0);
        assert!(store.get("apy:cache").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stats_counts_hits() {
        let (cache, _, _) = setup();
        cache.get_apy(None, None).await;
        cache.set_fresh_apy(8.5, "primary").await.unwrap();
        cache.get_apy(Some("user-a"), None).await;
        cache.get_apy(Some("user-a"), None).await;

        let stats = cache.stats();
        assert_eq!(
            stats.hits,
            TierHits {
                l1: 1,
                l2: 1,
                l3: 0,
                l4: 1
            }
        );
        assert_eq!(stats.global_age_ms, Some(0));
    }

    #[test]
    fn test_static_value_lookup() {
        let clock = Arc::new(ManualClock::new(T0));
        let mut config = CacheConfig::default();
        config.static_values.insert("conservative".to_string(), 5.0);
        let cache = CacheSystem::new(config, Arc::new(DashMapApyStore::new(clock.clone())), clock);

        assert_eq!(cache.static_value("conservative"), 5.0);
        assert_eq!(cache.static_value("unknown"), 7.5);
    }
}
