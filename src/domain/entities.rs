//! Domain Entities - Core business objects
//!
//! These entities represent the values flowing through the APY pipeline:
//! cache entries per tier, raw source readings, fresh results and the
//! per-source health bookkeeping. They carry no I/O.

use crate::domain::value_objects::{CacheTier, Confidence};
use serde::{Deserialize, Serialize};

/// The single global hot entry (L1).
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalEntry {
    pub value: f64,
    /// Epoch milliseconds when the entry was written
    pub timestamp_ms: u64,
}

/// A per-user session entry (L2).
///
/// Keeps the value a user saw stable for the duration of one journey step.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEntry {
    pub user_id: String,
    /// Last journey state reported by the caller
    pub journey_state: Option<String>,
    pub value: f64,
    pub timestamp_ms: u64,
    /// Number of reads served for this user, including the creating read
    pub interaction_count: u32,
}

impl SessionEntry {
    /// Create a new session entry from a value served by a slower tier.
    pub fn new(
        user_id: impl Into<String>,
        journey_state: Option<String>,
        value: f64,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            journey_state,
            value,
            timestamp_ms,
            interaction_count: 1,
        }
    }

    /// Register another read, overwriting the journey state when given.
    pub fn touch(&mut self, journey_state: Option<&str>) {
        self.interaction_count = self.interaction_count.saturating_add(1);
        if let Some(state) = journey_state {
            self.journey_state = Some(state.to_string());
        }
    }
}

/// A snapshot as kept by the persisted store (L3 and the store-backed sources).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredApy {
    pub value: f64,
    pub base_component: f64,
    pub reward_component: f64,
    pub tvl: f64,
    /// Epoch milliseconds of the last write
    pub last_updated_ms: u64,
}

/// A value served by the cache, tagged with its tier and decayed confidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedApy {
    pub value: f64,
    pub timestamp_ms: u64,
    pub tier: CacheTier,
    pub confidence: Confidence,
}

/// Raw output of a single source before validation and scoring.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceReading {
    pub value: f64,
    /// When the underlying data was produced, if the source knows
    pub as_of_ms: Option<u64>,
}

impl SourceReading {
    /// A live reading with no age of its own.
    pub fn live(value: f64) -> Self {
        Self {
            value,
            as_of_ms: None,
        }
    }

    pub fn as_of(value: f64, as_of_ms: u64) -> Self {
        Self {
            value,
            as_of_ms: Some(as_of_ms),
        }
    }
}

/// A validated value obtained from one of the named sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreshApy {
    pub value: f64,
    /// Name of the source that produced the value
    pub source: String,
    pub confidence: Confidence,
    pub response_time_ms: u64,
    pub timestamp_ms: u64,
}

/// Health bookkeeping for one named source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceHealth {
    pub name: String,
    /// Lower is tried first
    pub priority: u8,
    /// Score in `[0, 1]`, higher is tried first within a priority
    pub health_score: f64,
    pub last_success_ms: Option<u64>,
    pub last_failure_ms: Option<u64>,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub last_response_time_ms: Option<u64>,
}

impl SourceHealth {
    /// Create a fresh record; unknown sources start fully healthy.
    pub fn new(name: impl Into<String>, priority: u8) -> Self {
        Self {
            name: name.into(),
            priority,
            health_score: 1.0,
            last_success_ms: None,
            last_failure_ms: None,
            total_calls: 0,
            successful_calls: 0,
            last_response_time_ms: None,
        }
    }

    /// Lifetime success ratio (1.0 before any call).
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            1.0
        } else {
            self.successful_calls as f64 / self.total_calls as f64
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    // ===== SessionEntry Tests =====

    #[test]
    fn test_session_entry_new() {
        let entry = SessionEntry::new(
            "user-1",
            Some("initial".to_string()),
            8.5,
            1_000,
        );

        assert_eq!(entry.user_id, "user-1");
        assert_eq!(entry.interaction_count, 1);
        assert_eq!(entry.journey_state.as_deref(), Some("initial"));
    }

    #[test]
    fn test_session_entry_touch_increments_and_overwrites_state() {
        let mut entry = SessionEntry::new("user-1", None, 8.5, 0);

        entry.touch(Some("confirm"));
        assert_eq!(entry.interaction_count, 2);
        assert_eq!(entry.journey_state.as_deref(), Some("confirm"));

        // No state given keeps the previous one
        entry.touch(None);
        assert_eq!(entry.interaction_count, 3);
        assert_eq!(entry.journey_state.as_deref(), Some("confirm"));
    }

    #[test]
    fn test_session_entry_touch_does_not_change_value() {
        let mut entry = SessionEntry::new("user-1", None, 8.5, 42);
        entry.touch(Some("next"));

        assert_eq!(entry.value, 8.5);
        assert_eq!(entry.timestamp_ms, 42);
    }

    // ===== SourceReading Tests =====

    #[test]
    fn test_source_reading_constructors() {
        assert_eq!(SourceReading::live(7.0).as_of_ms, None);
        assert_eq!(SourceReading::as_of(7.0, 99).as_of_ms, Some(99));
    }

    // ===== SourceHealth Tests =====

    #[test]
    fn test_source_health_new() {
        let health = SourceHealth::new("primary", 1);

        assert_eq!(health.name, "primary");
        assert_eq!(health.priority, 1);
        assert_eq!(health.health_score, 1.0);
        assert_eq!(health.total_calls, 0);
        assert!(health.last_success_ms.is_none());
    }

    #[test]
    fn test_source_health_success_rate() {
        let mut health = SourceHealth::new("primary", 1);
        assert_eq!(health.success_rate(), 1.0);

        health.total_calls = 4;
        health.successful_calls = 3;
        assert_eq!(health.success_rate(), 0.75);
    }

    // ===== StoredApy Tests =====

    #[test]
    fn test_stored_apy_serde() {
        let stored = StoredApy {
            value: 6.2,
            base_component: 4.0,
            reward_component: 2.2,
            tvl: 1_000_000.0,
            last_updated_ms: 1_700_000_000_000,
        };

        let json = serde_json::to_string(&stored).unwrap();
        let back: StoredApy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stored);
    }
}
