//! Scoring Service
//!
//! Pure domain logic for confidence decay and source health scores.
//! This service has NO external dependencies - it's pure Rust.

use crate::domain::value_objects::Confidence;
use std::time::Duration;

/// Tunable weights and bands used by [`Scoring`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringConfig {
    /// Weight of the success rate in the health score
    pub success_weight: f64,
    /// Weight of the response time score in the health score
    pub latency_weight: f64,
    /// Multiplier applied to the success rate after a failure
    pub failure_penalty: f64,
    /// Responses up to this are considered fast
    pub fast_response: Duration,
    /// Responses above this are considered slow
    pub slow_response: Duration,
    /// Responses above this are considered very slow
    pub very_slow_response: Duration,
    /// Confidence multiplier for responses slower than `fast_response`
    pub slow_confidence_factor: f64,
    /// Confidence multiplier for responses slower than `slow_response`
    pub very_slow_confidence_factor: f64,
    /// Confidence multiplier reached at the end of a freshness window
    pub stale_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            success_weight: 0.7,
            latency_weight: 0.3,
            failure_penalty: 0.8,
            fast_response: Duration::from_secs(1),
            slow_response: Duration::from_secs(3),
            very_slow_response: Duration::from_secs(5),
            slow_confidence_factor: 0.9,
            very_slow_confidence_factor: 0.7,
            stale_floor: 0.5,
        }
    }
}

/// Scoring functions shared by the cache and the source manager.
pub struct Scoring;

impl Scoring {
    /// Confidence of a cached value of the given age.
    ///
    /// `clamp(1 - age/ttl, 0, 1)`. A zero TTL yields zero confidence.
    /// Non-increasing in `age_ms` for a fixed `ttl`.
    pub fn tier_confidence(age_ms: u64, ttl: Duration) -> Confidence {
        let ttl_ms = ttl.as_millis() as f64;
        if ttl_ms <= 0.0 {
            return Confidence::ZERO;
        }
        Confidence::new(1.0 - age_ms as f64 / ttl_ms)
    }

    /// Score a response time in `[0, 1]`.
    ///
    /// Bands:
    /// - up to `fast_response`: 1.0
    /// - up to `slow_response`: 0.7
    /// - up to `very_slow_response`: 0.4
    /// - beyond: 0.1
    pub fn response_time_score(config: &ScoringConfig, response_ms: u64) -> f64 {
        let ms = response_ms as u128;
        if ms <= config.fast_response.as_millis() {
            1.0
        } else if ms <= config.slow_response.as_millis() {
            0.7
        } else if ms <= config.very_slow_response.as_millis() {
            0.4
        } else {
            0.1
        }
    }

    /// Health score after a successful attempt.
    pub fn health_after_success(config: &ScoringConfig, success_rate: f64, response_ms: u64) -> f64 {
        let score = config.success_weight * success_rate
            + config.latency_weight * Self::response_time_score(config, response_ms);
        score.clamp(0.0, 1.0)
    }

    /// Health score after a failed attempt.
    pub fn health_after_failure(config: &ScoringConfig, success_rate: f64) -> f64 {
        (success_rate * config.failure_penalty).clamp(0.0, 1.0)
    }

    /// Confidence of a validated source reading.
    ///
    /// Starts from the source's base confidence, then discounts slow
    /// responses and, for dated readings, decays linearly towards
    /// `stale_floor` across the freshness window.
    pub fn reading_confidence(
        config: &ScoringConfig,
        base: f64,
        response_ms: u64,
        staleness: Option<(u64, Duration)>,
    ) -> Confidence {
        let mut confidence = Confidence::new(base);

        let ms = response_ms as u128;
        if ms > config.slow_response.as_millis() {
            confidence = confidence.scale(config.very_slow_confidence_factor);
        } else if ms > config.fast_response.as_millis() {
            confidence = confidence.scale(config.slow_confidence_factor);
        }

        if let Some((age_ms, window)) = staleness {
            let window_ms = window.as_millis() as f64;
            let fraction = if window_ms <= 0.0 {
                1.0
            } else {
                (age_ms as f64 / window_ms).clamp(0.0, 1.0)
            };
            confidence = confidence.scale(1.0 - (1.0 - config.stale_floor) * fraction);
        }

        confidence
    }
}
