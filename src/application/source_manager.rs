//! Source Manager
//!
//! Tries the registered sources in `(priority asc, health desc)` order,
//! validates every reading and keeps per-source health up to date.

use crate::domain::entities::{FreshApy, SourceHealth, SourceReading};
use crate::domain::errors::ApyError;
use crate::domain::ports::{ApySource, Clock};
use crate::domain::services::{Scoring, ScoringConfig};
use crate::domain::value_objects::is_plausible_apy;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::time::Instant;

/// Prioritized, health-scored fallback chain of APY sources.
pub struct SourceManager {
    sources: Vec<Arc<dyn ApySource>>,
    health: DashMap<String, SourceHealth>,
    scoring: ScoringConfig,
    clock: Arc<dyn Clock>,
}

impl SourceManager {
    pub fn new(sources: Vec<Arc<dyn ApySource>>, scoring: ScoringConfig, clock: Arc<dyn Clock>) -> Self {
        let health = DashMap::new();
        for source in &sources {
            health.insert(
                source.name().to_string(),
                SourceHealth::new(source.name(), source.priority()),
            );
        }

        Self {
            sources,
            health,
            scoring,
            clock,
        }
    }

    /// Fetch from the first source that yields a valid value.
    ///
    /// Returns `AllSourcesExhausted` only when every source failed.
    pub async fn get_apy(&self) -> Result<FreshApy, ApyError> {
        let ordered = self.ordered_sources();

        for source in &ordered {
            let name = source.name();
            let started = Instant::now();
            let result = source.fetch().await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result.and_then(|reading| self.validate(source.as_ref(), reading)) {
                Ok(reading) => {
                    self.record_success(name, elapsed_ms);
                    let fresh = self.to_fresh(source.as_ref(), reading, elapsed_ms);
                    tracing::debug!(
                        "source {} returned {} in {}ms (confidence {})",
                        name,
                        fresh.value,
                        elapsed_ms,
                        fresh.confidence
                    );
                    return Ok(fresh);
                }
                Err(e) => {
                    self.record_failure(name, elapsed_ms);
                    tracing::warn!("source {} failed after {}ms: {}", name, elapsed_ms, e);
                }
            }
        }

        Err(ApyError::AllSourcesExhausted {
            attempted: ordered.len(),
        })
    }

    /// Health records, sorted by priority.
    pub fn health_snapshot(&self) -> Vec<SourceHealth> {
        let mut snapshot: Vec<SourceHealth> = self.health.iter().map(|e| e.value().clone()).collect();
        snapshot.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        snapshot
    }

    /// Forget all history; every source becomes fully healthy again.
    pub fn reset_health(&self) {
        for source in &self.sources {
            self.health.insert(
                source.name().to_string(),
                SourceHealth::new(source.name(), source.priority()),
            );
        }
        tracing::info!("source health reset for {} sources", self.sources.len());
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Sources in attempt order.
    fn ordered_sources(&self) -> Vec<Arc<dyn ApySource>> {
        let mut ordered: Vec<(f64, Arc<dyn ApySource>)> = self
            .sources
            .iter()
            .map(|s| (self.health_score(s.name()), s.clone()))
            .collect();

        ordered.sort_by(|(ha, a), (hb, b)| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| hb.total_cmp(ha))
        });

        ordered.into_iter().map(|(_, s)| s).collect()
    }

    fn health_score(&self, name: &str) -> f64 {
        self.health.get(name).map(|h| h.health_score).unwrap_or(1.0)
    }

    /// Reject implausible values and dated readings past the source window.
    fn validate(&self, source: &dyn ApySource, reading: SourceReading) -> Result<SourceReading, ApyError> {
        if !is_plausible_apy(reading.value) {
            return Err(ApyError::ImplausibleValue {
                name: source.name().to_string(),
                value: reading.value,
            });
        }

        if let (Some(as_of), Some(window)) = (reading.as_of_ms, source.freshness_window()) {
            let age_ms = self.clock.now_ms().saturating_sub(as_of);
            if age_ms > window.as_millis() as u64 {
                return Err(ApyError::StaleData {
                    name: source.name().to_string(),
                    age_ms,
                });
            }
        }

        Ok(reading)
    }

    fn to_fresh(&self, source: &dyn ApySource, reading: SourceReading, elapsed_ms: u64) -> FreshApy {
        let now = self.clock.now_ms();
        let staleness = reading
            .as_of_ms
            .zip(source.freshness_window())
            .map(|(as_of, window)| (now.saturating_sub(as_of), window));

        FreshApy {
            value: reading.value,
            source: source.name().to_string(),
            confidence: Scoring::reading_confidence(
                &self.scoring,
                source.base_confidence(),
                elapsed_ms,
                staleness,
            ),
            response_time_ms: elapsed_ms,
            timestamp_ms: now,
        }
    }

    fn record_success(&self, name: &str, elapsed_ms: u64) {
        let now = self.clock.now_ms();
        let mut health = self
            .health
            .entry(name.to_string())
            .or_insert_with(|| SourceHealth::new(name, u8::MAX));

        health.total_calls += 1;
        health.successful_calls += 1;
        health.last_success_ms = Some(now);
        health.last_response_time_ms = Some(elapsed_ms);
        let rate = health.success_rate();
        health.health_score = Scoring::health_after_success(&self.scoring, rate, elapsed_ms);
    }

    fn record_failure(&self, name: &str, elapsed_ms: u64) {
        let now = self.clock.now_ms();
        let mut health = self
            .health
            .entry(name.to_string())
            .or_insert_with(|| SourceHealth::new(name, u8::MAX));

        health.total_calls += 1;
        health.last_failure_ms = Some(now);
        health.last_response_time_ms = Some(elapsed_ms);
        let rate = health.success_rate();
        health.health_score = Scoring::health_after_failure(&self.scoring, rate);
    }
}
