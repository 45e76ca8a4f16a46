//! APY Orchestrator - main application use case
//!
//! Answers every APY request, always:
//! 1. Races the request against its deadline (emergency constant on timeout)
//! 2. Serves the cache when it is confident enough
//! 3. Otherwise fetches fresh through the circuit breaker, falling back to
//!    the best cached value
//! 4. Writes confident fresh values back into the cache
//!
//! A background scheduler drives the same fresh path on an interval.

use crate::application::cache_system::{CacheStats, CacheSystem};
use crate::application::source_manager::SourceManager;
use crate::domain::entities::{CachedApy, FreshApy, SourceHealth};
use crate::domain::ports::Clock;
use crate::domain::value_objects::{CacheTier, Confidence, OverallHealth};
use crate::infrastructure::circuit_breaker::{CircuitBreaker, CircuitMetrics, CircuitState};
use crate::infrastructure::refresh_scheduler::{RefreshScheduler, RefreshSchedulerConfig};
use crate::infrastructure::shutdown::ShutdownController;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Journey state that earns one cache retry before settling for L4.
pub const INITIAL_JOURNEY_STATE: &str = "initial";

/// Orchestrator configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Deadline for requests that do not set their own
    pub request_timeout: Duration,
    /// Cached values above this confidence are served without a fetch
    pub cache_confidence_threshold: f64,
    /// Fresh values above this confidence are written back to the cache
    pub write_back_threshold: f64,
    /// Multiplier applied to a cached value served by the breaker fallback
    pub fallback_confidence_factor: f64,
    /// Value returned when a request misses its deadline
    pub emergency_value: f64,
    pub emergency_confidence: f64,
    /// Wait before the initial-journey cache retry
    pub initial_retry_delay: Duration,
    /// Success rate below which health is degraded
    pub degraded_success_rate: f64,
    /// Success rate below which health is critical
    pub critical_success_rate: f64,
    /// Average latency above which health is degraded
    pub degraded_latency: Duration,
    /// Average latency above which health is critical
    pub critical_latency: Duration,
    pub scheduler: RefreshSchedulerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            cache_confidence_threshold: 0.7,
            write_back_threshold: 0.8,
            fallback_confidence_factor: 0.8,
            emergency_value: 7.5,
            emergency_confidence: 0.1,
            initial_retry_delay: Duration::from_secs(1),
            degraded_success_rate: 0.95,
            critical_success_rate: 0.8,
            degraded_latency: Duration::from_secs(2),
            critical_latency: Duration::from_secs(5),
            scheduler: RefreshSchedulerConfig::default(),
        }
    }
}

/// A detailed APY request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApyRequest {
    pub user_id: Option<String>,
    pub journey_state: Option<String>,
    /// Skip the cache fast path
    pub require_fresh: bool,
    /// Overrides the configured request timeout
    pub timeout: Option<Duration>,
}

/// Options of the simple `get_apy` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub require_fresh: bool,
    pub timeout: Option<Duration>,
}

/// How a response was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    /// Cache tier that served the value, if any
    pub tier: Option<CacheTier>,
    pub circuit_state: CircuitState,
    /// Served by the breaker fallback
    pub fallback: bool,
    /// Served the emergency constant after a timeout
    pub emergency: bool,
    pub user_id: Option<String>,
    pub journey_state: Option<String>,
}

/// A detailed APY answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApyResponse {
    pub value: f64,
    /// Source name, `cache:<tier>` for cache hits, or `emergency`
    pub source: String,
    pub confidence: Confidence,
    pub response_time_ms: u64,
    pub timestamp_ms: u64,
    /// Whether the value came from the cache
    pub cached: bool,
    pub metadata: ResponseMetadata,
}

/// Lifetime request counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub total_response_time_ms: u64,
    pub timeouts: u64,
    pub fallbacks: u64,
}

impl RequestStats {
    /// Success ratio (1.0 before any request).
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }

    pub fn average_response_time_ms(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_response_time_ms as f64 / self.total_requests as f64
        }
    }

    /// Classify overall health; critical wins over degraded.
    pub fn overall_health(&self, config: &OrchestratorConfig) -> OverallHealth {
        let rate = self.success_rate();
        let latency = self.average_response_time_ms();

        if rate < config.critical_success_rate || latency > config.critical_latency.as_millis() as f64 {
            OverallHealth::Critical
        } else if rate < config.degraded_success_rate
            || latency > config.degraded_latency.as_millis() as f64
        {
            OverallHealth::Degraded
        } else {
            OverallHealth::Healthy
        }
    }
}

#[derive(Debug, Default)]
struct RequestCounters {
    total: AtomicU64,
    successful: AtomicU64,
    response_time_ms: AtomicU64,
    timeouts: AtomicU64,
    fallbacks: AtomicU64,
}

impl RequestCounters {
    fn snapshot(&self) -> RequestStats {
        RequestStats {
            total_requests: self.total.load(Ordering::Relaxed),
            successful_requests: self.successful.load(Ordering::Relaxed),
            total_response_time_ms: self.response_time_ms.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.total,
            &self.successful,
            &self.response_time_ms,
            &self.timeouts,
            &self.fallbacks,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Aggregate status of the subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub overall: OverallHealth,
    pub sources: Vec<SourceHealth>,
    pub cache: CacheStats,
    pub breaker: CircuitMetrics,
    pub uptime_secs: u64,
    pub requests: RequestStats,
    /// Requests currently inside `get_apy_detailed`
    pub in_flight_requests: usize,
}

/// Result of the breaker-protected fetch.
enum Fetched {
    Fresh(FreshApy),
    Fallback(CachedApy),
}

/// The request pipeline; cheap to clone into spawned tasks.
#[derive(Clone)]
struct Pipeline {
    config: Arc<OrchestratorConfig>,
    cache: Arc<CacheSystem>,
    sources: Arc<SourceManager>,
    breaker: Arc<CircuitBreaker>,
    clock: Arc<dyn Clock>,
}

impl Pipeline {
    async fn run(&self, request: ApyRequest) -> ApyResponse {
        let user_id = request.user_id.as_deref();
        let journey_state = request.journey_state.as_deref();

        if !request.require_fresh {
            let cached = self.cache.get_apy(user_id, journey_state).await;
            if cached.confidence.value() > self.config.cache_confidence_threshold {
                tracing::debug!(
                    "serving {} from cache {} (confidence {})",
                    cached.value,
                    cached.tier,
                    cached.confidence
                );
                return self.cached_response(cached, false, &request);
            }
        }

        match self.fetch_fresh(user_id, journey_state).await {
            Fetched::Fresh(fresh) => {
                if fresh.confidence.value() > self.config.write_back_threshold {
                    // The L3 write runs detached
                    drop(self.cache.set_fresh_apy(fresh.value, &fresh.source));
                    if let Some(user) = user_id {
                        self.cache.pin_session(user, journey_state);
                    }
                }
                self.fresh_response(fresh, &request)
            }
            Fetched::Fallback(cached) => self.cached_response(cached, true, &request),
        }
    }

    /// `run` bounded by the request timeout, for callers without their own race.
    async fn run_bounded(&self, request: ApyRequest) -> ApyResponse {
        let timeout = request.timeout.unwrap_or(self.config.request_timeout);
        match tokio::time::timeout(timeout, self.run(request.clone())).await {
            Ok(response) => response,
            Err(_) => {
                tracing::warn!("apy refresh timed out after {}ms", timeout.as_millis());
                self.emergency_response(&request)
            }
        }
    }

    async fn fetch_fresh(&self, user_id: Option<&str>, journey_state: Option<&str>) -> Fetched {
        self.breaker
            .execute(
                || async { self.sources.get_apy().await.map(Fetched::Fresh) },
                || self.fallback(user_id, journey_state),
            )
            .await
    }

    /// Best cached value at reduced confidence.
    ///
    /// An initial journey step that would get the static constant waits
    /// once for a concurrent refresh to land.
    async fn fallback(&self, user_id: Option<&str>, journey_state: Option<&str>) -> Fetched {
        let mut cached = self.cache.get_apy(user_id, journey_state).await;

        if journey_state == Some(INITIAL_JOURNEY_STATE) && cached.tier == CacheTier::Static {
            tokio::time::sleep(self.config.initial_retry_delay).await;
            cached = self.cache.get_apy(user_id, journey_state).await;
        }

        cached.confidence = cached.confidence.scale(self.config.fallback_confidence_factor);
        tracing::debug!("fallback serving {} from cache {}", cached.value, cached.tier);
        Fetched::Fallback(cached)
    }

    fn cached_response(&self, cached: CachedApy, fallback: bool, request: &ApyRequest) -> ApyResponse {
        ApyResponse {
            value: cached.value,
            source: format!("cache:{}", cached.tier.as_str()),
            confidence: cached.confidence,
            response_time_ms: 0,
            timestamp_ms: cached.timestamp_ms,
            cached: true,
            metadata: self.metadata(Some(cached.tier), fallback, false, request),
        }
    }

    fn fresh_response(&self, fresh: FreshApy, request: &ApyRequest) -> ApyResponse {
        ApyResponse {
            value: fresh.value,
            source: fresh.source,
            confidence: fresh.confidence,
            response_time_ms: fresh.response_time_ms,
            timestamp_ms: fresh.timestamp_ms,
            cached: false,
            metadata: self.metadata(None, false, false, request),
        }
    }

    fn emergency_response(&self, request: &ApyRequest) -> ApyResponse {
        ApyResponse {
            value: self.config.emergency_value,
            source: "emergency".to_string(),
            confidence: Confidence::new(self.config.emergency_confidence),
            response_time_ms: 0,
            timestamp_ms: self.clock.now_ms(),
            cached: false,
            metadata: self.metadata(None, false, true, request),
        }
    }

    fn metadata(
        &self,
        tier: Option<CacheTier>,
        fallback: bool,
        emergency: bool,
        request: &ApyRequest,
    ) -> ResponseMetadata {
        ResponseMetadata {
            tier,
            circuit_state: self.breaker.state(),
            fallback,
            emergency,
            user_id: request.user_id.clone(),
            journey_state: request.journey_state.clone(),
        }
    }
}

/// Top-level entry point of the APY subsystem.
///
/// Built once at the composition root; clones share all state.
#[derive(Clone)]
pub struct ApyOrchestrator {
    pipeline: Pipeline,
    scheduler: Arc<RefreshScheduler>,
    shutdown: ShutdownController,
    counters: Arc<RequestCounters>,
    started_ms: u64,
}

impl ApyOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        cache: Arc<CacheSystem>,
        sources: Arc<SourceManager>,
        breaker: Arc<CircuitBreaker>,
        shutdown: ShutdownController,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let scheduler = RefreshScheduler::new(config.scheduler.clone(), shutdown.clone());
        let started_ms = clock.now_ms();

        Self {
            pipeline: Pipeline {
                config: Arc::new(config),
                cache,
                sources,
                breaker,
                clock,
            },
            scheduler: Arc::new(scheduler),
            shutdown,
            counters: Arc::new(RequestCounters::default()),
            started_ms,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.pipeline.config
    }

    /// Pre-warm the cache, then start the background refresh.
    pub async fn start(&self) {
        let warm = self.force_refresh().await;
        tracing::info!(
            "apy pre-warm served {} from {} (confidence {})",
            warm.value,
            warm.source,
            warm.confidence
        );

        let pipeline = self.pipeline.clone();
        let cache = self.pipeline.cache.clone();
        self.scheduler.start(
            move || {
                let pipeline = pipeline.clone();
                async move {
                    let response = pipeline.run_bounded(Self::refresh_request()).await;
                    tracing::debug!("background refresh got {} from {}", response.value, response.source);
                }
            },
            move || {
                cache.cleanup_expired_sessions();
            },
        );
    }

    /// The current APY. Never fails.
    pub async fn get_apy(
        &self,
        user_id: Option<&str>,
        journey_state: Option<&str>,
        options: RequestOptions,
    ) -> f64 {
        self.get_apy_detailed(ApyRequest {
            user_id: user_id.map(str::to_string),
            journey_state: journey_state.map(str::to_string),
            require_fresh: options.require_fresh,
            timeout: options.timeout,
        })
        .await
        .value
    }

    /// The current APY with provenance. Never fails.
    ///
    /// The pipeline runs on its own task; a timed-out request returns the
    /// emergency constant while the pipeline keeps going.
    pub async fn get_apy_detailed(&self, request: ApyRequest) -> ApyResponse {
        let _guard = self.shutdown.track_request();
        let started = Instant::now();
        let timeout = request.timeout.unwrap_or(self.pipeline.config.request_timeout);
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let pipeline = self.pipeline.clone();
        let task_request = request.clone();
        let task = tokio::spawn(async move { pipeline.run(task_request).await });

        let mut response = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::error!("apy pipeline task failed: {}", e);
                self.pipeline.emergency_response(&request)
            }
            Err(_) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "apy request timed out after {}ms, serving emergency value",
                    timeout.as_millis()
                );
                self.pipeline.emergency_response(&request)
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        response.response_time_ms = elapsed_ms;
        self.counters
            .response_time_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);

        if response.metadata.fallback {
            self.counters.fallbacks.fetch_add(1, Ordering::Relaxed);
        } else if !response.metadata.emergency {
            self.counters.successful.fetch_add(1, Ordering::Relaxed);
        }

        response
    }

    /// Fetch fresh now, bypassing the cache fast path.
    ///
    /// Bounded by the request timeout; a refresh that overruns it is
    /// abandoned and answered with the emergency constant.
    pub async fn force_refresh(&self) -> ApyResponse {
        self.pipeline.run_bounded(Self::refresh_request()).await
    }

    /// Clear L1 and L2.
    pub fn clear_all_caches(&self) {
        self.clear_cache(None);
    }

    /// Clear a single cache tier, or all in-memory tiers.
    pub fn clear_cache(&self, tier: Option<CacheTier>) {
        self.pipeline.cache.clear_cache(tier);
    }

    /// Reset request counters, the breaker and all source health.
    pub fn reset_health_metrics(&self) {
        self.counters.reset();
        self.pipeline.breaker.reset();
        self.pipeline.sources.reset_health();
        tracing::info!("apy health metrics reset");
    }

    /// Stop the background refresh. Idempotent.
    pub fn shutdown(&self) {
        if self.scheduler.stop() {
            tracing::info!("apy orchestrator shut down");
        }
    }

    /// Stop the background refresh, signal shutdown and wait for in-flight
    /// requests. Returns false if some were still running after `timeout`.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.shutdown();
        self.shutdown.shutdown();
        let drained = self.shutdown.drain(timeout).await;
        tracing::info!("apy orchestrator drained={}", drained);
        drained
    }

    pub fn is_refreshing(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn request_stats(&self) -> RequestStats {
        self.counters.snapshot()
    }

    pub fn health_status(&self) -> HealthReport {
        let requests = self.counters.snapshot();
        let now = self.pipeline.clock.now_ms();

        HealthReport {
            overall: requests.overall_health(&self.pipeline.config),
            sources: self.pipeline.sources.health_snapshot(),
            cache: self.pipeline.cache.stats(),
            breaker: self.pipeline.breaker.metrics(),
            uptime_secs: now.saturating_sub(self.started_ms) / 1000,
            requests,
            in_flight_requests: self.shutdown.in_flight(),
        }
    }

    fn refresh_request() -> ApyRequest {
        ApyRequest {
            require_fresh: true,
            ..Default::default()
        }
    }
}
