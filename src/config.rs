use crate::adapters::outbound::HttpProviderConfig;
use crate::application::cache_system::{CacheConfig, DEFAULT_STATIC_KEY};
use crate::application::orchestrator::OrchestratorConfig;
use crate::domain::services::ScoringConfig;
use crate::domain::value_objects::is_plausible_apy;
use crate::infrastructure::{CircuitBreakerConfig, RefreshSchedulerConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Config {
    pub debug: bool,

    // Status / admin API
    pub api_enabled: bool,
    pub api_listen_addr: String,

    // Yield provider
    pub provider_url: String,
    pub provider_field: String,
    pub provider_timeout_ms: u64,

    // Persisted store (in-memory when unset)
    pub db_path: Option<String>,
    pub latest_key: String,
    pub cache_key: String,
    pub protocol_key_prefix: String,
    pub protocols: Vec<String>,

    // Cache tiers
    pub global_ttl_secs: u64,
    pub session_ttl_secs: u64,
    pub persisted_ttl_secs: u64,
    pub static_apy: f64,

    // Circuit breaker
    pub breaker_failure_threshold: u32,
    pub breaker_recovery_secs: u64,
    pub breaker_window_secs: u64,
    pub breaker_success_threshold: u32,

    // Orchestrator
    pub request_timeout_ms: u64,
    pub emergency_apy: f64,
    pub refresh_interval_secs: u64,
    pub session_cleanup_secs: u64,
    pub drain_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            api_enabled: false,
            api_listen_addr: "0.0.0.0:8090".to_string(),
            provider_url: "http://localhost:8080/apy".to_string(),
            provider_field: "apy".to_string(),
            provider_timeout_ms: 3000,
            db_path: None,
            latest_key: "apy:latest".to_string(),
            cache_key: "apy:cache".to_string(),
            protocol_key_prefix: "apy:protocol:".to_string(),
            protocols: Vec::new(),
            global_ttl_secs: 30,
            session_ttl_secs: 60,
            persisted_ttl_secs: 300,
            static_apy: 7.5,
            breaker_failure_threshold: 5,
            breaker_recovery_secs: 30,
            breaker_window_secs: 60,
            breaker_success_threshold: 3,
            request_timeout_ms: 5000,
            emergency_apy: 7.5,
            refresh_interval_secs: 60,
            session_cleanup_secs: 120,
            drain_timeout_secs: 10,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("{name} value {value} is outside (0, 50]")]
    Implausible { name: &'static str, value: f64 },
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("breaker_failure_threshold", self.breaker_failure_threshold as u64),
            ("breaker_success_threshold", self.breaker_success_threshold as u64),
            ("provider_timeout_ms", self.provider_timeout_ms),
            ("global_ttl_secs", self.global_ttl_secs),
            ("session_ttl_secs", self.session_ttl_secs),
            ("persisted_ttl_secs", self.persisted_ttl_secs),
            ("breaker_window_secs", self.breaker_window_secs),
            ("request_timeout_ms", self.request_timeout_ms),
            ("refresh_interval_secs", self.refresh_interval_secs),
            ("session_cleanup_secs", self.session_cleanup_secs),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }

        for (name, value) in [("latest_key", &self.latest_key), ("cache_key", &self.cache_key)] {
            if value.is_empty() {
                return Err(ConfigError::Empty(name));
            }
        }

        for (name, value) in [("static_apy", self.static_apy), ("emergency_apy", self.emergency_apy)] {
            if !is_plausible_apy(value) {
                return Err(ConfigError::Implausible { name, value });
            }
        }

        Ok(())
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            recovery_timeout: Duration::from_secs(self.breaker_recovery_secs),
            monitoring_window: Duration::from_secs(self.breaker_window_secs),
            success_threshold: self.breaker_success_threshold,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        let mut static_values = HashMap::new();
        static_values.insert(DEFAULT_STATIC_KEY.to_string(), self.static_apy);

        CacheConfig {
            global_ttl: Duration::from_secs(self.global_ttl_secs),
            session_ttl: Duration::from_secs(self.session_ttl_secs),
            persisted_ttl: Duration::from_secs(self.persisted_ttl_secs),
            persisted_key: self.cache_key.clone(),
            latest_key: self.latest_key.clone(),
            static_values,
            ..Default::default()
        }
    }

    pub fn scoring_config(&self) -> ScoringConfig {
        ScoringConfig::default()
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            emergency_value: self.emergency_apy,
            scheduler: RefreshSchedulerConfig {
                refresh_interval: Duration::from_secs(self.refresh_interval_secs),
                cleanup_interval: Duration::from_secs(self.session_cleanup_secs),
            },
            ..Default::default()
        }
    }

    pub fn provider_config(&self) -> HttpProviderConfig {
        HttpProviderConfig {
            url: self.provider_url.clone(),
            field: self.provider_field.clone(),
            timeout: Duration::from_millis(self.provider_timeout_ms),
        }
    }
}

pub fn load_config() -> anyhow::Result<Config> {
    let config = load_config_from(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Build a config from any variable lookup; unparsable values fall back to defaults.
pub fn load_config_from<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = Config::default();

    let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
    let flag = |key: &str| {
        lookup(key)
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false)
    };

    fn parsed<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
        value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    }

    Config {
        debug: lookup("DEBUG").is_some(),

        api_enabled: flag("APY_API_ENABLED"),
        api_listen_addr: string("APY_API_LISTEN_ADDR", &defaults.api_listen_addr),

        provider_url: string("APY_PROVIDER_URL", &defaults.provider_url),
        provider_field: string("APY_PROVIDER_FIELD", &defaults.provider_field),
        provider_timeout_ms: parsed(lookup("APY_PROVIDER_TIMEOUT_MS"), defaults.provider_timeout_ms),

        db_path: lookup("APY_DB_PATH").filter(|p| !p.is_empty()),
        latest_key: string("APY_LATEST_KEY", &defaults.latest_key),
        cache_key: string("APY_CACHE_KEY", &defaults.cache_key),
        protocol_key_prefix: string("APY_PROTOCOL_KEY_PREFIX", &defaults.protocol_key_prefix),
        protocols: lookup("APY_PROTOCOLS")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),

        global_ttl_secs: parsed(lookup("APY_L1_TTL_SECS"), defaults.global_ttl_secs),
        session_ttl_secs: parsed(lookup("APY_L2_TTL_SECS"), defaults.session_ttl_secs),
        persisted_ttl_secs: parsed(lookup("APY_L3_TTL_SECS"), defaults.persisted_ttl_secs),
        static_apy: parsed(lookup("APY_STATIC_VALUE"), defaults.static_apy),

        breaker_failure_threshold: parsed(
            lookup("APY_BREAKER_FAILURE_THRESHOLD"),
            defaults.breaker_failure_threshold,
        ),
        breaker_recovery_secs: parsed(lookup("APY_BREAKER_RECOVERY_SECS"), defaults.breaker_recovery_secs),
        breaker_window_secs: parsed(lookup("APY_BREAKER_WINDOW_SECS"), defaults.breaker_window_secs),
        breaker_success_threshold: parsed(
            lookup("APY_BREAKER_SUCCESS_THRESHOLD"),
            defaults.breaker_success_threshold,
        ),

        request_timeout_ms: parsed(lookup("APY_REQUEST_TIMEOUT_MS"), defaults.request_timeout_ms),
        emergency_apy: parsed(lookup("APY_EMERGENCY_VALUE"), defaults.emergency_apy),
        refresh_interval_secs: parsed(lookup("APY_REFRESH_INTERVAL_SECS"), defaults.refresh_interval_secs),
        session_cleanup_secs: parsed(lookup("APY_SESSION_CLEANUP_SECS"), defaults.session_cleanup_secs),
        drain_timeout_secs: parsed(lookup("APY_DRAIN_TIMEOUT_SECS"), defaults.drain_timeout_secs),
    }
}
