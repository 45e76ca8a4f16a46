//! apy-guard - resilient APY service
//!
//! This is the composition root that wires together all the components.

use apy_guard::adapters::inbound::ApiServer;
use apy_guard::adapters::outbound::{DashMapApyStore, HttpYieldProvider, SqliteApyStore, SystemClock};
use apy_guard::application::{
    ApyOrchestrator, CacheSystem, CrossProtocolSource, PersistedSource, PrimarySource, SourceManager,
    StaticSource,
};
use apy_guard::config::load_config;
use apy_guard::domain::ports::{ApySource, ApyStore, Clock};
use apy_guard::infrastructure::{shutdown_signal, CircuitBreaker, ShutdownController};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .init();

    tracing::info!(
        "starting apy-guard provider={} store={}",
        cfg.provider_url,
        cfg.db_path.as_deref().unwrap_or("memory")
    );

    // ===== COMPOSITION ROOT =====
    // Wire up all adapters and services

    // 1. Create outbound adapters
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Persisted store (SQLite, or in-memory when no path is set)
    let store: Arc<dyn ApyStore> = match &cfg.db_path {
        Some(path) => {
            let store = SqliteApyStore::open(path, clock.clone())?;
            tracing::info!("apy store opened at {}", path);
            Arc::new(store)
        }
        None => {
            tracing::info!("apy store is in-memory, snapshots are lost on restart");
            Arc::new(DashMapApyStore::new(clock.clone()))
        }
    };

    // Yield provider (HTTP)
    let provider = Arc::new(HttpYieldProvider::new(cfg.provider_config())?);

    // 2. Source chain, in priority order
    let sources: Vec<Arc<dyn ApySource>> = vec![
        Arc::new(PrimarySource::new(provider)),
        Arc::new(PersistedSource::new(store.clone(), cfg.latest_key.clone())),
        Arc::new(CrossProtocolSource::new(
            store.clone(),
            clock.clone(),
            &cfg.protocol_key_prefix,
            &cfg.protocols,
        )),
        Arc::new(StaticSource::new(cfg.static_apy)),
    ];

    // 3. Create application services
    let cache = Arc::new(CacheSystem::new(cfg.cache_config(), store, clock.clone()));
    let manager = Arc::new(SourceManager::new(sources, cfg.scoring_config(), clock.clone()));
    let breaker = Arc::new(CircuitBreaker::new("apy-fetch", cfg.breaker_config(), clock.clone()));
    let shutdown = ShutdownController::new();

    let orchestrator = ApyOrchestrator::new(
        cfg.orchestrator_config(),
        cache,
        manager,
        breaker,
        shutdown.clone(),
        clock,
    );
    orchestrator.start().await;

    // 4. Create inbound adapter
    if cfg.api_enabled {
        let server = ApiServer::new(cfg.api_listen_addr.clone(), orchestrator.clone());
        let server_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run(server_shutdown).await {
                tracing::error!("status API error: {:?}", e);
            }
        });
    }

    // 5. Run until signalled, then drain
    shutdown_signal(shutdown.clone()).await;
    let drained = orchestrator
        .drain(Duration::from_secs(cfg.drain_timeout_secs))
        .await;
    tracing::info!("apy-guard stopped (drained={})", drained);

    Ok(())
}
