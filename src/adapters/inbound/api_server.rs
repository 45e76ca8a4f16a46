//! Status & Admin API Server
//!
//! HTTP surface over the orchestrator: health report, APY lookups and
//! administrative actions (refresh, cache clear, health reset).

use crate::application::orchestrator::{ApyOrchestrator, ApyRequest};
use crate::domain::value_objects::{CacheTier, OverallHealth};
use crate::infrastructure::shutdown::ShutdownController;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Query parameters of `GET /apy`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApyQuery {
    pub user_id: Option<String>,
    pub journey_state: Option<String>,
    #[serde(default)]
    pub require_fresh: bool,
    pub timeout_ms: Option<u64>,
}

impl From<ApyQuery> for ApyRequest {
    fn from(query: ApyQuery) -> Self {
        ApyRequest {
            user_id: query.user_id,
            journey_state: query.journey_state,
            require_fresh: query.require_fresh,
            timeout: query.timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Query parameters of `POST /admin/cache/clear`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearQuery {
    pub tier: Option<String>,
}

/// API Server state.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: ApyOrchestrator,
}

/// Status & admin API server.
pub struct ApiServer {
    listen_addr: String,
    state: ApiState,
}

impl ApiServer {
    pub fn new(listen_addr: String, orchestrator: ApyOrchestrator) -> Self {
        Self {
            listen_addr,
            state: ApiState { orchestrator },
        }
    }

    /// Build the router with all routes.
    pub fn router(state: ApiState) -> Router {
        Router::new()
            // Health report
            .route("/health", get(health_handler))
            // APY lookup
            .route("/apy", get(apy_handler))
            // Administrative actions
            .route("/admin/refresh", post(refresh_handler))
            .route("/admin/cache/clear", post(clear_cache_handler))
            .route("/admin/health/reset", post(reset_health_handler))
            .with_state(state)
    }

    /// Run the API server until shutdown is signalled.
    #[cfg_attr(coverage_nightly, coverage(off))]
    pub async fn run(&self, shutdown: ShutdownController) -> anyhow::Result<()> {
        let app = Self::router(self.state.clone()).layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("status API listening on {}", self.listen_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }
}

// Handler functions

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let report = state.orchestrator.health_status();
    let status = match report.overall {
        OverallHealth::Critical => StatusCode::SERVICE_UNAVAILABLE,
        OverallHealth::Healthy | OverallHealth::Degraded => StatusCode::OK,
    };
    (status, Json(report))
}

async fn apy_handler(State(state): State<ApiState>, Query(query): Query<ApyQuery>) -> impl IntoResponse {
    Json(state.orchestrator.get_apy_detailed(query.into()).await)
}

async fn refresh_handler(State(state): State<ApiState>) -> impl IntoResponse {
    let response = state.orchestrator.force_refresh().await;
    tracing::info!("manual refresh got {} from {}", response.value, response.source);
    Json(response)
}

async fn clear_cache_handler(
    State(state): State<ApiState>,
    Query(query): Query<ClearQuery>,
) -> impl IntoResponse {
    let tier = match query.tier.as_deref() {
        None | Some("all") => None,
        Some(name) => match CacheTier::parse(name) {
            Some(tier) => Some(tier),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": format!("unknown cache tier '{}'", name)
                    })),
                );
            }
        },
    };

    state.orchestrator.clear_cache(tier);
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "cleared": tier.map(|t| t.as_str()).unwrap_or("all")
        })),
    )
}

async fn reset_health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    state.orchestrator.reset_health_metrics();
    Json(serde_json::json!({ "reset": true }))
}
