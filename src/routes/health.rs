//! Health check endpoints for Kubernetes probes and monitoring.

use axum::{Json, extract::State, response::IntoResponse};
use http::StatusCode;
use serde::Serialize;

use crate::AppState;
#[cfg(feature = "prometheus")]
use crate::observability::metrics::get_prometheus_handle;

/// Detailed health status response.
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    pub version: String,
    pub subsystems: SubsystemStatus,
}

#[derive(Debug, Serialize)]
pub struct SubsystemStatus {
    pub database: ComponentStatus,
    pub cache: ComponentStatus,
}

/// Status of a single component.
#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Latency of the health check in milliseconds
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<&'static str>,
}

impl ComponentStatus {
    fn new(healthy: bool, failure: &str, start: std::time::Instant) -> Self {
        Self {
            healthy,
            message: (!healthy).then(|| failure.to_string()),
            latency_ms: start.elapsed().as_millis() as u64,
            backend: None,
        }
    }
}

async fn check_database(state: &AppState) -> ComponentStatus {
    let start = std::time::Instant::now();
    let healthy = state.db.health_check().await.is_ok();
    ComponentStatus::new(healthy, "Database connection failed", start)
}

async fn check_cache(state: &AppState) -> ComponentStatus {
    let start = std::time::Instant::now();
    let healthy = state.cache.get_counter("__health_check__").await.is_ok();
    ComponentStatus {
        backend: Some(state.cache.backend()),
        ..ComponentStatus::new(healthy, "Counter store connection failed", start)
    }
}

/// Full health check with subsystem status.
///
/// Admission cannot run without the counter store, so an unreachable cache
/// makes the service unhealthy.
#[tracing::instrument(name = "health.check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let subsystems = SubsystemStatus {
        database: check_database(&state).await,
        cache: check_cache(&state).await,
    };
    let healthy = subsystems.database.healthy && subsystems.cache.healthy;

    let health = HealthStatus {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subsystems,
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

/// Kubernetes liveness probe.
#[tracing::instrument(name = "health.liveness")]
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}

/// Kubernetes readiness probe. Ready once both stores answer.
#[tracing::instrument(name = "health.readiness", skip(state))]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.db.health_check().await.is_err()
        || state.cache.get_counter("__health_check__").await.is_err()
    {
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::OK
}

/// Prometheus metrics endpoint.
///
/// Returns metrics in Prometheus text format.
#[tracing::instrument(name = "health.metrics")]
pub async fn metrics() -> impl IntoResponse {
    #[cfg(feature = "prometheus")]
    {
        return match get_prometheus_handle() {
            Some(handle) => {
                let metrics: String = handle.render();
                (
                    StatusCode::OK,
                    [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                    metrics,
                )
            }
            None => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            ),
        };
    }
    #[cfg(not(feature = "prometheus"))]
    (
        StatusCode::NOT_FOUND,
        [("content-type", "text/plain")],
        "Prometheus metrics not enabled".to_string(),
    )
}
