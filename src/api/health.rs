/// Health check endpoints for liveness and readiness probes
use crate::{context::AppContext, metrics};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Health status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,

    /// Application version
    pub version: String,

    /// Uptime in seconds
    pub uptime_seconds: f64,

    /// Store round trip in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_response_time_ms: Option<u64>,

    /// Optional message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(liveness))
        .route("/health/ready", get(readiness))
        .route("/metrics", get(render))
}

/// Liveness: the process is serving requests
async fn liveness(State(ctx): State<AppContext>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "healthy".to_string(),
        version: ctx.config.service.version.clone(),
        uptime_seconds: ctx.started_at.elapsed().as_secs_f64(),
        store_response_time_ms: None,
        message: None,
    })
}

/// Readiness: the store answers
async fn readiness(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthStatus>) {
    let start = Instant::now();
    let result = ctx.store.ping().await;
    let elapsed = start.elapsed().as_millis() as u64;

    let (code, status, message) = match result {
        Ok(()) => (StatusCode::OK, "healthy", None),
        Err(e) => {
            tracing::warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "unhealthy",
                Some("Store unavailable".to_string()),
            )
        }
    };

    (
        code,
        Json(HealthStatus {
            status: status.to_string(),
            version: ctx.config.service.version.clone(),
            uptime_seconds: ctx.started_at.elapsed().as_secs_f64(),
            store_response_time_ms: Some(elapsed),
            message,
        }),
    )
}

/// Prometheus text exposition
async fn render() -> String {
    metrics::render_metrics()
}
