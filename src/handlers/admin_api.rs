//! Admin/reporting API over the telemetry stores
//!
//! Thin axum surface: handlers only invoke the stores' public operations and
//! add no storage semantics. The parent gateway nests [`routes`] under its
//! admin scope.

use crate::request_log::{RequestLog, RequestLogStore};
use crate::request_stats::{RequestStatsStore, StatsReport};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state for the telemetry API
#[derive(Clone)]
pub struct TelemetryState {
    pub request_logs: Arc<RequestLogStore>,
    pub request_stats: Arc<RequestStatsStore>,
}

/// Query parameters for the request listing
#[derive(Debug, Deserialize)]
pub struct RequestsQueryParams {
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

/// Query parameters for the stats report
#[derive(Debug, Deserialize)]
pub struct StatsQueryParams {
    /// Hourly window size
    #[serde(default = "default_hours")]
    pub hours: usize,

    /// Daily window size
    #[serde(default = "default_days")]
    pub days: usize,
}

fn default_hours() -> usize {
    24
}

fn default_days() -> usize {
    7
}

/// Response for the request listing
#[derive(Debug, Serialize)]
pub struct RequestsResponse {
    pub total: usize,
    pub logs: Vec<RequestLog>,
}

/// GET /api/v1/requests - Most recent proxied requests, newest first
///
/// Example: GET /api/v1/requests?limit=50
pub async fn get_requests(
    State(state): State<TelemetryState>,
    Query(params): Query<RequestsQueryParams>,
) -> Json<RequestsResponse> {
    let logs = state.request_logs.list(params.limit).await;

    Json(RequestsResponse {
        total: logs.len(),
        logs,
    })
}

/// DELETE /api/v1/requests - Drop all request records
pub async fn clear_requests(State(state): State<TelemetryState>) -> Json<serde_json::Value> {
    state.request_logs.clear().await;

    Json(serde_json::json!({ "cleared": true }))
}

/// GET /api/v1/stats - Hourly/daily series, top models, and summary
///
/// Example: GET /api/v1/stats?hours=24&days=7
pub async fn get_stats(
    State(state): State<TelemetryState>,
    Query(params): Query<StatsQueryParams>,
) -> Json<StatsReport> {
    Json(state.request_stats.query(params.hours, params.days).await)
}

/// DELETE /api/v1/stats - Reset all counters
pub async fn reset_stats(State(state): State<TelemetryState>) -> Json<serde_json::Value> {
    state.request_stats.reset().await;

    Json(serde_json::json!({ "reset": true }))
}

/// Health check endpoint for the telemetry API
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "component": "telemetry-api"
        })),
    )
}

/// Build the telemetry admin router over the two stores.
pub fn routes(state: TelemetryState) -> Router {
    Router::new()
        .route("/api/v1/requests", get(get_requests).delete(clear_requests))
        .route("/api/v1/stats", get(get_stats).delete(reset_stats))
        .route("/api/v1/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit() {
        assert_eq!(default_limit(), 100);
    }

    #[test]
    fn test_query_params_defaults() {
        let params: RequestsQueryParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.limit, 100);

        let params: StatsQueryParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.hours, 24);
        assert_eq!(params.days, 7);
    }
}
