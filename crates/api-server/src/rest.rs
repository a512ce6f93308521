//! REST API handlers for metrics queries and operational endpoints.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use storefront_alerts::AlertsManager;
use storefront_analytics::MetricsService;
use storefront_core::metrics::CategoryPerformance;
use storefront_core::{AnalyticsMetrics, Granularity, MetricsQueryParams};
use tracing::{info, warn};

/// Maximum string field length (user id, session id, cache pattern).
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsService>,
    pub alerts: Arc<AlertsManager>,
    pub node_id: String,
    pub start_time: Instant,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    metrics::counter!("api.validation_errors").increment(1);
    api_error(StatusCode::BAD_REQUEST, "invalid_request", message)
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub start_date: String,
    pub end_date: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub advanced: bool,
    pub granularity: Option<Granularity>,
}

#[derive(Debug, Deserialize)]
pub struct WindowQuery {
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Deserialize)]
pub struct CacheQuery {
    pub pattern: Option<String>,
}

fn check_len(field: &str, value: Option<&String>) -> Result<(), ApiError> {
    match value {
        Some(v) if v.is_empty() || v.len() > MAX_FIELD_LEN => Err(bad_request(format!(
            "'{field}' must be between 1 and {MAX_FIELD_LEN} characters"
        ))),
        _ => Ok(()),
    }
}

fn window(start: &str, end: &str) -> Result<MetricsQueryParams, ApiError> {
    MetricsQueryParams::from_bounds(start, end).map_err(|e| {
        warn!(start = %start, end = %end, error = %e, "Rejected metrics window");
        bad_request(e.to_string())
    })
}

/// GET /v1/metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Result<Json<AnalyticsMetrics>, ApiError> {
    check_len("user_id", query.user_id.as_ref())?;
    check_len("session_id", query.session_id.as_ref())?;

    let mut params = window(&query.start_date, &query.end_date)?;
    params.user_id = query.user_id;
    params.session_id = query.session_id;

    metrics::counter!("api.metrics_queries", "advanced" => if query.advanced { "true" } else { "false" })
        .increment(1);
    let result = state
        .metrics
        .get_metrics(&params, query.advanced, query.granularity)
        .await;
    Ok(Json(result))
}

/// GET /v1/metrics/categories
pub async fn get_category_performance(
    State(state): State<AppState>,
    Query(query): Query<WindowQuery>,
) -> Result<Json<Vec<CategoryPerformance>>, ApiError> {
    let params = window(&query.start_date, &query.end_date)?;
    Ok(Json(state.metrics.category_performance(&params).await))
}

/// DELETE /v1/metrics/cache drops entries matching `pattern`, or the
/// whole cache when no pattern is given.
pub async fn invalidate_cache(
    State(state): State<AppState>,
    Query(query): Query<CacheQuery>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    check_len("pattern", query.pattern.as_ref())?;

    match &query.pattern {
        Some(pattern) => state.metrics.invalidate_pattern(pattern).await,
        None => state.metrics.cache().clear().await,
    }
    info!(pattern = ?query.pattern, "Metrics cache invalidated");

    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted", "pattern": query.pattern })),
    ))
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        cached_entries: state.metrics.cache().local_len(),
    })
}

/// GET /ready. State is fully wired before the listener binds.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub cached_entries: usize,
}
