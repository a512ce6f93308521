//! REST handlers for alert evaluation, lifecycle and rule management.

use crate::rest::{api_error, ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::Value;
use storefront_alerts::{
    AlertConfig, AlertConfigUpdate, AlertStatistics, CategoryAlert, RuleDefinition, RuleUpdate,
    RuleView, DEFAULT_HISTORY_LIMIT,
};
use storefront_core::InsightsError;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

fn not_found(what: &str, id: &str) -> ApiError {
    api_error(StatusCode::NOT_FOUND, "not_found", format!("{what} '{id}' not found"))
}

/// POST /v1/alerts/evaluate: any JSON metrics snapshot.
pub async fn evaluate(
    State(state): State<AppState>,
    Json(snapshot): Json<Value>,
) -> Result<Json<Vec<CategoryAlert>>, ApiError> {
    if !snapshot.is_object() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "metrics snapshot must be a JSON object",
        ));
    }
    Ok(Json(state.alerts.evaluate_value(&snapshot).await))
}

/// GET /v1/alerts
pub async fn active(State(state): State<AppState>) -> Json<Vec<CategoryAlert>> {
    Json(state.alerts.active_alerts())
}

/// GET /v1/alerts/history
pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<CategoryAlert>> {
    Json(
        state
            .alerts
            .alert_history(query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)),
    )
}

/// GET /v1/alerts/stats
pub async fn statistics(State(state): State<AppState>) -> Json<AlertStatistics> {
    Json(state.alerts.statistics())
}

/// POST /v1/alerts/:id/resolve
pub async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if state.alerts.resolve_alert(&id) {
        info!(alert_id = %id, "Alert resolved via API");
        Ok(Json(serde_json::json!({ "id": id, "resolved": true })))
    } else {
        Err(not_found("active alert", &id))
    }
}

/// GET /v1/alerts/rules
pub async fn list_rules(State(state): State<AppState>) -> Json<Vec<RuleView>> {
    Json(state.alerts.rules())
}

/// POST /v1/alerts/rules
pub async fn create_rule(
    State(state): State<AppState>,
    Json(definition): Json<RuleDefinition>,
) -> Result<(StatusCode, Json<RuleView>), ApiError> {
    if definition.id.is_empty() || definition.metric_path.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "invalid_rule",
            "rule 'id' and 'metricPath' must not be empty",
        ));
    }
    let rule = definition.into_rule(state.alerts.default_cooldown_ms());
    let view = rule.view();
    match state.alerts.add_rule(rule) {
        Ok(()) => Ok((StatusCode::CREATED, Json(view))),
        Err(InsightsError::Validation(msg)) => {
            Err(api_error(StatusCode::CONFLICT, "rule_exists", msg))
        }
        Err(e) => Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "rule_create_failed",
            e.to_string(),
        )),
    }
}

/// PATCH /v1/alerts/rules/:id
pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<RuleUpdate>,
) -> Result<Json<RuleView>, ApiError> {
    state
        .alerts
        .update_rule(&id, update)
        .map(Json)
        .ok_or_else(|| not_found("rule", &id))
}

/// DELETE /v1/alerts/rules/:id
pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.alerts.remove_rule(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found("rule", &id))
    }
}

/// GET /v1/alerts/config
pub async fn get_config(State(state): State<AppState>) -> Json<AlertConfig> {
    Json(state.alerts.config())
}

/// PATCH /v1/alerts/config
pub async fn update_config(
    State(state): State<AppState>,
    Json(update): Json<AlertConfigUpdate>,
) -> Json<AlertConfig> {
    let config = state.alerts.update_config(update);
    info!(enabled = config.enabled, max_per_hour = config.max_alerts_per_hour, "Alert config updated");
    Json(config)
}

/// DELETE /v1/alerts/history
pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.alerts.clear_history();
    StatusCode::NO_CONTENT
}
