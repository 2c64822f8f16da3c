use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;
use utoipa::OpenApi;
use uuid::Uuid;

use super::{
    dto::{deserialize_utc_opt, AlertDto, IngestResponse, SensorDataOut, SensorDataPayload},
    errors::AppError,
    AppState,
};
use crate::{
    db::models::{AlertFilter, AlertSeverity},
    ingest::HistoryQuery,
};

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default, deserialize_with = "deserialize_utc_opt")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "deserialize_utc_opt")]
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AlertParams {
    /// Defaults to `true`; `false` also returns acknowledged alerts.
    pub active_only: Option<bool>,
    pub severity: Option<AlertSeverity>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Ingest one reading for the sensor identified by `external_id` and
/// evaluate its thresholds.
#[utoipa::path(
    post,
    path = "/api/sensors/{external_id}/data",
    params(
        ("external_id" = String, Path, description = "External sensor identifier, e.g. SENS-002"),
    ),
    request_body = SensorDataPayload,
    responses(
        (status = 200, description = "Reading stored", body = IngestResponse),
        (status = 404, description = "Unknown sensor"),
        (status = 422, description = "Malformed body"),
        (status = 500, description = "Storage failure"),
    ),
    tag = "sensors"
)]
pub async fn ingest_sensor_data(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    Json(payload): Json<SensorDataPayload>,
) -> Result<Json<IngestResponse>, AppError> {
    if let Some(body_id) = payload.sensor_id.as_deref().filter(|id| *id != external_id) {
        debug!(external_id = %external_id, body_sensor_id = %body_id, "Ignoring sensor_id from body");
    }

    let outcome = state
        .gateway
        .ingest(&external_id, payload.value, &payload.unit, payload.timestamp)
        .await?;

    Ok(Json(IngestResponse::success(outcome.reading_id)))
}

/// Reading history for a sensor, newest first. Optionally filter with
/// `?from=<ISO 8601>&to=<ISO 8601>`; `limit` defaults to 100.
#[utoipa::path(
    get,
    path = "/api/sensors/{external_id}/data",
    params(
        ("external_id" = String, Path, description = "External sensor identifier"),
        ("from"  = Option<DateTime<Utc>>, Query, description = "Start of time range (ISO 8601, UTC when no offset; inclusive)"),
        ("to"    = Option<DateTime<Utc>>, Query, description = "End of time range (ISO 8601, UTC when no offset; inclusive)"),
        ("limit" = Option<i64>, Query, description = "Maximum rows, 1..=1000 (default 100)"),
    ),
    responses(
        (status = 200, description = "Sensor readings", body = Vec<SensorDataOut>),
        (status = 404, description = "Unknown sensor"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "sensors"
)]
pub async fn get_sensor_history(
    State(state): State<AppState>,
    Path(external_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<SensorDataOut>>, AppError> {
    let query = HistoryQuery { from: params.from, to: params.to, limit: params.limit };
    let rows = state.gateway.history(&external_id, &query).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// List alerts, newest first. Only open alerts unless `active_only=false`.
#[utoipa::path(
    get,
    path = "/api/alerts",
    params(
        ("active_only" = Option<bool>, Query, description = "Only open alerts (default true)"),
        ("severity" = Option<AlertSeverity>, Query, description = "Filter by severity"),
    ),
    responses(
        (status = 200, description = "Alerts", body = Vec<AlertDto>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "alerts"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(params): Query<AlertParams>,
) -> Result<Json<Vec<AlertDto>>, AppError> {
    let filter = AlertFilter {
        active: params.active_only.unwrap_or(true).then_some(true),
        severity: params.severity,
    };
    let rows = state.alerts.list(&filter).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Close an alert. Repeated acknowledgements keep the first timestamp.
#[utoipa::path(
    post,
    path = "/api/alerts/{id}/acknowledge",
    params(
        ("id" = Uuid, Path, description = "Alert ID"),
    ),
    responses(
        (status = 200, description = "Acknowledged alert", body = AlertDto),
        (status = 404, description = "Unknown alert"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "alerts"
)]
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertDto>, AppError> {
    let alert = state.alerts.acknowledge(id).await?;
    Ok(Json(alert.into()))
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Returns `200 OK` with `{"status":"ok"}` when the server is running.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "system"
)]
pub async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// OpenAPI spec
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(ingest_sensor_data, get_sensor_history, list_alerts, acknowledge_alert, health),
    components(schemas(SensorDataPayload, IngestResponse, SensorDataOut, AlertDto, AlertSeverity)),
    tags(
        (name = "sensors", description = "Reading ingestion and history"),
        (name = "alerts",  description = "Threshold alerts"),
        (name = "system",  description = "System endpoints"),
    ),
    info(
        title = "Field Telemetry API",
        version = "0.1.0",
        description = "Ingestion and threshold alerting for field sensor readings"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
