pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{routing::{get, post}, Router};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{alerts::AlertService, db::TelemetryStore, ingest::IngestionGateway};
use handlers::ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub gateway: IngestionGateway,
    pub alerts: AlertService,
}

impl AppState {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self {
            gateway: IngestionGateway::new(store.clone()),
            alerts: AlertService::new(store),
        }
    }
}

pub fn router(store: Arc<dyn TelemetryStore>) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/api/sensors/{external_id}/data",
            post(handlers::ingest_sensor_data).get(handlers::get_sensor_history),
        )
        .route("/api/alerts", get(handlers::list_alerts))
        .route("/api/alerts/{id}/acknowledge", post(handlers::acknowledge_alert))
        .with_state(AppState::new(store))
        .split_for_parts();

    router
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
