use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::{
    models::{Availability, StatusResponse},
    routes::AppState,
};

/// Handler for `GET /status`
///
/// Probes the model server without launching it; always answers 200.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let model_name = state.settings.model.name.clone();
    let health = state.model.health(&model_name).await;
    let settings_ok = state.settings_origin.is_healthy();

    tracing::debug!(
        settings_ok,
        endpoint_reachable = health.endpoint_reachable,
        model_available = health.model_available,
        readiness = ?state.model.readiness(),
        "Status checked"
    );

    Json(StatusResponse {
        status: Availability::from(settings_ok && health.endpoint_reachable),
        nlp: Availability::from(health.endpoint_reachable),
        model: Availability::from(health.model_available),
        model_name,
        checked_at: Utc::now(),
    })
}
