use axum::{extract::State, Extension, Json};
use std::sync::Arc;

use crate::{
    error::AppResult,
    middleware::request_id::RequestId,
    models::{RecommendationRequest, RecommendationResponse},
    routes::{json::AppJson, AppState},
    services::recommendations,
};

/// Handler for `POST /recomendar`
pub async fn recommend(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    AppJson(request): AppJson<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    tracing::info!(
        request_id = %request_id,
        usuario_id = request.usuario_id,
        activity_count = request.actividades.len(),
        preference_count = request.preferencias.len(),
        "Processing recommendation request"
    );

    let response = recommendations::recommend(
        state.model.as_ref(),
        &state.settings,
        &state.template,
        &request,
    )
    .await?;

    tracing::info!(
        request_id = %request_id,
        returned = response.recomendaciones.len(),
        "Recommendation request completed"
    );

    Ok(Json(response))
}
