use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    middleware::request_id::{make_span_with_request_id, request_id_middleware},
    services::{LanguageModel, PromptTemplate},
    settings::{LoadedSettings, ServiceConfig, SettingsOrigin},
};

pub mod json;
pub mod recommendations;
pub mod status;

/// Context shared by all handlers.
///
/// Built once at startup and read-only afterwards; the model client keeps its
/// own readiness state internally.
pub struct AppState {
    pub settings: ServiceConfig,
    pub settings_origin: SettingsOrigin,
    pub template: PromptTemplate,
    pub model: Arc<dyn LanguageModel>,
}

impl AppState {
    pub fn new(
        settings: LoadedSettings,
        template: PromptTemplate,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            settings: settings.config,
            settings_origin: settings.origin,
            template,
            model,
        }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(status::status))
        .route("/recomendar", post(recommendations::recommend))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

/// Liveness probe
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
