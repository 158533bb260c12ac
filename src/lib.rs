pub mod api;
pub mod config;
pub mod services;
pub mod utils;

use crate::api::error::method_not_allowed;
use crate::config::ConverterConfig;
use crate::services::conversion::ConversionService;
use crate::services::metadata::MetadataService;
use crate::services::scratch::ScratchStorage;
use axum::{
    Json, Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::convert::convert_to_webp,
        api::handlers::read_icc::read_icc,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::read_icc::IccProfileResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "images", description = "WebP conversion and ICC profile inspection"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub scratch: Arc<ScratchStorage>,
    pub converter: Arc<ConversionService>,
    pub metadata: Arc<MetadataService>,
    pub config: ConverterConfig,
}

impl AppState {
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            scratch: Arc::new(ScratchStorage::new(config.scratch_dir.clone())),
            converter: Arc::new(ConversionService::new(&config)),
            metadata: Arc::new(MetadataService::new(&config)),
            config,
        }
    }
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn create_app(state: AppState) -> Router {
    // Multipart framing on top of the file itself
    let body_limit = state.config.max_file_size + 10 * 1024 * 1024;

    Router::new()
        .route("/api-docs/openapi.json", get(openapi_json))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/convert-to-webp",
            post(api::handlers::convert::convert_to_webp).fallback(method_not_allowed),
        )
        .route(
            "/api/read-icc",
            post(api::handlers::read_icc::read_icc).fallback(method_not_allowed),
        )
        .layer(from_fn(api::middleware::metrics::metrics_middleware))
        .layer(from_fn(api::middleware::security::security_headers))
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
