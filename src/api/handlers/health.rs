use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub scratch_dir: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Scratch directory is not writable", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (code, scratch_status) = if state.scratch.check_writable().await {
        (StatusCode::OK, "writable")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    let status = if code.is_success() { "ok" } else { "degraded" };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            scratch_dir: scratch_status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}
