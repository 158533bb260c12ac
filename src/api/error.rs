use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Client-facing failure of a request. Messages carried by the 4xx variants
/// and `MalformedRequest` are public; everything else is logged and replaced
/// by a fixed public message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error("Metadata read error: {0}")]
    MetadataRead(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Stream error: {0}")]
    Stream(String),
}

pub const MSG_NO_FILE: &str = "No file uploaded";
pub const MSG_EMPTY_OR_DISALLOWED: &str = "Uploaded file is empty or file type is not allowed";
pub const MSG_TOO_LARGE: &str = "Uploaded file exceeds the maximum allowed size";
pub const MSG_CONVERT_PARSE: &str = "Error parsing the files";
pub const MSG_CONVERT_FAILED: &str = "Could not convert image to WebP";
pub const MSG_STREAM_FAILED: &str = "Stream error occurred";
pub const MSG_ICC_PARSE: &str = "Form parsing error";
pub const MSG_ICC_FAILED: &str = "Failed to read ICC Profile";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed".to_string(),
            ),
            AppError::MalformedRequest(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::InvalidUpload(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::MetadataRead(detail) => {
                tracing::error!("Failed to read ICC profile: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, MSG_ICC_FAILED.to_string())
            }
            AppError::Conversion(detail) => {
                tracing::error!("Conversion error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    MSG_CONVERT_FAILED.to_string(),
                )
            }
            AppError::Stream(detail) => {
                tracing::error!("Stream error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    MSG_STREAM_FAILED.to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Router fallback for non-POST methods on the upload endpoints
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}
