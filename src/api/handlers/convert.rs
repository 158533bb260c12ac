use crate::AppState;
use crate::api::error::{AppError, MSG_CONVERT_PARSE};
use crate::services::streamer::stream_webp;
use crate::services::upload::{UploadPolicy, receive_image};
use axum::{
    extract::{
        State,
        multipart::{Multipart, MultipartRejection},
    },
    response::Response,
};
use tracing::info;

#[utoipa::path(
    post,
    path = "/api/convert-to-webp",
    request_body(
        content_type = "multipart/form-data",
        description = "Form with an `image` part (image/jpeg, image/png or image/gif)"
    ),
    responses(
        (status = 200, description = "Lossless WebP carrying the source ICC profile", content_type = "image/webp"),
        (status = 400, description = "No file, empty file or disallowed type"),
        (status = 405, description = "Method not allowed"),
        (status = 413, description = "Upload exceeds the size cap"),
        (status = 500, description = "Parse, conversion or stream failure")
    ),
    tag = "images"
)]
pub async fn convert_to_webp(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut files = state.scratch.request_files();
    let policy = UploadPolicy::from_config(&state.config);

    let received = match multipart {
        Ok(multipart) => receive_image(multipart, &policy, &mut files).await,
        Err(rejection) => Err(rejection.into()),
    };
    let upload = match received {
        Ok(upload) => upload,
        Err(e) => {
            files.release_all().await;
            return Err(e.into_app_error(MSG_CONVERT_PARSE));
        }
    };

    info!(
        "Converting '{}' ({}, {} bytes)",
        upload.original_name, upload.declared_mime_type, upload.size_bytes
    );

    let converted = match state.converter.convert_to_webp(&upload, &mut files).await {
        Ok(converted) => converted,
        Err(e) => {
            files.release_all().await;
            return Err(e);
        }
    };

    // The source is done with; only the WebP is left for the stream to release
    files.release(&upload.temporary_path).await;

    stream_webp(converted, files).await
}
