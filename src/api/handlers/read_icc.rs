use crate::AppState;
use crate::api::error::{AppError, MSG_ICC_PARSE};
use crate::services::metadata::ColorProfile;
use crate::services::upload::{UploadPolicy, receive_image};
use axum::{
    Json,
    extract::{
        State,
        multipart::{Multipart, MultipartRejection},
    },
};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IccProfileResponse {
    /// Raw profile bytes, standard base64 with padding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icc_profile_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icc_profile_description: Option<String>,
}

impl From<ColorProfile> for IccProfileResponse {
    fn from(profile: ColorProfile) -> Self {
        if profile.is_empty() {
            return Self {
                icc_profile_base64: None,
                icc_profile_description: None,
            };
        }
        Self {
            icc_profile_base64: Some(profile.base64_encoding),
            icc_profile_description: Some(profile.description),
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/read-icc",
    request_body(
        content_type = "multipart/form-data",
        description = "Form with an `image` part (image/jpeg, image/png or image/gif)"
    ),
    responses(
        (status = 200, description = "Embedded ICC profile; both keys absent when there is none", body = IccProfileResponse),
        (status = 400, description = "No file, empty file or disallowed type"),
        (status = 405, description = "Method not allowed"),
        (status = 413, description = "Upload exceeds the size cap"),
        (status = 500, description = "Parse or metadata failure")
    ),
    tag = "images"
)]
pub async fn read_icc(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IccProfileResponse>, AppError> {
    let mut files = state.scratch.request_files();
    let policy = UploadPolicy::from_config(&state.config);

    let received = match multipart {
        Ok(multipart) => receive_image(multipart, &policy, &mut files).await,
        Err(rejection) => Err(rejection.into()),
    };
    let extracted = match received {
        Ok(upload) => state.metadata.extract(&upload).await,
        Err(e) => Err(e.into_app_error(MSG_ICC_PARSE)),
    };
    files.release_all().await;

    Ok(Json(extracted?.into()))
}
