use crate::api::error::{AppError, MSG_EMPTY_OR_DISALLOWED, MSG_NO_FILE, MSG_TOO_LARGE};
use crate::config::ConverterConfig;
use crate::services::scratch::RequestFiles;
use crate::utils::validation::{
    extension_for_mime, is_allowed_mime_type, normalize_mime, sanitize_filename,
};
use axum::extract::multipart::{Field, Multipart, MultipartError, MultipartRejection};
use axum::http::StatusCode;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

/// A validated upload sitting in the scratch directory.
///
/// Its file is tracked by the request's [`RequestFiles`], which deletes it
/// when the request ends.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub temporary_path: PathBuf,
    pub declared_mime_type: String,
    pub size_bytes: u64,
    pub original_name: String,
}

/// Limits applied while receiving an upload
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub field_name: &'static str,
    pub max_file_size: usize,
}

impl UploadPolicy {
    pub fn from_config(config: &ConverterConfig) -> Self {
        Self {
            field_name: "image",
            max_file_size: config.max_file_size,
        }
    }
}

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("multipart parse failure: {0}")]
    Malformed(String),

    #[error("upload exceeds the limit of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("no file field in upload")]
    Missing,

    #[error("uploaded file is empty or its type '{mime}' is not allowed")]
    EmptyOrDisallowed { mime: String },

    #[error("failed to write upload to scratch: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MultipartRejection> for UploadError {
    fn from(rejection: MultipartRejection) -> Self {
        UploadError::Malformed(rejection.body_text())
    }
}

impl UploadError {
    /// Maps to the client-facing error; `parse_message` is the endpoint's
    /// public text for parse failures.
    pub fn into_app_error(self, parse_message: &str) -> AppError {
        match self {
            UploadError::Malformed(detail) => {
                error!("Form parsing error: {}", detail);
                AppError::MalformedRequest(parse_message.to_string())
            }
            UploadError::Io(e) => {
                error!("Form parsing error while writing upload: {}", e);
                AppError::MalformedRequest(parse_message.to_string())
            }
            UploadError::TooLarge { limit } => {
                warn!("Upload rejected: larger than {} bytes", limit);
                AppError::PayloadTooLarge(MSG_TOO_LARGE.to_string())
            }
            UploadError::Missing => AppError::InvalidUpload(MSG_NO_FILE.to_string()),
            UploadError::EmptyOrDisallowed { mime } => {
                info!("Upload rejected: empty or disallowed type '{}'", mime);
                AppError::InvalidUpload(MSG_EMPTY_OR_DISALLOWED.to_string())
            }
        }
    }
}

fn classify(e: MultipartError, limit: usize) -> UploadError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        UploadError::TooLarge { limit }
    } else {
        UploadError::Malformed(e.body_text())
    }
}

/// Receives the `image` part of a multipart upload into the scratch directory.
///
/// Parts with a declared type outside the allow-list are drained without
/// being written. Only the first acceptable part is kept. On any failure the
/// file this call created is already deleted and the rest of the body has been
/// consumed.
pub async fn receive_image(
    mut multipart: Multipart,
    policy: &UploadPolicy,
    files: &mut RequestFiles,
) -> Result<UploadedFile, UploadError> {
    let mut created: Option<PathBuf> = None;
    let mut rejected_mime: Option<String> = None;

    let parsed: Result<Option<UploadedFile>, UploadError> = async {
        let mut accepted: Option<UploadedFile> = None;

        while let Some(mut field) = multipart
            .next_field()
            .await
            .map_err(|e| classify(e, policy.max_file_size))?
        {
            let is_image = field.name() == Some(policy.field_name);
            if !is_image || accepted.is_some() {
                drain_field(&mut field, policy.max_file_size).await?;
                continue;
            }

            let declared = field.content_type().map(normalize_mime).unwrap_or_default();
            let Some(extension) = extension_for_mime(&declared) else {
                debug!("Dropping '{}' part with type '{}'", policy.field_name, declared);
                rejected_mime = Some(declared);
                drain_field(&mut field, policy.max_file_size).await?;
                continue;
            };

            let original_name = sanitize_filename(field.file_name().unwrap_or("unnamed"));
            let path = files.storage().allocate_unique_output_path(extension);
            files.track(path.clone());
            created = Some(path.clone());

            let size_bytes = write_field(&mut field, &path, policy.max_file_size).await?;
            debug!(
                "Received '{}' ({} bytes, {}) into {}",
                original_name,
                size_bytes,
                declared,
                path.display()
            );

            accepted = Some(UploadedFile {
                temporary_path: path,
                declared_mime_type: declared,
                size_bytes,
                original_name,
            });
        }

        Ok(accepted)
    }
    .await;

    let accepted = match parsed {
        Ok(accepted) => accepted,
        Err(e) => {
            if let Some(path) = created {
                files.release(&path).await;
            }
            // Consume the rest of the body so the client reads our response
            // instead of a connection reset
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            return Err(e);
        }
    };

    let Some(upload) = accepted else {
        return Err(match rejected_mime {
            Some(mime) => UploadError::EmptyOrDisallowed { mime },
            None => UploadError::Missing,
        });
    };

    if upload.size_bytes == 0 || !is_allowed_mime_type(&upload.declared_mime_type) {
        files.release(&upload.temporary_path).await;
        return Err(UploadError::EmptyOrDisallowed {
            mime: upload.declared_mime_type,
        });
    }

    Ok(upload)
}

async fn write_field(
    field: &mut Field<'_>,
    path: &Path,
    limit: usize,
) -> Result<u64, UploadError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(|e| classify(e, limit))? {
        written += chunk.len() as u64;
        if written > limit as u64 {
            return Err(UploadError::TooLarge { limit });
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn drain_field(field: &mut Field<'_>, limit: usize) -> Result<(), UploadError> {
    while field
        .chunk()
        .await
        .map_err(|e| classify(e, limit))?
        .is_some()
    {}
    Ok(())
}
