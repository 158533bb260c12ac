use crate::api::error::AppError;
use crate::config::ConverterConfig;
use crate::services::icc;
use crate::services::upload::UploadedFile;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageDecoder, ImageReader, ImageResult, Limits};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const DESCRIPTION_NOT_AVAILABLE: &str = "Description not available";

/// Embedded ICC profile of an upload. All fields empty means the image
/// carries no profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColorProfile {
    pub raw_bytes: Vec<u8>,
    pub base64_encoding: String,
    pub description: String,
}

impl ColorProfile {
    /// Wraps raw profile bytes. A description that cannot be parsed falls
    /// back to [`DESCRIPTION_NOT_AVAILABLE`]; the bytes are kept either way.
    pub fn from_icc(raw_bytes: Vec<u8>) -> Self {
        let description = match icc::profile_description(&raw_bytes) {
            Ok(Some(description)) => description,
            Ok(None) => DESCRIPTION_NOT_AVAILABLE.to_string(),
            Err(e) => {
                debug!("ICC description unreadable: {}", e);
                DESCRIPTION_NOT_AVAILABLE.to_string()
            }
        };

        Self {
            base64_encoding: STANDARD.encode(&raw_bytes),
            raw_bytes,
            description,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_bytes.is_empty()
    }
}

/// Opens an image for header-level access under the given allocation ceiling
pub fn open_image(
    path: &Path,
    max_alloc: u64,
) -> ImageResult<ImageReader<BufReader<File>>> {
    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    let mut limits = Limits::default();
    limits.max_alloc = Some(max_alloc);
    reader.limits(limits);
    Ok(reader)
}

/// Reads the embedded ICC profile without decoding pixel data
pub fn read_icc_profile(path: &Path, max_alloc: u64) -> ImageResult<Option<Vec<u8>>> {
    let mut decoder = open_image(path, max_alloc)?.into_decoder()?;
    decoder.icc_profile()
}

pub struct MetadataService {
    max_decode_alloc: u64,
    timeout: Duration,
}

impl MetadataService {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            max_decode_alloc: config.max_decode_alloc,
            timeout: config.conversion_timeout,
        }
    }

    /// Extracts the color profile of an upload. The upload's file is left in
    /// place; the caller owns its cleanup.
    pub async fn extract(&self, upload: &UploadedFile) -> Result<ColorProfile, AppError> {
        let path = upload.temporary_path.clone();
        let max_alloc = self.max_decode_alloc;
        let task = tokio::task::spawn_blocking(move || read_icc_profile(&path, max_alloc));

        let icc = match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(Ok(icc))) => icc,
            Ok(Ok(Err(e))) => return Err(AppError::MetadataRead(e.to_string())),
            Ok(Err(join_err)) => return Err(AppError::MetadataRead(join_err.to_string())),
            Err(_) => {
                warn!(
                    "Metadata read of '{}' exceeded {:?}",
                    upload.original_name, self.timeout
                );
                return Err(AppError::MetadataRead("timed out".to_string()));
            }
        };

        Ok(icc.map(ColorProfile::from_icc).unwrap_or_default())
    }
}
