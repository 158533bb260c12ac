use crate::api::error::AppError;
use crate::config::ConverterConfig;
use crate::services::metadata::open_image;
use crate::services::scratch::RequestFiles;
use crate::services::upload::UploadedFile;
use anyhow::{Context, Result, anyhow, bail};
use image::codecs::webp::WebPEncoder;
use image::{ColorType, DynamicImage, ImageDecoder, ImageEncoder};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub const WEBP_MIME: &str = "image/webp";

/// A finished WebP file in the scratch directory, tracked by the request's
/// cleanup list.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub output_temporary_path: PathBuf,
    pub mime_type: &'static str,
}

/// Lossless WebP transcoder. Decode and encode run on the blocking pool,
/// bounded by a semaphore and a per-run timeout.
pub struct ConversionService {
    permits: Arc<Semaphore>,
    timeout: Duration,
    max_decode_alloc: u64,
}

impl ConversionService {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent_conversions.max(1))),
            timeout: config.conversion_timeout,
            max_decode_alloc: config.max_decode_alloc,
        }
    }

    /// Converts an upload into lossless WebP, keeping its ICC profile.
    ///
    /// The output path is tracked in `files` before anything is written, so
    /// a failed or abandoned run never leaves it behind. The input file is
    /// never touched.
    pub async fn convert_to_webp(
        &self,
        upload: &UploadedFile,
        files: &mut RequestFiles,
    ) -> Result<ConversionResult, AppError> {
        let output_temporary_path = files.storage().allocate_unique_output_path("webp");
        files.track(output_temporary_path.clone());

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Conversion(e.to_string()))?;

        let abandoned = Arc::new(AtomicBool::new(false));
        let job = {
            let source = upload.temporary_path.clone();
            let target = output_temporary_path.clone();
            let abandoned = abandoned.clone();
            let max_alloc = self.max_decode_alloc;
            tokio::task::spawn_blocking(move || {
                // Held until the worker really finishes, even past a timeout
                let _permit = permit;
                let result = transcode_lossless(&source, &target, max_alloc);
                // A late finisher removes its own output; nobody will read it
                if abandoned.load(Ordering::SeqCst) {
                    let _ = std::fs::remove_file(&target);
                }
                result
            })
        };

        let started = std::time::Instant::now();
        match tokio::time::timeout(self.timeout, job).await {
            Ok(Ok(Ok(embedded_icc))) => {
                info!(
                    source = %upload.original_name,
                    bytes_in = upload.size_bytes,
                    icc = embedded_icc,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Converted image to lossless WebP"
                );
                Ok(ConversionResult {
                    output_temporary_path,
                    mime_type: WEBP_MIME,
                })
            }
            Ok(Ok(Err(e))) => Err(AppError::Conversion(format!("{:#}", e))),
            Ok(Err(join_err)) => Err(AppError::Conversion(join_err.to_string())),
            Err(_) => {
                abandoned.store(true, Ordering::SeqCst);
                warn!(
                    "Conversion of '{}' exceeded {:?}, abandoning",
                    upload.original_name, self.timeout
                );
                Err(AppError::Conversion("timed out".to_string()))
            }
        }
    }
}

/// Decodes `source`, re-encodes it as lossless WebP at `target` carrying the
/// source's ICC profile. Returns whether a profile was embedded.
pub fn transcode_lossless(source: &Path, target: &Path, max_alloc: u64) -> Result<bool> {
    let mut decoder = open_image(source, max_alloc)
        .context("failed to open source image")?
        .into_decoder()
        .context("unsupported or corrupt image")?;
    let needed = decoder.total_bytes();
    if needed > max_alloc {
        bail!("decoded image needs {} bytes, limit is {}", needed, max_alloc);
    }
    let icc_profile = decoder
        .icc_profile()
        .context("failed to read embedded ICC profile")?;
    let image = DynamicImage::from_decoder(decoder).context("failed to decode image")?;
    let image = into_webp_layout(image);

    let file = File::create(target).context("failed to create output file")?;
    let mut writer = BufWriter::new(file);

    let mut encoder = WebPEncoder::new_lossless(&mut writer);
    let embedded = match icc_profile {
        Some(icc) => {
            encoder
                .set_icc_profile(icc)
                .map_err(|e| anyhow!("encoder rejected ICC profile: {}", e))?;
            true
        }
        None => false,
    };

    encoder
        .write_image(
            image.as_bytes(),
            image.width(),
            image.height(),
            image.color().into(),
        )
        .context("failed to encode WebP")?;
    writer.flush().context("failed to write output file")?;

    Ok(embedded)
}

/// The lossless encoder takes 8-bit L, LA, RGB and RGBA only
fn into_webp_layout(image: DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::L8 | ColorType::La8 | ColorType::Rgb8 | ColorType::Rgba8 => image,
        ColorType::L16 => DynamicImage::ImageLuma8(image.to_luma8()),
        ColorType::La16 => DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
        ColorType::Rgb16 | ColorType::Rgb32F => DynamicImage::ImageRgb8(image.to_rgb8()),
        _ => DynamicImage::ImageRgba8(image.to_rgba8()),
    }
}
