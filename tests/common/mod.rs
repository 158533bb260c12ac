#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;
use webp_icc_backend::config::ConverterConfig;
use webp_icc_backend::{AppState, create_app};

pub const BOUNDARY: &str = "---------------------------123456789012345678901234567";

pub struct Part<'a> {
    pub name: &'a str,
    pub filename: Option<&'a str>,
    pub content_type: Option<&'a str>,
    pub data: &'a [u8],
}

impl<'a> Part<'a> {
    pub fn image(filename: &'a str, content_type: &'a str, data: &'a [u8]) -> Self {
        Self {
            name: "image",
            filename: Some(filename),
            content_type: Some(content_type),
            data,
        }
    }
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let mut disposition = format!("Content-Disposition: form-data; name=\"{}\"", part.name);
        if let Some(filename) = part.filename {
            disposition.push_str(&format!("; filename=\"{filename}\""));
        }
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"\r\n");
        if let Some(ct) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_request(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

/// Router over a private scratch directory
pub struct TestApp {
    _tmp: TempDir,
    pub scratch: PathBuf,
    pub app: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut ConverterConfig)) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = tmp.path().join("temp");
        let mut config = ConverterConfig::with_scratch_dir(&scratch);
        tweak(&mut config);

        let state = AppState::new(config);
        assert!(state.scratch.ensure_scratch_directory().await);

        Self {
            _tmp: tmp,
            scratch,
            app: create_app(state),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub fn scratch_entries(&self) -> usize {
        scratch_entries(&self.scratch)
    }
}

pub fn scratch_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

pub fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 7) as u8, (y * 11) as u8, (x ^ y) as u8, 255 - (x as u8)])
    })
}

pub fn png_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

/// PNG with `icc` stored in an iCCP chunk.
pub fn png_with_icc(img: &RgbaImage, icc: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut encoder = PngEncoder::new(&mut out);
    encoder.set_icc_profile(icc.to_vec()).unwrap();
    encoder
        .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
        .unwrap();
    out
}

pub fn gif_bytes(img: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Gif)
        .unwrap();
    out
}

pub fn jpeg_bytes() -> Vec<u8> {
    let img = RgbImage::from_fn(16, 16, |x, y| Rgb([x as u8 * 16, y as u8 * 16, 90]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Jpeg)
        .unwrap();
    out
}

/// JPEG carrying `icc` in a single APP2 ICC_PROFILE segment
pub fn jpeg_with_icc(icc: &[u8]) -> Vec<u8> {
    let jpeg = jpeg_bytes();
    let mut segment = b"ICC_PROFILE\0".to_vec();
    segment.extend_from_slice(&[1, 1]);
    segment.extend_from_slice(icc);
    let len = (segment.len() + 2) as u16;

    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE2]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&segment);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Minimal v2 display profile whose only tag is a `desc` description
pub fn icc_profile(description: &str) -> Vec<u8> {
    let mut desc = b"desc\0\0\0\0".to_vec();
    desc.extend_from_slice(&((description.len() + 1) as u32).to_be_bytes());
    desc.extend_from_slice(description.as_bytes());
    desc.push(0);
    // Unicode and ScriptCode sections, both empty
    desc.extend_from_slice(&[0u8; 8]);
    desc.extend_from_slice(&[0u8; 3 + 67]);
    while desc.len() % 4 != 0 {
        desc.push(0);
    }

    let offset = 128 + 4 + 12;
    let total = offset + desc.len();
    let mut profile = vec![0u8; total];
    profile[0..4].copy_from_slice(&(total as u32).to_be_bytes());
    profile[8..12].copy_from_slice(&[2, 0x10, 0, 0]);
    profile[12..16].copy_from_slice(b"mntr");
    profile[16..20].copy_from_slice(b"RGB ");
    profile[20..24].copy_from_slice(b"XYZ ");
    profile[36..40].copy_from_slice(b"acsp");
    profile[128..132].copy_from_slice(&1u32.to_be_bytes());
    profile[132..136].copy_from_slice(b"desc");
    profile[136..140].copy_from_slice(&(offset as u32).to_be_bytes());
    profile[140..144].copy_from_slice(&(desc.len() as u32).to_be_bytes());
    profile[offset..].copy_from_slice(&desc);
    profile
}
