use crate::api::error::AppError;
use crate::services::conversion::ConversionResult;
use crate::services::scratch::RequestFiles;
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use futures::StreamExt;
use std::path::PathBuf;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Streams a converted file back to the client.
///
/// The request's scratch files are released once the last byte is read or
/// the read fails. If the client goes away first, the response body is
/// dropped and `RequestFiles` removes them on drop.
pub async fn stream_webp(
    result: ConversionResult,
    mut files: RequestFiles,
) -> Result<Response, AppError> {
    let opened = match tokio::fs::File::open(&result.output_temporary_path).await {
        Ok(file) => file.metadata().await.map(|meta| (file, meta.len())),
        Err(e) => Err(e),
    };
    let (file, content_length) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            files.release_all().await;
            return Err(AppError::Stream(format!(
                "{}: {}",
                result.output_temporary_path.display(),
                e
            )));
        }
    };

    Ok(stream_body(
        file,
        content_length,
        result.mime_type,
        result.output_temporary_path,
        files,
    ))
}

/// Wraps `reader` in a 200 response. `files` is released when the reader hits
/// EOF or fails, whichever comes first.
fn stream_body<R>(
    reader: R,
    content_length: u64,
    mime_type: &'static str,
    path: PathBuf,
    mut files: RequestFiles,
) -> Response
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let body = async_stream::stream! {
        let mut chunks = ReaderStream::new(reader);
        let mut sent: u64 = 0;
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    sent += bytes.len() as u64;
                    yield Ok::<Bytes, std::io::Error>(bytes);
                }
                Err(e) => {
                    warn!("Read of {} failed after {} bytes: {}", path.display(), sent, e);
                    yield Err(e);
                    break;
                }
            }
        }
        drop(chunks);
        debug!("Finished streaming {} ({} bytes)", path.display(), sent);
        files.release_all().await;
    };

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_type));
    response
        .headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversion::WEBP_MIME;
    use crate::services::scratch::ScratchStorage;
    use http_body_util::BodyExt;
    use std::io;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    /// Hands out `remaining` bytes, then fails every read.
    struct FailingReader {
        remaining: usize,
    }

    impl AsyncRead for FailingReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.remaining == 0 {
                return Poll::Ready(Err(io::Error::other("disk went away")));
            }
            let n = self.remaining.min(buf.remaining());
            buf.put_slice(&vec![1u8; n]);
            self.remaining -= n;
            Poll::Ready(Ok(()))
        }
    }

    async fn storage() -> (tempfile::TempDir, Arc<ScratchStorage>) {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(ScratchStorage::new(tmp.path()));
        storage.ensure_scratch_directory().await;
        (tmp, storage)
    }

    fn entries(storage: &ScratchStorage) -> usize {
        std::fs::read_dir(storage.dir()).unwrap().count()
    }

    #[tokio::test]
    async fn test_stream_sends_file_and_cleans_up() {
        let (_tmp, storage) = storage().await;
        let mut files = storage.request_files();

        let input = storage.allocate_unique_output_path("png");
        let output = storage.allocate_unique_output_path("webp");
        tokio::fs::write(&input, b"source").await.unwrap();
        let payload = vec![7u8; 200_000];
        tokio::fs::write(&output, &payload).await.unwrap();
        files.track(input.clone());
        files.track(output.clone());

        let result = ConversionResult {
            output_temporary_path: output.clone(),
            mime_type: WEBP_MIME,
        };
        let response = stream_webp(result, files).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "200000");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), payload.as_slice());
        assert_eq!(entries(&storage), 0);
    }

    #[tokio::test]
    async fn test_missing_output_releases_everything() {
        let (_tmp, storage) = storage().await;
        let mut files = storage.request_files();

        let input = storage.allocate_unique_output_path("jpg");
        tokio::fs::write(&input, b"source").await.unwrap();
        files.track(input.clone());

        let result = ConversionResult {
            output_temporary_path: storage.allocate_unique_output_path("webp"),
            mime_type: WEBP_MIME,
        };
        let err = stream_webp(result, files).await.unwrap_err();

        assert!(matches!(err, AppError::Stream(_)));
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_dropped_response_releases_files() {
        let (_tmp, storage) = storage().await;
        let mut files = storage.request_files();

        let output = storage.allocate_unique_output_path("webp");
        tokio::fs::write(&output, b"RIFF....WEBP").await.unwrap();
        files.track(output.clone());

        let result = ConversionResult {
            output_temporary_path: output.clone(),
            mime_type: WEBP_MIME,
        };
        let response = stream_webp(result, files).await.unwrap();
        drop(response);

        assert!(!output.exists());
    }

    #[tokio::test]
    async fn test_read_failure_after_headers_releases_files() {
        let (_tmp, storage) = storage().await;
        let mut files = storage.request_files();

        let input = storage.allocate_unique_output_path("png");
        let output = storage.allocate_unique_output_path("webp");
        tokio::fs::write(&input, b"source").await.unwrap();
        tokio::fs::write(&output, vec![0u8; 64]).await.unwrap();
        files.track(input.clone());
        files.track(output.clone());

        let response = stream_body(
            FailingReader { remaining: 16 },
            64,
            WEBP_MIME,
            output.clone(),
            files,
        );
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body();
        let mut received = 0;
        let failure = loop {
            match body.frame().await {
                Some(Ok(frame)) => received += frame.into_data().unwrap().len(),
                Some(Err(e)) => break e,
                None => panic!("stream ended without an error"),
            }
        };
        assert_eq!(received, 16);
        assert!(failure.to_string().contains("disk went away"));

        assert!(body.frame().await.is_none());
        assert_eq!(entries(&storage), 0);

        // The list was drained; dropping the body must not remove a file
        // that reappears at a released path
        tokio::fs::write(&input, b"new owner").await.unwrap();
        drop(body);
        assert!(input.exists());
    }
}
