use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Process-wide scratch directory for per-request upload and output files.
///
/// File names are UUID v4 based, so concurrent requests never address the
/// same file and no locking is needed.
#[derive(Debug)]
pub struct ScratchStorage {
    dir: PathBuf,
}

impl ScratchStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the scratch directory if it is missing. Idempotent and
    /// best-effort: a failure is logged and reported as `false`.
    pub async fn ensure_scratch_directory(&self) -> bool {
        match tokio::fs::create_dir_all(&self.dir).await {
            Ok(()) => {
                debug!("Scratch directory ready at {}", self.dir.display());
                true
            }
            Err(e) => {
                warn!(
                    "Failed to create scratch directory {}: {}",
                    self.dir.display(),
                    e
                );
                false
            }
        }
    }

    /// Returns `<scratch>/<uuid>.<extension>`; nothing is created on disk.
    pub fn allocate_unique_output_path(&self, extension: &str) -> PathBuf {
        let extension = extension.trim_start_matches('.');
        self.dir.join(format!("{}.{}", Uuid::new_v4(), extension))
    }

    /// Deletes a scratch file. Errors are logged, never returned.
    pub async fn release_scoped_file(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!("Released scratch file {}", path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Scratch file {} already gone", path.display())
            }
            Err(e) => warn!("Failed to delete scratch file {}: {}", path.display(), e),
        }
    }

    /// Starts an empty cleanup list bound to this directory
    pub fn request_files(self: &Arc<Self>) -> RequestFiles {
        RequestFiles {
            storage: self.clone(),
            paths: Vec::new(),
        }
    }

    /// Removes regular files left behind by a previous process.
    /// Returns the number of files deleted.
    pub async fn purge_stale_files(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list scratch directory {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(
                    "Failed to purge stale scratch file {}: {}",
                    entry.path().display(),
                    e
                ),
            }
        }

        if removed > 0 {
            info!("🧹 Purged {} stale scratch file(s)", removed);
        }
        removed
    }

    /// Writes and removes a marker file to check the directory is usable
    pub async fn check_writable(&self) -> bool {
        let marker = self.dir.join(format!(".writable-{}", Uuid::new_v4()));
        let ok = tokio::fs::write(&marker, b"ok").await.is_ok();
        if ok {
            self.release_scoped_file(&marker).await;
        }
        ok
    }
}

/// Every scratch file created while serving one request.
///
/// `release_all` drains the list, so each file is deleted exactly once no
/// matter how many exit paths call it. Whatever is still tracked when the
/// list is dropped (cancelled handler, client disconnect) is removed
/// synchronously in `Drop`.
#[derive(Debug)]
pub struct RequestFiles {
    storage: Arc<ScratchStorage>,
    paths: Vec<PathBuf>,
}

impl RequestFiles {
    pub fn storage(&self) -> &Arc<ScratchStorage> {
        &self.storage
    }

    pub fn track(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Deletes one tracked file ahead of the rest
    pub async fn release(&mut self, path: &Path) {
        if let Some(pos) = self.paths.iter().position(|p| p == path) {
            let path = self.paths.swap_remove(pos);
            self.storage.release_scoped_file(&path).await;
        }
    }

    pub async fn release_all(&mut self) {
        for path in std::mem::take(&mut self.paths) {
            self.storage.release_scoped_file(&path).await;
        }
    }
}

impl Drop for RequestFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Released scratch file {} on drop", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to delete scratch file {}: {}", path.display(), e),
            }
        }
    }
}
