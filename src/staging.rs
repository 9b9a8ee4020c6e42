//! Staging of job inputs as temporary files.
//!
//! The inference engine reads from a path, not from a stream, so every upload
//! is written to disk before admission. A [`StagedFile`] is released exactly
//! once: explicitly through [`StagedFile::release`], or by its destructor if
//! the owner never got that far.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{Result, TranscribeError};

const FILE_PREFIX: &str = "temp";
const DEFAULT_EXTENSION: &str = "wav";

/// Writes staged inputs into a directory under collision-free names.
#[derive(Debug, Clone)]
pub struct Stager {
    dir: PathBuf,
}

impl Stager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `data` to a fresh file named `temp_<uuid>.<ext>`.
    ///
    /// The extension is taken from `original_name` when it has one. If the
    /// write fails the partial file is removed before the error is returned.
    pub async fn stage(&self, data: &[u8], original_name: Option<&str>) -> Result<StagedFile> {
        let extension = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(DEFAULT_EXTENSION);

        let path = self.dir.join(format!(
            "{}_{}.{}",
            FILE_PREFIX,
            Uuid::new_v4().simple(),
            extension
        ));

        let staged = StagedFile::adopt(path);
        tokio::fs::write(staged.path(), data).await?;

        tracing::debug!(path = %staged.path().display(), bytes = data.len(), "Staged input");
        Ok(staged)
    }
}

/// An owned temporary file that is removed exactly once.
#[derive(Debug)]
pub struct StagedFile {
    path: Option<PathBuf>,
}

impl StagedFile {
    /// Take ownership of an existing file. It will be removed on release or drop.
    pub fn adopt(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> &Path {
        // `path` is only `None` after `release`, which consumes `self`.
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// Remove the file. A file that is already gone counts as released.
    pub async fn release(mut self) -> Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "Released staged input");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(TranscribeError::ResourceCleanupFailed { path, source }),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Released staged input on drop");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to release staged input on drop");
                }
            }
        }
    }
}
