use crate::error::{Result, VideoError};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{info, warn};

const WORKSPACE_PREFIX: &str = ".conversation-video-";

/// Scoped scratch directory owning every intermediate artifact of one run.
///
/// The directory is removed by [`Workspace::close`] or, on any other exit
/// path (error propagation, cancellation, panic unwinding), by `Drop`.
/// Removal failures are logged and never change the run's outcome.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `parent`.
    pub fn acquire(parent: &Path) -> Result<Self> {
        std::fs::create_dir_all(parent)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| {
                VideoError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("failed to create workspace in {}: {}", parent.display(), e),
                ))
            })?;
        let root = dir.path().to_path_buf();
        info!("Workspace created: {}", root.display());
        Ok(Self {
            dir: Some(dir),
            root,
        })
    }

    pub fn portrait_path(&self, slot: usize, extension: &str) -> PathBuf {
        self.root.join(format!("portrait_{}.{}", slot, extension))
    }

    pub fn background_path(&self, index: usize, extension: &str) -> PathBuf {
        self.root
            .join(format!("background_{:04}.{}", index, extension))
    }

    pub fn narration_path(&self, index: usize, extension: &str) -> PathBuf {
        self.root.join(format!("narration_{:04}.{}", index, extension))
    }

    pub fn clip_path(&self, index: usize) -> PathBuf {
        self.root.join(format!("clip_{:04}.mp4", index))
    }

    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    /// Move an artifact out of the workspace so it survives teardown.
    pub async fn persist(&self, artifact: &Path, destination: &Path) -> Result<PathBuf> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        if let Err(rename_err) = tokio::fs::rename(artifact, destination).await {
            // Different filesystem: fall back to copy + delete.
            warn!(
                "Rename into {} failed ({}), copying instead",
                destination.display(),
                rename_err
            );
            tokio::fs::copy(artifact, destination).await?;
            tokio::fs::remove_file(artifact).await?;
        }

        info!("Moved {} to {}", artifact.display(), destination.display());
        Ok(destination.to_path_buf())
    }

    /// Remove the workspace, logging (not returning) any failure.
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => info!("Workspace removed: {}", self.root.display()),
            Err(e) => {
                let err = VideoError::CleanupFailure(format!("{}: {}", self.root.display(), e));
                warn!("{}", err);
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.teardown();
    }
}
