use super::RenderedClip;
use crate::api::{bounded, StreamConcatenator};
use crate::error::{Result, VideoError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub struct ClipAssembler<'a> {
    concatenator: &'a dyn StreamConcatenator,
    timeout: Duration,
}

impl<'a> ClipAssembler<'a> {
    pub fn new(concatenator: &'a dyn StreamConcatenator, timeout: Duration) -> Self {
        Self {
            concatenator,
            timeout,
        }
    }

    /// Join `clips` into `output`. Clips must be exactly lines `0..n` in order;
    /// any failure removes partial output.
    pub async fn assemble(&self, clips: &[RenderedClip], output: &Path) -> Result<PathBuf> {
        if clips.is_empty() {
            return Err(VideoError::ConcatenationFailure(
                "no clips to concatenate".to_string(),
            ));
        }
        if let Some((position, clip)) = clips
            .iter()
            .enumerate()
            .find(|(position, clip)| clip.index != *position)
        {
            return Err(VideoError::ConcatenationFailure(format!(
                "clip for line {} found at position {}",
                clip.index, position
            )));
        }

        let mut paths = Vec::with_capacity(clips.len());
        for clip in clips {
            if tokio::fs::metadata(&clip.path).await.is_err() {
                return Err(VideoError::ConcatenationFailure(format!(
                    "clip {} is missing",
                    clip.path.display()
                )));
            }
            paths.push(clip.path.clone());
        }

        let total: f64 = clips.iter().map(|c| c.duration).sum();
        info!(
            "Concatenating {} clips ({:.1}s) into {}",
            clips.len(),
            total,
            output.display()
        );

        let result = bounded(
            "concatenation",
            self.timeout,
            self.concatenator.concat(&paths, output),
        )
        .await
        .and_then(|()| {
            if output.exists() {
                Ok(())
            } else {
                Err(VideoError::ConcatenationFailure(format!(
                    "concatenation produced no file at {}",
                    output.display()
                )))
            }
        });

        if let Err(e) = result {
            tokio::fs::remove_file(output).await.ok();
            return Err(match e {
                VideoError::ConcatenationFailure(_) => e,
                other => VideoError::ConcatenationFailure(other.to_string()),
            });
        }

        Ok(output.to_path_buf())
    }
}
