//! Seams to the external tools the pipeline drives.
//!
//! Every heavyweight operation (image download, speech synthesis, duration
//! probing, clip rendering, concatenation) sits behind one of these traits so
//! the pipeline can run against fakes in tests.

mod ffmpeg;
mod http;
mod process;
mod qwen;
mod tts;

#[cfg(test)]
pub mod fake;

pub use ffmpeg::{FfmpegConcatenator, FfmpegRenderer, FfprobeDuration};
pub use http::HttpImageFetcher;
pub use qwen::{QwenSpeech, QWEN_DEFAULT_VOICE};
pub use tts::CommandSpeechEngine;

use crate::error::{Result, VideoError};
use crate::video::Composition;
use async_trait::async_trait;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download the bytes behind a remote image URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Write narration audio for `text` spoken with `voice` to `output`.
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()>;

    /// File extension of the audio this engine produces.
    fn extension(&self) -> &str {
        "mp3"
    }
}

#[async_trait]
pub trait DurationProbe: Send + Sync {
    /// Playable length of a media file, in seconds.
    async fn duration(&self, path: &Path) -> Result<f64>;
}

#[async_trait]
pub trait ClipRenderer: Send + Sync {
    /// Render one clip to `composition.output`.
    async fn render(&self, composition: &Composition) -> Result<()>;
}

#[async_trait]
pub trait StreamConcatenator: Send + Sync {
    /// Join `clips`, in order, into `output` without re-encoding.
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()>;
}

/// The set of external collaborators one pipeline run talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub images: Arc<dyn ImageFetcher>,
    pub speech: Arc<dyn SpeechEngine>,
    pub probe: Arc<dyn DurationProbe>,
    pub renderer: Arc<dyn ClipRenderer>,
    pub concatenator: Arc<dyn StreamConcatenator>,
}

impl Collaborators {
    /// ffmpeg/ffprobe on PATH, reqwest for downloads, and the given speech engine.
    pub fn system(speech: Arc<dyn SpeechEngine>, fetch_timeout: Duration) -> Result<Self> {
        Ok(Self {
            images: Arc::new(HttpImageFetcher::new(fetch_timeout)?),
            speech,
            probe: Arc::new(FfprobeDuration),
            renderer: Arc::new(FfmpegRenderer),
            concatenator: Arc::new(FfmpegConcatenator),
        })
    }
}

/// Run `operation` with an upper time bound. Dropping the inner future on
/// expiry kills any child process it spawned.
pub async fn bounded<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(VideoError::Timeout {
            operation: operation.to_string(),
            limit,
        }),
    }
}
