//! Deterministic stand-ins for the external tools.

use super::{ClipRenderer, Collaborators, DurationProbe, ImageFetcher, SpeechEngine, StreamConcatenator};
use crate::error::{Result, VideoError};
use crate::video::Composition;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

/// Serves PNG bytes (or `body`) for every URL except hosts containing
/// "unreachable".
#[derive(Default)]
pub struct FakeImages {
    pub delay: Option<Duration>,
    pub body: Option<Vec<u8>>,
    pub requests: Mutex<Vec<String>>,
}

impl FakeImages {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serving(mut self, body: &[u8]) -> Self {
        self.body = Some(body.to_vec());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for FakeImages {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if url.contains("unreachable") {
            return Err(VideoError::ApiError(format!("connection refused: {}", url)));
        }
        Ok(self.body.clone().unwrap_or_else(|| PNG_BYTES.to_vec()))
    }
}

/// Writes the text itself as "audio". Fails for text containing `fail_on`;
/// writes an empty file for text containing `silent_on`.
#[derive(Default)]
pub struct FakeSpeech {
    pub delay: Option<Duration>,
    pub fail_on: Option<String>,
    pub silent_on: Option<String>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeSpeech {
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechEngine for FakeSpeech {
    async fn synthesize(&self, text: &str, _voice: &str, output: &Path) -> Result<()> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on.as_deref().is_some_and(|m| text.contains(m)) {
            return Err(VideoError::ProcessError("speech engine unavailable".to_string()));
        }
        let body = if self.silent_on.as_deref().is_some_and(|m| text.contains(m)) {
            Vec::new()
        } else {
            text.as_bytes().to_vec()
        };
        tokio::fs::write(output, body).await?;
        Ok(())
    }
}

/// Duration is one second per ten bytes of audio, never less than 0.1 s.
#[derive(Default)]
pub struct FakeProbe;

impl FakeProbe {
    pub fn seconds_for(len: u64) -> f64 {
        (len as f64 / 10.0).max(0.1)
    }
}

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn duration(&self, path: &Path) -> Result<f64> {
        let len = tokio::fs::metadata(path).await?.len();
        Ok(Self::seconds_for(len))
    }
}

/// Records compositions and writes a placeholder clip. With `stagger`,
/// earlier lines finish later so completion order is reversed.
#[derive(Default)]
pub struct FakeRenderer {
    pub delay: Option<Duration>,
    pub stagger: bool,
    pub fail_on_line: Option<usize>,
    pub compositions: Mutex<Vec<Composition>>,
}

impl FakeRenderer {
    pub fn compositions(&self) -> Vec<Composition> {
        self.compositions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipRenderer for FakeRenderer {
    async fn render(&self, composition: &Composition) -> Result<()> {
        if self.stagger {
            let wait = 40u64.saturating_sub(composition.index as u64 * 10);
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_on_line == Some(composition.index) {
            return Err(VideoError::ProcessError("invalid filter graph".to_string()));
        }
        self.compositions.lock().unwrap().push(composition.clone());
        tokio::fs::write(&composition.output, format!("clip {}", composition.index)).await?;
        Ok(())
    }
}

/// Records its input list and writes the concatenated placeholder contents.
#[derive(Default)]
pub struct FakeConcatenator {
    pub fail: bool,
    pub inputs: Mutex<Vec<Vec<PathBuf>>>,
}

impl FakeConcatenator {
    pub fn inputs(&self) -> Vec<Vec<PathBuf>> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamConcatenator for FakeConcatenator {
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        self.inputs.lock().unwrap().push(clips.to_vec());
        if self.fail {
            tokio::fs::write(output, b"partial").await?;
            return Err(VideoError::ProcessError("codec parameters differ".to_string()));
        }
        let mut joined = Vec::new();
        for clip in clips {
            joined.extend(tokio::fs::read(clip).await?);
            joined.push(b'\n');
        }
        tokio::fs::write(output, joined).await?;
        Ok(())
    }
}

/// Handles on every fake so tests can inspect them after a run.
#[derive(Clone)]
pub struct Fakes {
    pub images: Arc<FakeImages>,
    pub speech: Arc<FakeSpeech>,
    pub renderer: Arc<FakeRenderer>,
    pub concatenator: Arc<FakeConcatenator>,
}

impl Default for Fakes {
    fn default() -> Self {
        Self {
            images: Arc::new(FakeImages::default()),
            speech: Arc::new(FakeSpeech::default()),
            renderer: Arc::new(FakeRenderer::default()),
            concatenator: Arc::new(FakeConcatenator::default()),
        }
    }
}

impl Fakes {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            images: self.images.clone(),
            speech: self.speech.clone(),
            probe: Arc::new(FakeProbe),
            renderer: self.renderer.clone(),
            concatenator: self.concatenator.clone(),
        }
    }
}
