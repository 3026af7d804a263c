use crate::api::{bounded, DurationProbe, SpeechEngine};
use crate::config::{SpeechConfig, Timeouts};
use crate::error::{Result, VideoError};
use crate::workspace::Workspace;
use std::path::PathBuf;
use tracing::info;

/// Characters that confuse command-line synthesis tools
const STRIPPED_QUOTES: [char; 7] = ['"', '\'', '`', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}'];

/// Synthesised narration for one dialogue line
#[derive(Debug, Clone)]
pub struct Narration {
    pub audio: PathBuf,
    /// Length reported by the probe
    pub measured: f64,
    /// `measured` plus padding; the clip length
    pub duration: f64,
}

pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !STRIPPED_QUOTES.contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

pub struct SpeechSynthesizer<'a> {
    engine: &'a dyn SpeechEngine,
    probe: &'a dyn DurationProbe,
    config: &'a SpeechConfig,
    timeouts: &'a Timeouts,
}

impl<'a> SpeechSynthesizer<'a> {
    pub fn new(
        engine: &'a dyn SpeechEngine,
        probe: &'a dyn DurationProbe,
        config: &'a SpeechConfig,
        timeouts: &'a Timeouts,
    ) -> Self {
        Self {
            engine,
            probe,
            config,
            timeouts,
        }
    }

    /// Synthesise the line and measure the produced audio. Any failure is a
    /// `SynthesisFailure` for `index`; there is no silent fallback.
    pub async fn narrate(&self, index: usize, text: &str, workspace: &Workspace) -> Result<Narration> {
        self.narrate_inner(index, text, workspace)
            .await
            .map_err(|e| match e {
                VideoError::SynthesisFailure { .. } => e,
                other => VideoError::SynthesisFailure {
                    line: index,
                    reason: other.to_string(),
                },
            })
    }

    async fn narrate_inner(&self, index: usize, text: &str, workspace: &Workspace) -> Result<Narration> {
        let text = sanitize(text);
        if text.is_empty() {
            return Err(VideoError::SynthesisFailure {
                line: index,
                reason: "nothing left to narrate after sanitising".to_string(),
            });
        }

        let audio = workspace.narration_path(index, self.engine.extension());
        bounded(
            "speech synthesis",
            self.timeouts.synthesis,
            self.engine.synthesize(&text, &self.config.voice, &audio),
        )
        .await?;

        let size = tokio::fs::metadata(&audio)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(VideoError::SynthesisFailure {
                line: index,
                reason: format!("engine produced no audio at {}", audio.display()),
            });
        }

        let measured = bounded("duration probe", self.timeouts.probe, self.probe.duration(&audio)).await?;
        if !measured.is_finite() || measured <= 0.0 {
            return Err(VideoError::SynthesisFailure {
                line: index,
                reason: format!("probe reported an unusable duration {}", measured),
            });
        }

        let duration = measured + self.config.padding;
        info!(
            "Line {}: narration {:.3}s, clip {:.3}s",
            index, measured, duration
        );

        Ok(Narration {
            audio,
            measured,
            duration,
        })
    }
}
