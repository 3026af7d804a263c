use crate::error::{Result, VideoError};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_FONT_PATH: &str = "/usr/share/fonts/truetype/nanum/NanumGothic.ttf";
pub const DEFAULT_VOICE: &str = "ko";

/// Screen placement of a character portrait (top-left corner, in pixels)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub x: i32,
    pub y: i32,
}

/// Encoder parameters shared by every clip. Stream-copy concatenation
/// only works when all clips agree on these.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub video_codec: String,
    pub pixel_format: String,
    pub audio_codec: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u32,
}

impl Default for Encoding {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            audio_codec: "aac".to_string(),
            audio_sample_rate: 44_100,
            audio_channels: 2,
        }
    }
}

/// Frame layout and caption styling used by the clip composer
#[derive(Debug, Clone)]
pub struct CompositionConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Portraits are scaled to a `portrait_size` square
    pub portrait_size: u32,
    pub left_slot: Slot,
    pub right_slot: Slot,
    /// Opacity of the character who is not speaking
    pub listener_opacity: f32,
    pub font_path: PathBuf,
    pub font_size: u32,
    pub font_color: String,
    /// Caption wrap width, in characters
    pub caption_columns: usize,
    /// Gap between the caption's last line and the bottom edge
    pub caption_margin: u32,
    /// Solid colour used when a line has no usable background image
    pub fallback_color: String,
    pub encoding: Encoding,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            portrait_size: 300,
            left_slot: Slot { x: 140, y: 210 },
            right_slot: Slot { x: 840, y: 210 },
            listener_opacity: 0.5,
            font_path: PathBuf::from(DEFAULT_FONT_PATH),
            font_size: 32,
            font_color: "black".to_string(),
            caption_columns: 40,
            caption_margin: 60,
            fallback_color: "white".to_string(),
            encoding: Encoding::default(),
        }
    }
}

impl CompositionConfig {
    pub fn slots(&self) -> [Slot; 2] {
        [self.left_slot, self.right_slot]
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(VideoError::ConfigError(
                "width, height and fps must be non-zero".to_string(),
            ));
        }
        // yuv420p needs even dimensions
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(VideoError::ConfigError(format!(
                "frame size {}x{} must be even",
                self.width, self.height
            )));
        }
        if self.portrait_size == 0 {
            return Err(VideoError::ConfigError(
                "portrait size must be non-zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.listener_opacity) {
            return Err(VideoError::ConfigError(format!(
                "listener opacity {} is outside [0, 1]",
                self.listener_opacity
            )));
        }
        if self.caption_columns == 0 {
            return Err(VideoError::ConfigError(
                "caption column width must be non-zero".to_string(),
            ));
        }
        if self.fallback_color.trim().is_empty() {
            return Err(VideoError::ConfigError(
                "fallback colour is empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Voice / language identifier handed to the speech engine
    pub voice: String,
    /// Seconds added after the measured narration so it is not cut at the frame boundary
    pub padding: f64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            padding: 0.5,
        }
    }
}

/// Upper bounds for each external operation
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub fetch: Duration,
    pub synthesis: Duration,
    pub probe: Duration,
    pub render: Duration,
    pub concat: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            fetch: Duration::from_secs(60),
            synthesis: Duration::from_secs(120),
            probe: Duration::from_secs(30),
            render: Duration::from_secs(300),
            concat: Duration::from_secs(300),
        }
    }
}

/// How dialogue lines are scheduled. Output order never depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Schedule {
    #[default]
    Sequential,
    Concurrent(NonZeroUsize),
}

impl Schedule {
    pub fn from_jobs(jobs: usize) -> Self {
        match NonZeroUsize::new(jobs) {
            Some(n) if n.get() > 1 => Schedule::Concurrent(n),
            _ => Schedule::Sequential,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Schedule::Sequential => 1,
            Schedule::Concurrent(n) => n.get(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub composition: CompositionConfig,
    pub speech: SpeechConfig,
    pub timeouts: Timeouts,
    pub schedule: Schedule,
    /// Where the final video lands; the workspace is created here too
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            composition: CompositionConfig::default(),
            speech: SpeechConfig::default(),
            timeouts: Timeouts::default(),
            schedule: Schedule::default(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.composition.validate()?;
        if !self.speech.padding.is_finite() || self.speech.padding < 0.0 {
            return Err(VideoError::ConfigError(format!(
                "duration padding {} must be a non-negative number",
                self.speech.padding
            )));
        }
        if self.speech.voice.trim().is_empty() {
            return Err(VideoError::ConfigError("voice is empty".to_string()));
        }
        let t = &self.timeouts;
        if [t.fetch, t.synthesis, t.probe, t.render, t.concat]
            .iter()
            .any(Duration::is_zero)
        {
            return Err(VideoError::ConfigError(
                "timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
