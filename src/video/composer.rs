use crate::api::{bounded, ClipRenderer};
use crate::assets::ResolvedAssets;
use crate::config::{CompositionConfig, Encoding, Slot};
use crate::error::{Result, VideoError};
use crate::script::DialogueLine;
use crate::speech::Narration;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Background {
    Image(PathBuf),
    /// Fallback colour spanning the whole frame
    Solid(String),
}

/// Everything needed to render one dialogue line. Built once, consumed by `render`.
#[derive(Debug, Clone)]
pub struct ClipSpec {
    pub index: usize,
    pub speaker: String,
    /// "Speaker: wrapped line"
    pub caption: String,
    pub duration: f64,
    pub background: Background,
    pub speaker_image: PathBuf,
    pub other_image: PathBuf,
    /// 0 when the speaker is the first character (left), 1 otherwise
    pub speaker_slot: usize,
    pub audio: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortraitLayer {
    pub image: PathBuf,
    pub size: u32,
    pub slot: Slot,
    pub opacity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub text: String,
    pub font_path: PathBuf,
    pub font_size: u32,
    pub color: String,
    pub margin: u32,
}

/// Concrete compositing instructions handed to a [`ClipRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub duration: f64,
    pub background: Background,
    /// Left slot first. Slots follow character order, not who is speaking.
    pub portraits: [PortraitLayer; 2],
    pub caption: Caption,
    pub audio: PathBuf,
    pub encoding: Encoding,
    pub output: PathBuf,
}

/// A rendered clip waiting for concatenation
#[derive(Debug, Clone)]
pub struct RenderedClip {
    pub index: usize,
    pub path: PathBuf,
    pub duration: f64,
}

/// Wrap text to `columns` characters per line, splitting words longer than a line.
pub fn wrap_caption(text: &str, columns: usize) -> String {
    let columns = columns.max(1);
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();

        while word.len() > columns {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(columns);
            lines.push(word.into_iter().collect());
            word = rest;
        }

        let needed = if current_len == 0 { word.len() } else { current_len + 1 + word.len() };
        if needed > columns && current_len > 0 {
            lines.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current_len += word.len();
        current.extend(word);
    }

    if current_len > 0 {
        lines.push(current);
    }
    lines.join("\n")
}

pub struct ClipComposer<'a> {
    config: &'a CompositionConfig,
    renderer: &'a dyn ClipRenderer,
    timeout: Duration,
}

impl<'a> ClipComposer<'a> {
    pub fn new(config: &'a CompositionConfig, renderer: &'a dyn ClipRenderer, timeout: Duration) -> Self {
        Self {
            config,
            renderer,
            timeout,
        }
    }

    /// Build the `ClipSpec` for one line. Fails when the portraits are not exactly
    /// two or the speaker has no portrait; there is no single-speaker layout.
    pub fn plan(
        &self,
        index: usize,
        line: &DialogueLine,
        assets: &ResolvedAssets,
        background: Option<PathBuf>,
        narration: &Narration,
        output: PathBuf,
    ) -> Result<ClipSpec> {
        let portraits = assets.pair().ok_or_else(|| VideoError::RenderFailure {
            line: index,
            reason: format!(
                "composition needs exactly two characters, got {}",
                assets.portraits.len()
            ),
        })?;

        let speaker_slot = assets
            .slot_of(&line.speaker)
            .ok_or_else(|| VideoError::RenderFailure {
                line: index,
                reason: format!("no portrait for speaker '{}'", line.speaker),
            })?;

        let wrapped = wrap_caption(&line.line, self.config.caption_columns);

        Ok(ClipSpec {
            index,
            speaker: line.speaker.clone(),
            caption: format!("{}: {}", line.speaker, wrapped),
            duration: narration.duration,
            background: match background {
                Some(path) => Background::Image(path),
                None => Background::Solid(self.config.fallback_color.clone()),
            },
            speaker_image: portraits[speaker_slot].path.clone(),
            other_image: portraits[1 - speaker_slot].path.clone(),
            speaker_slot,
            audio: narration.audio.clone(),
            output,
        })
    }

    /// Deterministic layout: positional slots, full opacity for the speaker,
    /// reduced opacity for the listener.
    pub fn composition(&self, spec: &ClipSpec) -> Composition {
        let cfg = self.config;
        let layer = |slot: usize| {
            let (image, opacity) = if slot == spec.speaker_slot {
                (spec.speaker_image.clone(), 1.0)
            } else {
                (spec.other_image.clone(), cfg.listener_opacity)
            };
            PortraitLayer {
                image,
                size: cfg.portrait_size,
                slot: cfg.slots()[slot],
                opacity,
            }
        };

        Composition {
            index: spec.index,
            width: cfg.width,
            height: cfg.height,
            fps: cfg.fps,
            duration: spec.duration,
            background: spec.background.clone(),
            portraits: [layer(0), layer(1)],
            caption: Caption {
                text: spec.caption.clone(),
                font_path: cfg.font_path.clone(),
                font_size: cfg.font_size,
                color: cfg.font_color.clone(),
                margin: cfg.caption_margin,
            },
            audio: spec.audio.clone(),
            encoding: cfg.encoding.clone(),
            output: spec.output.clone(),
        }
    }

    /// Render the clip described by `spec`.
    pub async fn render(&self, spec: ClipSpec) -> Result<RenderedClip> {
        if tokio::fs::metadata(&self.config.font_path).await.is_err() {
            return Err(VideoError::ConfigError(format!(
                "caption font not found at {}",
                self.config.font_path.display()
            )));
        }

        let composition = self.composition(&spec);
        info!(
            "Line {}: rendering {:.3}s clip for {} ({})",
            spec.index,
            spec.duration,
            spec.speaker,
            match &composition.background {
                Background::Image(_) => "image background",
                Background::Solid(_) => "fallback background",
            }
        );

        bounded("clip render", self.timeout, self.renderer.render(&composition))
            .await
            .map_err(|e| VideoError::RenderFailure {
                line: spec.index,
                reason: e.to_string(),
            })?;

        let written = tokio::fs::metadata(&spec.output)
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(VideoError::RenderFailure {
                line: spec.index,
                reason: format!("renderer did not produce {}", spec.output.display()),
            });
        }

        Ok(RenderedClip {
            index: spec.index,
            path: spec.output,
            duration: spec.duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeRenderer;
    use crate::assets::Portrait;
    use tempfile::TempDir;

    fn assets() -> ResolvedAssets {
        ResolvedAssets {
            portraits: vec![
                Portrait {
                    name: "Alex".into(),
                    path: PathBuf::from("/ws/portrait_0.png"),
                },
                Portrait {
                    name: "Ben".into(),
                    path: PathBuf::from("/ws/portrait_1.png"),
                },
            ],
        }
    }

    fn line(speaker: &str, text: &str) -> DialogueLine {
        DialogueLine {
            speaker: speaker.into(),
            line: text.into(),
            keywords: None,
            bg_image_url: None,
        }
    }

    fn narration() -> Narration {
        Narration {
            audio: PathBuf::from("/ws/narration_0000.mp3"),
            measured: 2.0,
            duration: 2.5,
        }
    }

    #[test]
    fn wraps_by_character_count() {
        let wrapped = wrap_caption("the quick brown fox jumps over the lazy dog", 10);
        for l in wrapped.lines() {
            assert!(l.chars().count() <= 10, "{l}");
        }
        assert_eq!(wrapped, "the quick\nbrown fox\njumps over\nthe lazy\ndog");
    }

    #[test]
    fn wraps_korean_and_splits_long_words() {
        let wrapped = wrap_caption("가나다라마바사아자차카타파하", 5);
        assert_eq!(wrapped, "가나다라마\n바사아자차\n카타파하");
        assert_eq!(wrap_caption("short", 40), "short");
        assert_eq!(wrap_caption("", 40), "");
    }

    #[test]
    fn listener_is_faded_and_slots_never_swap() {
        let config = CompositionConfig::default();
        let renderer = FakeRenderer::default();
        let composer = ClipComposer::new(&config, &renderer, Duration::from_secs(5));

        for (speaker, faded) in [("Alex", 1), ("Ben", 0)] {
            let spec = composer
                .plan(0, &line(speaker, "hi"), &assets(), None, &narration(), "/ws/clip_0000.mp4".into())
                .unwrap();
            let comp = composer.composition(&spec);

            assert_eq!(comp.portraits[0].image, PathBuf::from("/ws/portrait_0.png"));
            assert_eq!(comp.portraits[1].image, PathBuf::from("/ws/portrait_1.png"));
            assert_eq!(comp.portraits[0].slot, config.left_slot);
            assert_eq!(comp.portraits[1].slot, config.right_slot);
            assert_eq!(comp.portraits[faded].opacity, 0.5);
            assert_eq!(comp.portraits[1 - faded].opacity, 1.0);
        }
    }

    #[test]
    fn plan_uses_fallback_colour_and_prefixes_caption() {
        let config = CompositionConfig {
            fallback_color: "navy".into(),
            ..CompositionConfig::default()
        };
        let renderer = FakeRenderer::default();
        let composer = ClipComposer::new(&config, &renderer, Duration::from_secs(5));

        let spec = composer
            .plan(2, &line("Ben", "hello there"), &assets(), None, &narration(), "/ws/clip_0002.mp4".into())
            .unwrap();
        assert_eq!(spec.background, Background::Solid("navy".into()));
        assert_eq!(spec.caption, "Ben: hello there");
        assert_eq!(spec.duration, 2.5);
        assert_eq!(spec.speaker_image, PathBuf::from("/ws/portrait_1.png"));
        assert_eq!(spec.other_image, PathBuf::from("/ws/portrait_0.png"));

        let with_bg = composer
            .plan(2, &line("Ben", "x"), &assets(), Some("/ws/bg.jpg".into()), &narration(), "/ws/c.mp4".into())
            .unwrap();
        assert_eq!(with_bg.background, Background::Image("/ws/bg.jpg".into()));
    }

    #[test]
    fn single_character_cannot_be_composed() {
        let config = CompositionConfig::default();
        let renderer = FakeRenderer::default();
        let composer = ClipComposer::new(&config, &renderer, Duration::from_secs(5));
        let mut solo = assets();
        solo.portraits.truncate(1);

        let err = composer
            .plan(0, &line("Alex", "hi"), &solo, None, &narration(), "/ws/clip_0000.mp4".into())
            .unwrap_err();
        assert!(matches!(err, VideoError::RenderFailure { line: 0, .. }));

        let err = composer
            .plan(4, &line("Carol", "hi"), &assets(), None, &narration(), "/ws/clip_0004.mp4".into())
            .unwrap_err();
        assert_eq!(err.line(), Some(4));
    }

    #[tokio::test]
    async fn missing_font_is_a_configuration_error() {
        let config = CompositionConfig {
            font_path: PathBuf::from("/no/such/font.ttf"),
            ..CompositionConfig::default()
        };
        let renderer = FakeRenderer::default();
        let composer = ClipComposer::new(&config, &renderer, Duration::from_secs(5));
        let spec = composer
            .plan(0, &line("Alex", "hi"), &assets(), None, &narration(), "/tmp/never.mp4".into())
            .unwrap();

        let err = composer.render(spec).await.unwrap_err();
        assert!(matches!(err, VideoError::ConfigError(_)));
        assert!(renderer.compositions().is_empty());
    }

    #[tokio::test]
    async fn render_failure_carries_line_index() {
        let dir = TempDir::new().unwrap();
        let font = dir.path().join("font.ttf");
        std::fs::write(&font, b"font").unwrap();
        let config = CompositionConfig {
            font_path: font,
            ..CompositionConfig::default()
        };
        let renderer = FakeRenderer {
            fail_on_line: Some(3),
            ..Default::default()
        };
        let composer = ClipComposer::new(&config, &renderer, Duration::from_secs(5));

        let ok = composer
            .plan(2, &line("Alex", "fine"), &assets(), None, &narration(), dir.path().join("clip_0002.mp4"))
            .unwrap();
        let clip = composer.render(ok).await.unwrap();
        assert_eq!(clip.index, 2);
        assert!(clip.path.exists());

        let bad = composer
            .plan(3, &line("Ben", "broken"), &assets(), None, &narration(), dir.path().join("clip_0003.mp4"))
            .unwrap();
        let err = composer.render(bad).await.unwrap_err();
        assert!(matches!(err, VideoError::RenderFailure { line: 3, .. }));
    }

    #[tokio::test]
    async fn slow_render_times_out_as_render_failure() {
        let dir = TempDir::new().unwrap();
        let font = dir.path().join("font.ttf");
        std::fs::write(&font, b"font").unwrap();
        let config = CompositionConfig {
            font_path: font,
            ..CompositionConfig::default()
        };
        let renderer = FakeRenderer {
            delay: Some(Duration::from_secs(5)),
            ..Default::default()
        };
        let composer = ClipComposer::new(&config, &renderer, Duration::from_millis(20));

        let spec = composer
            .plan(6, &line("Ben", "slow"), &assets(), None, &narration(), dir.path().join("clip_0006.mp4"))
            .unwrap();
        let err = composer.render(spec).await.unwrap_err();
        match err {
            VideoError::RenderFailure { line, reason } => {
                assert_eq!(line, 6);
                assert!(reason.contains("timed out"), "{}", reason);
            }
            other => panic!("expected RenderFailure, got {:?}", other),
        }
        assert!(!dir.path().join("clip_0006.mp4").exists());
    }
}
