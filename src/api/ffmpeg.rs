use super::process::run_tool;
use super::{ClipRenderer, DurationProbe, StreamConcatenator};
use crate::error::{Result, VideoError};
use crate::video::{Background, Composition};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::info;

/// Reads container duration with `ffprobe`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfprobeDuration;

#[async_trait]
impl DurationProbe for FfprobeDuration {
    async fn duration(&self, path: &Path) -> Result<f64> {
        let mut cmd = Command::new("ffprobe");
        cmd.args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path);

        let output = run_tool(cmd, "ffprobe").await?;
        parse_duration(&String::from_utf8_lossy(&output.stdout))
    }
}

fn parse_duration(stdout: &str) -> Result<f64> {
    let value = stdout.trim();
    let seconds: f64 = value.parse().map_err(|_| {
        VideoError::ProcessError(format!("ffprobe returned an unreadable duration '{}'", value))
    })?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(VideoError::ProcessError(format!(
            "ffprobe reported a non-positive duration {}",
            seconds
        )));
    }
    Ok(seconds)
}

/// Composites one clip with a single ffmpeg filter graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegRenderer;

#[async_trait]
impl ClipRenderer for FfmpegRenderer {
    async fn render(&self, composition: &Composition) -> Result<()> {
        info!("Creating video segment: {}", composition.output.display());

        let mut cmd = Command::new("ffmpeg");
        cmd.args(render_args(composition));
        run_tool(cmd, "ffmpeg render").await?;

        info!("Created segment: {}", composition.output.display());
        Ok(())
    }
}

fn seconds(value: f64) -> String {
    format!("{:.3}", value)
}

/// Full ffmpeg argument list for a composition.
///
/// Input order: 0 background, 1 left portrait, 2 right portrait, 3 narration.
pub fn render_args(c: &Composition) -> Vec<String> {
    let duration = seconds(c.duration);
    let fps = c.fps.to_string();
    let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];

    match &c.background {
        Background::Solid(color) => {
            args.extend([
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                format!(
                    "color=c={}:s={}x{}:r={}:d={}",
                    escape_filter_value(color),
                    c.width,
                    c.height,
                    c.fps,
                    duration
                ),
            ]);
        }
        Background::Image(path) => push_still(&mut args, path, &fps, &duration),
    }
    for layer in &c.portraits {
        push_still(&mut args, &layer.image, &fps, &duration);
    }
    args.extend(["-i".into(), c.audio.to_string_lossy().into_owned()]);

    args.extend(["-filter_complex".into(), filter_graph(c)]);

    let enc = &c.encoding;
    args.extend([
        "-map".into(),
        "[v]".into(),
        "-map".into(),
        "[a]".into(),
        "-c:v".into(),
        enc.video_codec.clone(),
        "-pix_fmt".into(),
        enc.pixel_format.clone(),
        "-r".into(),
        fps,
        "-c:a".into(),
        enc.audio_codec.clone(),
        "-ar".into(),
        enc.audio_sample_rate.to_string(),
        "-ac".into(),
        enc.audio_channels.to_string(),
        "-t".into(),
        duration,
        "-shortest".into(),
        c.output.to_string_lossy().into_owned(),
    ]);
    args
}

fn push_still(args: &mut Vec<String>, path: &Path, fps: &str, duration: &str) {
    args.extend([
        "-loop".into(),
        "1".into(),
        "-framerate".into(),
        fps.to_string(),
        "-t".into(),
        duration.to_string(),
        "-i".into(),
        path.to_string_lossy().into_owned(),
    ]);
}

pub fn filter_graph(c: &Composition) -> String {
    let mut chains = Vec::new();

    chains.push(format!(
        "[0:v]scale={}:{},setsar=1,fps={}[bg]",
        c.width, c.height, c.fps
    ));

    for (i, layer) in c.portraits.iter().enumerate() {
        let mut chain = format!(
            "[{}:v]scale={}:{},format=rgba",
            i + 1,
            layer.size,
            layer.size
        );
        if layer.opacity < 1.0 {
            chain.push_str(&format!(",colorchannelmixer=aa={:.2}", layer.opacity));
        }
        chain.push_str(&format!("[p{}]", i));
        chains.push(chain);
    }

    let [left, right] = &c.portraits;
    chains.push(format!("[bg][p0]overlay={}:{}[o0]", left.slot.x, left.slot.y));
    chains.push(format!("[o0][p1]overlay={}:{}[o1]", right.slot.x, right.slot.y));

    let caption = &c.caption;
    chains.push(format!(
        "[o1]drawtext=fontfile={}:text={}:expansion=none:fontsize={}:fontcolor={}:x=(w-text_w)/2:y=h-text_h-{},format={}[v]",
        escape_filter_value(&caption.font_path.to_string_lossy()),
        escape_filter_value(&caption.text),
        caption.font_size,
        escape_filter_value(&caption.color),
        caption.margin,
        c.encoding.pixel_format
    ));

    chains.push(format!("[3:a]apad=whole_dur={}[a]", seconds(c.duration)));

    chains.join(";")
}

/// Escape a filter option value for both parsing levels of a filter graph,
/// so quotes, colons and commas in captions reach drawtext literally.
pub fn escape_filter_value(value: &str) -> String {
    let mut option_level = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(ch);
    }

    let mut graph_level = String::with_capacity(option_level.len());
    for ch in option_level.chars() {
        if matches!(ch, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(ch);
    }
    graph_level
}

/// Lossless join through the concat demuxer.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegConcatenator;

#[async_trait]
impl StreamConcatenator for FfmpegConcatenator {
    async fn concat(&self, clips: &[PathBuf], output: &Path) -> Result<()> {
        info!("Concatenating {} video segments...", clips.len());

        let mut absolute = Vec::with_capacity(clips.len());
        for clip in clips {
            let path = tokio::fs::canonicalize(clip).await.map_err(|e| {
                VideoError::ConcatenationFailure(format!(
                    "failed to get absolute path of {}: {}",
                    clip.display(),
                    e
                ))
            })?;
            absolute.push(path);
        }

        let list_file = output.with_extension("txt");
        tokio::fs::write(&list_file, concat_list(&absolute)).await?;

        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-y", "-loglevel", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_file)
            .args(["-c", "copy"])
            .arg(output);
        let result = run_tool(cmd, "ffmpeg concat").await;

        tokio::fs::remove_file(&list_file).await.ok();
        result?;

        info!("Concatenated video: {}", output.display());
        Ok(())
    }
}

/// Concat demuxer list; single quotes inside names are closed, escaped and reopened.
pub fn concat_list(clips: &[PathBuf]) -> String {
    clips
        .iter()
        .map(|clip| {
            format!(
                "file '{}'\n",
                clip.to_string_lossy().replace('\'', "'\\''")
            )
        })
        .collect()
}
