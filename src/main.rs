mod api;
mod assets;
mod config;
mod error;
mod pipeline;
mod script;
mod speech;
mod video;
mod workspace;

use api::{Collaborators, CommandSpeechEngine, QwenSpeech, SpeechEngine, QWEN_DEFAULT_VOICE};
use clap::{Parser, ValueEnum};
use config::{PipelineConfig, Schedule, DEFAULT_FONT_PATH, DEFAULT_VOICE};
use error::VideoError;
use pipeline::Pipeline;
use script::{Script, DEFAULT_SCRIPT_PATH};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status after Ctrl-C, as a shell would report it
const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TtsBackend {
    /// Run a local command line tool (gtts-cli by default)
    Command,
    /// DashScope CosyVoice over HTTP
    Dashscope,
}

#[derive(Parser, Debug)]
#[command(name = "conversation-video")]
#[command(about = "Render a two-speaker conversation script into a narrated video", long_about = None)]
struct Args {
    /// Conversation script documents (JSON)
    #[arg(default_value = DEFAULT_SCRIPT_PATH)]
    scripts: Vec<PathBuf>,

    /// Directory the finished videos are written to
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// Voice / language identifier for narration [default: ko for command, longxiaochun for dashscope]
    #[arg(long)]
    voice: Option<String>,

    /// Dialogue lines processed at the same time (1 = sequential)
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Caption font file [env: CAPTION_FONT_PATH]
    #[arg(long)]
    font: Option<PathBuf>,

    /// Speech synthesis backend
    #[arg(long, value_enum, default_value_t = TtsBackend::Command)]
    tts: TtsBackend,

    /// Program used by the command backend
    #[arg(long, default_value = "gtts-cli")]
    tts_program: String,

    /// Argument template for the command backend; {text}, {voice} and {output} are substituted
    #[arg(long = "tts-arg", allow_hyphen_values = true)]
    tts_args: Vec<String>,

    /// Audio file extension the command backend writes [default: mp3]; DashScope always returns mp3
    #[arg(long)]
    tts_format: Option<String>,

    /// Seconds of silence kept after each narration
    #[arg(long, default_value_t = 0.5)]
    padding: f64,

    /// Background colour for lines without a usable image
    #[arg(long, default_value = "white")]
    fallback_color: String,

    /// DashScope API key [env: DASHSCOPE_API_KEY]
    #[arg(long)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    // Environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let pipeline = match build_pipeline(&args) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let mut generated = Vec::new();
    let mut failed = Vec::new();

    for script_path in &args.scripts {
        info!("Processing script: {}", script_path.display());

        // Input problems are reported before any workspace exists
        let script = match Script::load(script_path).await {
            Ok(script) => script,
            Err(e) => {
                error!("{}", e);
                failed.push(script_path.clone());
                continue;
            }
        };

        // Dropping the run future tears its workspace down before we exit
        let outcome = tokio::select! {
            result = pipeline.run(&script) => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        match outcome {
            Some(Ok(video)) => {
                println!("{}", video.display());
                generated.push(video);
            }
            Some(Err(_)) => failed.push(script_path.clone()),
            None => {
                warn!("Interrupted, workspace removed");
                std::process::exit(INTERRUPTED_EXIT_CODE);
            }
        }
    }

    if args.scripts.len() > 1 {
        info!("Generated {} video(s), {} failed", generated.len(), failed.len());
        for video in &generated {
            info!("  ok: {}", video.display());
        }
        for script in &failed {
            info!("  failed: {}", script.display());
        }
    }

    if !failed.is_empty() {
        std::process::exit(1);
    }

    Ok(())
}

fn build_pipeline(args: &Args) -> error::Result<Pipeline> {
    let mut config = PipelineConfig::default();
    config.output_dir = args.output_dir.clone();
    config.schedule = Schedule::from_jobs(args.jobs);
    config.speech.padding = args.padding;
    config.composition.fallback_color = args.fallback_color.clone();
    config.composition.font_path = args
        .font
        .clone()
        .or_else(|| std::env::var("CAPTION_FONT_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_PATH));

    let default_voice = match args.tts {
        TtsBackend::Command => DEFAULT_VOICE,
        TtsBackend::Dashscope => QWEN_DEFAULT_VOICE,
    };
    config.speech.voice = args.voice.clone().unwrap_or_else(|| default_voice.to_string());

    let speech: Arc<dyn SpeechEngine> = match args.tts {
        TtsBackend::Command => {
            let engine = if args.tts_args.is_empty() && args.tts_program == "gtts-cli" {
                CommandSpeechEngine::default()
            } else if args.tts_args.is_empty() {
                return Err(VideoError::ConfigError(format!(
                    "--tts-arg templates are required for '{}'",
                    args.tts_program
                )));
            } else {
                CommandSpeechEngine::new(args.tts_program.clone(), args.tts_args.clone())
            };
            let format = args.tts_format.clone().unwrap_or_else(|| "mp3".to_string());
            Arc::new(engine.with_extension(format))
        }
        TtsBackend::Dashscope => {
            if args.tts_format.as_deref().is_some_and(|f| f != "mp3") {
                return Err(VideoError::ConfigError(
                    "--tts-format only applies to the command backend; DashScope returns mp3".to_string(),
                ));
            }
            let api_key = args
                .api_key
                .clone()
                .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
                .ok_or_else(|| {
                    VideoError::ConfigError(
                        "DASHSCOPE_API_KEY not found. Please set it via --api-key or DASHSCOPE_API_KEY environment variable"
                            .to_string(),
                    )
                })?;
            Arc::new(QwenSpeech::new(api_key, config.timeouts.synthesis)?)
        }
    };

    let collaborators = Collaborators::system(speech, config.timeouts.fetch)?;
    let pipeline = Pipeline::new(config, collaborators)?;
    info!(
        "Output directory: {}, font: {}",
        pipeline.config().output_dir.display(),
        pipeline.config().composition.font_path.display()
    );
    Ok(pipeline)
}
