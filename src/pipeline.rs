//! Drives one script through portraits, per-line clips, and concatenation.

use crate::api::Collaborators;
use crate::assets::{AssetResolver, ResolvedAssets};
use crate::config::PipelineConfig;
use crate::error::{Result, VideoError};
use crate::script::{DialogueLine, Script};
use crate::speech::SpeechSynthesizer;
use crate::video::{ClipAssembler, ClipComposer, RenderedClip};
use crate::workspace::Workspace;
use futures_util::{stream, StreamExt, TryStreamExt};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, error, info};

const ASSEMBLED_FILE: &str = "assembled.mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Started,
    WorkspaceReady,
    PortraitsResolved,
    ClipsRendered,
    Assembled,
    Delivered,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Started => "started",
            Stage::WorkspaceReady => "workspace ready",
            Stage::PortraitsResolved => "portraits resolved",
            Stage::ClipsRendered => "clips rendered",
            Stage::Assembled => "clips concatenated",
            Stage::Delivered => "video delivered",
        };
        f.write_str(name)
    }
}

/// Last completed stage plus the number of clips finished so far.
#[derive(Debug)]
struct Progress {
    stage: Stage,
    total: usize,
    rendered: AtomicUsize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            stage: Stage::Started,
            total,
            rendered: AtomicUsize::new(0),
        }
    }

    fn complete(&mut self, stage: Stage) {
        self.stage = stage;
        info!("Stage complete: {}", stage);
    }

    fn clip_done(&self, index: usize) {
        let done = self.rendered.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Line {} rendered ({}/{})", index, done, self.total);
    }

    fn report_failure(&self, err: &VideoError) {
        let rendered = self.rendered.load(Ordering::SeqCst);
        match err.line() {
            Some(line) => error!(
                "Run failed at line {} after stage '{}' ({}/{} clips rendered): {}",
                line, self.stage, rendered, self.total, err
            ),
            None => error!(
                "Run failed after stage '{}' ({}/{} clips rendered): {}",
                self.stage, rendered, self.total, err
            ),
        }
    }
}

/// Per-run helpers shared by every line
struct LineContext<'a> {
    resolver: AssetResolver<'a>,
    synthesizer: SpeechSynthesizer<'a>,
    composer: ClipComposer<'a>,
    portraits: &'a ResolvedAssets,
    workspace: &'a Workspace,
    progress: &'a Progress,
}

impl LineContext<'_> {
    async fn process(&self, index: usize, line: &DialogueLine) -> Result<RenderedClip> {
        info!(
            "Line {}/{} ({}): preparing clip",
            index + 1,
            self.progress.total,
            line.speaker
        );
        if let Some(keywords) = &line.keywords {
            debug!("Line {} keywords: {}", index, keywords.join(", "));
        }

        let background = self
            .resolver
            .resolve_background(index, line.bg_image_url.as_deref(), self.workspace)
            .await;

        let rendered = self.render(index, line, background.clone()).await;

        // Backgrounds are only needed until their clip exists.
        if let Some(path) = background {
            tokio::fs::remove_file(&path).await.ok();
        }

        let clip = rendered?;
        self.progress.clip_done(index);
        Ok(clip)
    }

    async fn render(
        &self,
        index: usize,
        line: &DialogueLine,
        background: Option<PathBuf>,
    ) -> Result<RenderedClip> {
        let narration = self
            .synthesizer
            .narrate(index, &line.line, self.workspace)
            .await?;
        let spec = self.composer.plan(
            index,
            line,
            self.portraits,
            background,
            &narration,
            self.workspace.clip_path(index),
        )?;
        self.composer.render(spec).await
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    collaborators: Collaborators,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            collaborators,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Render `script` and move the finished video into the output directory.
    ///
    /// The workspace is torn down on every path out of this function,
    /// including the future being dropped.
    pub async fn run(&self, script: &Script) -> Result<PathBuf> {
        let mut progress = Progress::new(script.dialogue.len());
        info!(
            "Starting video generation for '{}' ({} lines, {:?})",
            script.title,
            script.dialogue.len(),
            self.config.schedule
        );

        let workspace = match Workspace::acquire(&self.config.output_dir) {
            Ok(ws) => ws,
            Err(e) => {
                progress.report_failure(&e);
                return Err(e);
            }
        };
        progress.complete(Stage::WorkspaceReady);

        let result = self.run_in(script, &workspace, &mut progress).await;
        if let Err(e) = &result {
            progress.report_failure(e);
        }

        workspace.close();
        result
    }

    async fn run_in(
        &self,
        script: &Script,
        workspace: &Workspace,
        progress: &mut Progress,
    ) -> Result<PathBuf> {
        let cfg = &self.config;
        let api = &self.collaborators;

        // 1. Character portraits, shared by every line
        info!("Step 1/3: Resolving character portraits...");
        let resolver = AssetResolver::new(api.images.as_ref(), cfg.timeouts.fetch);
        let portraits = resolver
            .resolve_portraits(&script.characters, workspace)
            .await?;
        progress.complete(Stage::PortraitsResolved);

        // 2. One clip per dialogue line
        info!("Step 2/3: Rendering {} clips...", script.dialogue.len());
        let clips = {
            let context = LineContext {
                resolver,
                synthesizer: SpeechSynthesizer::new(
                    api.speech.as_ref(),
                    api.probe.as_ref(),
                    &cfg.speech,
                    &cfg.timeouts,
                ),
                composer: ClipComposer::new(
                    &cfg.composition,
                    api.renderer.as_ref(),
                    cfg.timeouts.render,
                ),
                portraits: &portraits,
                workspace,
                progress: &*progress,
            };
            render_all(&context, &script.dialogue, cfg.schedule.width()).await?
        };
        progress.complete(Stage::ClipsRendered);

        // 3. Lossless join, then move the result out of the workspace
        info!("Step 3/3: Concatenating clips...");
        let assembler = ClipAssembler::new(api.concatenator.as_ref(), cfg.timeouts.concat);
        let assembled = assembler
            .assemble(&clips, &workspace.artifact_path(ASSEMBLED_FILE))
            .await?;
        progress.complete(Stage::Assembled);

        let destination = cfg.output_dir.join(script.output_file_name());
        let delivered = workspace.persist(&assembled, &destination).await?;
        progress.complete(Stage::Delivered);

        info!("Video generation completed: {}", delivered.display());
        Ok(delivered)
    }
}

/// Run every line with at most `width` in flight. Results come back in
/// dialogue order whatever order they finish in; the first failure drops the
/// lines still in flight.
async fn render_all(
    context: &LineContext<'_>,
    dialogue: &[DialogueLine],
    width: usize,
) -> Result<Vec<RenderedClip>> {
    stream::iter(
        dialogue
            .iter()
            .enumerate()
            .map(|(index, line)| context.process(index, line)),
    )
    .buffered(width.max(1))
    .try_collect()
    .await
}
