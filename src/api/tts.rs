use super::process::run_tool;
use super::SpeechEngine;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// Speech engine backed by a command line tool.
///
/// Arguments are templates: `{text}`, `{voice}` and `{output}` are
/// substituted per call. The text is passed as a single argv entry; no shell
/// is involved.
#[derive(Debug, Clone)]
pub struct CommandSpeechEngine {
    program: String,
    args: Vec<String>,
    extension: String,
}

impl Default for CommandSpeechEngine {
    fn default() -> Self {
        Self::new(
            "gtts-cli",
            ["--lang", "{voice}", "--output", "{output}", "{text}"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }
}

impl CommandSpeechEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            extension: "mp3".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    fn expand_args(&self, text: &str, voice: &str, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{voice}", voice)
                    .replace("{output}", &output)
                    .replace("{text}", text)
            })
            .collect()
    }
}

#[async_trait]
impl SpeechEngine for CommandSpeechEngine {
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        info!("Generating speech with {}: {}", self.program, text);

        let mut cmd = Command::new(&self.program);
        cmd.args(self.expand_args(text, voice, output));
        run_tool(cmd, &self.program).await?;

        info!("Speech saved to: {}", output.display());
        Ok(())
    }

    fn extension(&self) -> &str {
        &self.extension
    }
}
