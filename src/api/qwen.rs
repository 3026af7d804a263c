use super::SpeechEngine;
use crate::error::{Result, VideoError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::info;

const QWEN_TTS_API: &str = "https://dashscope.aliyuncs.com/api/v1/services/aigc/text2speech/speech-synthesis";
const QWEN_TTS_MODEL: &str = "cosyvoice-v1";

/// CosyVoice voice used when none is given
pub const QWEN_DEFAULT_VOICE: &str = "longxiaochun";

/// DashScope (Qwen) CosyVoice speech synthesis.
#[derive(Debug, Clone)]
pub struct QwenSpeech {
    api_key: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct TTSResponse {
    output: TTSOutput,
}

#[derive(Debug, Deserialize)]
struct TTSOutput {
    audio_url: Option<String>,
}

impl QwenSpeech {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(VideoError::ConfigError(
                "DashScope API key is empty".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { api_key, client })
    }
}

#[async_trait]
impl SpeechEngine for QwenSpeech {
    async fn synthesize(&self, text: &str, voice: &str, output: &Path) -> Result<()> {
        info!("Generating speech for text: {}", text);

        let request_body = json!({
            "model": QWEN_TTS_MODEL,
            "input": {
                "text": text
            },
            "parameters": {
                "voice": voice,
                "format": "mp3"
            }
        });

        let response = self
            .client
            .post(QWEN_TTS_API)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(VideoError::ApiError(format!(
                "TTS API error: {}",
                error_text
            )));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        // The API answers either with audio bytes or with a link to them
        let audio_data = if is_json {
            let body: TTSResponse = response.json().await?;
            let url = body
                .output
                .audio_url
                .ok_or_else(|| VideoError::ApiError("No audio URL in response".to_string()))?;
            self.client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?
        } else {
            response.bytes().await?
        };

        tokio::fs::write(output, audio_data).await?;

        info!("Speech saved to: {}", output.display());
        Ok(())
    }
}
