use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Input error: {0}")]
    InputError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Asset unavailable ({reference}): {reason}")]
    AssetUnavailable { reference: String, reason: String },

    #[error("Speech synthesis failed for line {line}: {reason}")]
    SynthesisFailure { line: usize, reason: String },

    #[error("Render failed for line {line}: {reason}")]
    RenderFailure { line: usize, reason: String },

    #[error("Concatenation failed: {0}")]
    ConcatenationFailure(String),

    #[error("Cleanup failed: {0}")]
    CleanupFailure(String),

    #[error("External process error: {0}")]
    ProcessError(String),

    #[error("{operation} timed out after {limit:?}")]
    Timeout { operation: String, limit: Duration },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl VideoError {
    /// Dialogue index the failure belongs to, if it is tied to a single line.
    pub fn line(&self) -> Option<usize> {
        match self {
            VideoError::SynthesisFailure { line, .. } | VideoError::RenderFailure { line, .. } => {
                Some(*line)
            }
            _ => None,
        }
    }

    pub fn asset(reference: &str, reason: impl Into<String>) -> Self {
        VideoError::AssetUnavailable {
            reference: abbreviate(reference),
            reason: reason.into(),
        }
    }
}

/// Inline payloads can be megabytes long; keep error messages readable.
fn abbreviate(reference: &str) -> String {
    const MAX: usize = 96;
    if reference.chars().count() <= MAX {
        reference.to_string()
    } else {
        let head: String = reference.chars().take(MAX).collect();
        format!("{}...", head)
    }
}

pub type Result<T> = std::result::Result<T, VideoError>;
