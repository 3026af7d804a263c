//! Materialises image references (remote URLs or inline base64 payloads)
//! into files inside the workspace.
//!
//! Portraits are all-or-nothing: any failure aborts the run. Backgrounds are
//! best effort: failures are logged and the line falls back to a solid colour.

use crate::api::{bounded, ImageFetcher};
use crate::error::{Result, VideoError};
use crate::script::Character;
use crate::workspace::Workspace;
use base64::{engine::general_purpose, Engine as _};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_EXTENSION: &str = "png";

/// A parsed image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef<'a> {
    Remote(&'a str),
    /// `data:` URI or bare base64; `extension` is None when the payload must be sniffed
    Inline {
        extension: Option<String>,
        payload: &'a str,
    },
}

impl<'a> ImageRef<'a> {
    /// `None` for a blank reference.
    pub fn parse(reference: &'a str) -> Option<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }

        let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Some(ImageRef::Remote(reference));
        }

        if lower.starts_with("data:") {
            let (header, payload) = reference.split_once(',').unwrap_or((reference, ""));
            let mime = header["data:".len()..].split(';').next().unwrap_or("");
            return Some(ImageRef::Inline {
                extension: extension_from_mime(mime),
                payload,
            });
        }

        Some(ImageRef::Inline {
            extension: None,
            payload: reference,
        })
    }
}

/// Extension from the URL path, ignoring query and fragment.
pub fn extension_from_url(url: &str) -> String {
    let path = reqwest::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.split(['?', '#']).next().unwrap_or("").to_string());

    path.rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| is_plausible_extension(ext))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn extension_from_mime(mime: &str) -> Option<String> {
    let subtype = mime.trim().to_ascii_lowercase();
    let subtype = subtype.strip_prefix("image/")?;
    let ext = match subtype {
        "jpeg" | "pjpeg" => "jpg",
        "svg+xml" => "svg",
        "x-icon" | "vnd.microsoft.icon" => "ico",
        other => other,
    };
    is_plausible_extension(ext).then(|| ext.to_string())
}

fn is_plausible_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Image type from its leading bytes, `None` for anything that is not a
/// raster format ffmpeg can loop as a still.
pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    let ext = match bytes {
        [0x89, b'P', b'N', b'G', ..] => "png",
        [0xFF, 0xD8, 0xFF, ..] => "jpg",
        [b'G', b'I', b'F', b'8', ..] => "gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "webp",
        [b'B', b'M', ..] => "bmp",
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => "tiff",
        _ => return None,
    };
    Some(ext)
}

fn decode_inline(payload: &str) -> std::result::Result<Vec<u8>, String> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err("inline payload is empty".to_string());
    }
    general_purpose::STANDARD
        .decode(&compact)
        .or_else(|_| general_purpose::URL_SAFE.decode(&compact))
        .map_err(|e| format!("malformed base64 payload: {}", e))
}

/// Local character portrait
#[derive(Debug, Clone)]
pub struct Portrait {
    pub name: String,
    pub path: PathBuf,
}

/// Portraits resolved once per run, in `characters` order
#[derive(Debug, Clone, Default)]
pub struct ResolvedAssets {
    pub portraits: Vec<Portrait>,
}

impl ResolvedAssets {
    /// The left and right portraits, if there are exactly two.
    pub fn pair(&self) -> Option<[&Portrait; 2]> {
        match self.portraits.as_slice() {
            [left, right] => Some([left, right]),
            _ => None,
        }
    }

    /// Position of a speaker's portrait, which is also its screen slot.
    pub fn slot_of(&self, speaker: &str) -> Option<usize> {
        self.portraits.iter().position(|p| p.name == speaker)
    }
}

pub struct AssetResolver<'a> {
    fetcher: &'a dyn ImageFetcher,
    timeout: Duration,
}

impl<'a> AssetResolver<'a> {
    pub fn new(fetcher: &'a dyn ImageFetcher, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Decode or download `reference` into the file chosen by `destination`
    /// (which receives the inferred extension).
    pub async fn materialize<F>(&self, reference: &str, destination: F) -> Result<PathBuf>
    where
        F: FnOnce(&str) -> PathBuf,
    {
        let parsed = ImageRef::parse(reference)
            .ok_or_else(|| VideoError::asset(reference, "no image reference"))?;

        let (bytes, declared) = match parsed {
            ImageRef::Remote(url) => {
                let bytes = bounded("image download", self.timeout, self.fetcher.fetch(url))
                    .await
                    .map_err(|e| VideoError::asset(url, e.to_string()))?;
                (bytes, Some(extension_from_url(url)))
            }
            ImageRef::Inline { extension, payload } => {
                let bytes =
                    decode_inline(payload).map_err(|reason| VideoError::asset(reference, reason))?;
                (bytes, extension)
            }
        };

        if bytes.is_empty() {
            return Err(VideoError::asset(reference, "image is empty"));
        }
        // Placeholders such as "none" decode as base64, and image hosts answer
        // some misses with a 200 HTML page.
        let sniffed =
            sniff_extension(&bytes).ok_or_else(|| VideoError::asset(reference, "not an image"))?;
        let extension = declared.unwrap_or_else(|| sniffed.to_string());

        let path = destination(&extension);
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| VideoError::asset(reference, format!("cannot write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Resolve every character portrait. Any failure is fatal for the run.
    pub async fn resolve_portraits(
        &self,
        characters: &[Character],
        workspace: &Workspace,
    ) -> Result<ResolvedAssets> {
        let mut portraits = Vec::with_capacity(characters.len());
        for (slot, character) in characters.iter().enumerate() {
            info!("Resolving portrait for {}", character.name);
            let path = self
                .materialize(&character.image_url, |ext| workspace.portrait_path(slot, ext))
                .await?;
            info!("Portrait for {} saved to {}", character.name, path.display());
            portraits.push(Portrait {
                name: character.name.clone(),
                path,
            });
        }
        Ok(ResolvedAssets { portraits })
    }

    /// Resolve a line's background, or `None` when the line should use the
    /// fallback colour. Never fails.
    pub async fn resolve_background(
        &self,
        index: usize,
        reference: Option<&str>,
        workspace: &Workspace,
    ) -> Option<PathBuf> {
        let reference = reference.filter(|r| !r.trim().is_empty())?;
        match self
            .materialize(reference, |ext| workspace.background_path(index, ext))
            .await
        {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Line {}: background unavailable, using fallback colour: {}", index, e);
                None
            }
        }
    }
}
