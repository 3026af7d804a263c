use crate::error::{Result, VideoError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_SCRIPT_PATH: &str = "script.json";

const RESERVED_FILENAME_CHARS: [char; 9] = ['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

/// A conversation script: two speakers and the lines they read, in order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Video title, also used to name the output file
    pub title: String,
    /// Exactly two speakers; the first sits on the left, the second on the right
    pub characters: Vec<Character>,
    /// Dialogue in playback order
    pub dialogue: Vec<DialogueLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    /// Remote URL or inline base64 image
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueLine {
    /// Must match one `Character::name`
    pub speaker: String,
    /// Narration text
    pub line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    /// Optional background, remote URL or inline base64 image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bg_image_url: Option<String>,
}

impl Script {
    /// Read and validate a script document. Every failure here is an `InputError`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            VideoError::InputError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&raw)
            .map_err(|e| VideoError::InputError(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let script: Script = serde_json::from_str(raw)
            .map_err(|e| VideoError::InputError(format!("malformed script document: {}", e)))?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.characters.len() != 2 {
            return Err(VideoError::InputError(format!(
                "expected exactly 2 characters, found {}",
                self.characters.len()
            )));
        }

        let mut names = HashSet::new();
        for character in &self.characters {
            if character.name.trim().is_empty() {
                return Err(VideoError::InputError("character name is empty".to_string()));
            }
            if !names.insert(character.name.as_str()) {
                return Err(VideoError::InputError(format!(
                    "duplicate character name '{}'",
                    character.name
                )));
            }
        }

        if self.dialogue.is_empty() {
            return Err(VideoError::InputError("dialogue is empty".to_string()));
        }

        for (index, line) in self.dialogue.iter().enumerate() {
            if !names.contains(line.speaker.as_str()) {
                return Err(VideoError::InputError(format!(
                    "line {} is spoken by unknown character '{}'",
                    index, line.speaker
                )));
            }
            if line.line.trim().is_empty() {
                return Err(VideoError::InputError(format!("line {} has no text", index)));
            }
        }

        Ok(())
    }

    /// Output file name derived from the title with filesystem-reserved characters replaced.
    pub fn output_file_name(&self) -> String {
        format!("{}.mp4", sanitize_title(&self.title))
    }
}

pub fn sanitize_title(title: &str) -> String {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return "video".to_string();
    }
    trimmed
        .chars()
        .map(|c| {
            if RESERVED_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_json() -> String {
        serde_json::json!({
            "title": "광전효과: 빛은 입자?",
            "characters": [
                {"name": "Alex", "image_url": "https://placehold.co/400x400/3E4A89/FFFFFF/png?text=Alex"},
                {"name": "Ben", "image_url": "https://placehold.co/400x400/A84834/FFFFFF/png?text=Ben"}
            ],
            "dialogue": [
                {"speaker": "Alex", "line": "안녕하세요! 오늘은 '광전효과'에 대해 알아볼까요?", "bg_image_url": "https://example.com/lab.jpg"},
                {"speaker": "Ben", "line": "빛을 쏘면 금속에서 전자가 튀어나오는 현상 맞죠?", "keywords": ["electron", "metal"]}
            ]
        })
        .to_string()
    }

    #[test]
    fn parses_a_valid_document() {
        let script = Script::from_json(&sample_json()).unwrap();
        assert_eq!(script.characters.len(), 2);
        assert_eq!(script.dialogue.len(), 2);
        assert_eq!(
            script.dialogue[0].bg_image_url.as_deref(),
            Some("https://example.com/lab.jpg")
        );
        assert!(script.dialogue[0].keywords.is_none());
        assert_eq!(script.dialogue[1].keywords.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn missing_required_keys_are_input_errors() {
        let err = Script::from_json(r#"{"title": "x", "characters": []}"#).unwrap_err();
        assert!(matches!(err, VideoError::InputError(_)));

        let err = Script::from_json("not json").unwrap_err();
        assert!(matches!(err, VideoError::InputError(_)));
    }

    #[test]
    fn rejects_single_character() {
        let raw = serde_json::json!({
            "title": "solo",
            "characters": [{"name": "Alex", "image_url": "https://example.com/a.png"}],
            "dialogue": [{"speaker": "Alex", "line": "hello"}]
        })
        .to_string();
        let err = Script::from_json(&raw).unwrap_err();
        assert!(err.to_string().contains("exactly 2 characters"));
    }

    #[test]
    fn rejects_unknown_speaker_and_empty_dialogue() {
        let mut script = Script::from_json(&sample_json()).unwrap();
        script.dialogue[1].speaker = "Carol".to_string();
        assert!(script.validate().is_err());

        script.dialogue.clear();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("dialogue is empty"));
    }

    #[test]
    fn rejects_duplicate_names_and_blank_lines() {
        let mut script = Script::from_json(&sample_json()).unwrap();
        script.characters[1].name = "Alex".to_string();
        assert!(script.validate().is_err());

        let mut script = Script::from_json(&sample_json()).unwrap();
        script.dialogue[0].line = "   ".to_string();
        assert!(script.validate().is_err());
    }

    #[test]
    fn output_name_has_no_reserved_characters() {
        let titles = [
            "a\\b/c*d?e:f\"g<h>i|j",
            "광전효과: 빛은 입자?",
            "plain title",
            "",
            "   ",
            "???",
        ];
        for title in titles {
            let name = sanitize_title(title);
            assert!(!name.is_empty());
            assert!(!name.contains(RESERVED_FILENAME_CHARS), "{name}");
        }
        assert_eq!(sanitize_title("a/b:c"), "a_b_c");
        assert_eq!(sanitize_title(""), "video");
    }

    #[test]
    fn output_file_name_uses_title() {
        let script = Script::from_json(&sample_json()).unwrap();
        assert_eq!(script.output_file_name(), "광전효과_ 빛은 입자_.mp4");
    }

    #[tokio::test]
    async fn load_reports_missing_file_as_input_error() {
        let err = Script::load("/definitely/not/here/script.json")
            .await
            .unwrap_err();
        assert!(matches!(err, VideoError::InputError(_)));
    }
}
