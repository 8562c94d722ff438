//! Prompt policy: how many phrases to ask for and how long they should be.
//!
//! Optional TOML file with a single `[prompt]` table. Missing keys fall back
//! to the defaults.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompt: PromptPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PromptPolicy {
    pub phrase_count: u32,
    pub min_chars: u32,
    pub max_chars: u32,
    /// Who the phrases are for, spliced into the instruction.
    pub audience: String,
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self {
            phrase_count: 3,
            min_chars: 7,
            max_chars: 20,
            audience: "a teenager or child".to_string(),
        }
    }
}

impl PromptPolicy {
    /// Load a policy from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read prompt file {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("bad prompt file {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        let file: PromptFile = toml::from_str(content)?;
        Ok(file.prompt)
    }

    /// Render the instruction for one character.
    pub fn render(&self, key: &str) -> String {
        let count = match self.phrase_count {
            1 => "one".to_string(),
            2 => "two".to_string(),
            3 => "three".to_string(),
            n => n.to_string(),
        };
        format!(
            "Generate {count} short chinese phrases that each include the chinese character \"{key}\". \
             The phrases should be ones that {audience} would encounter or use in daily life. \
             Each phrase needs to be at least {min} to {max} characters long. \
             Output JSON, including the pinyin, translation and context if available.",
            audience = self.audience,
            min = self.min_chars,
            max = self.max_chars,
        )
    }
}
