//! Character template loading and placeholder substitution.
//!
//! Characters are JSON files in a templates directory. The core treats the
//! template bag as opaque: it looks templates up by name (with an optional
//! platform-qualified override) and substitutes named placeholders verbatim.

use crate::error::{CharacterError, Result};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// A loaded character definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub name: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub personality: String,

    /// Adapters this character runs on ("discord", "telegram").
    #[serde(default)]
    pub clients: Vec<String>,

    /// Prompt templates keyed by name, e.g. "message_handler",
    /// "should_respond", "marketing", or platform-qualified variants like
    /// "telegram_marketing".
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

impl Character {
    /// Look up a template, preferring a platform-qualified key
    /// (`"{platform}_{kind}"`) over the bare kind.
    pub fn template(&self, kind: &str, platform: Option<&str>) -> Option<&str> {
        if let Some(platform) = platform {
            let qualified = format!("{platform}_{kind}");
            if let Some(template) = self.templates.get(&qualified) {
                return Some(template.as_str());
            }
        }
        self.templates.get(kind).map(String::as_str)
    }

    /// Look up a template or fail with the character and template name.
    pub fn require_template(&self, kind: &str, platform: Option<&str>) -> Result<&str> {
        self.template(kind, platform)
            .ok_or_else(|| {
                CharacterError::MissingTemplate {
                    name: self.name.clone(),
                    template: kind.to_string(),
                }
                .into()
            })
    }

    /// Render the reply prompt for the given history and message.
    pub fn reply_prompt(&self, platform: Option<&str>, history: &str, message: &str) -> Result<String> {
        let template = self.require_template("message_handler", platform)?;
        Ok(self.fill(template, history, message))
    }

    /// Render the relevance-check prompt for the given history.
    pub fn should_respond_prompt(&self, platform: Option<&str>, history: &str) -> Result<String> {
        let template = self.require_template("should_respond", platform)?;
        Ok(self.fill(template, history, ""))
    }

    /// Render the marketing prompt.
    pub fn marketing_prompt(&self, platform: Option<&str>) -> Result<String> {
        let template = self.require_template("marketing", platform)?;
        Ok(self.fill(template, "", ""))
    }

    fn fill(&self, template: &str, history: &str, message: &str) -> String {
        substitute(
            template,
            &[
                ("history", history),
                ("message", message),
                ("character_name", &self.name),
                ("personality", &self.personality),
            ],
        )
    }
}

/// Replace `{key}` placeholders with their values, verbatim.
/// Unknown placeholders are left untouched.
pub fn substitute(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in values {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Loads and indexes character definitions from a templates directory.
#[derive(Debug, Clone)]
pub struct CharacterManager {
    characters: HashMap<String, Arc<Character>>,
}

impl CharacterManager {
    /// Load all `*.json` character files from the given directory.
    ///
    /// Individual files that fail to parse are logged and skipped so one
    /// broken template cannot take down the rest.
    pub fn load(templates_dir: &Path) -> Result<Self> {
        if !templates_dir.is_dir() {
            return Err(CharacterError::TemplatesDirMissing(
                templates_dir.display().to_string(),
            )
            .into());
        }

        let mut characters = HashMap::new();
        let entries = std::fs::read_dir(templates_dir)
            .with_context(|| format!("failed to read {}", templates_dir.display()))?;

        for entry in entries {
            let entry = entry.with_context(|| "failed to read directory entry")?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match Self::load_file(&path) {
                Ok(character) => {
                    tracing::debug!(name = %character.name, path = %path.display(), "loaded character");
                    characters.insert(character.name.clone(), Arc::new(character));
                }
                Err(error) => {
                    tracing::error!(%error, path = %path.display(), "failed to load character");
                }
            }
        }

        Ok(Self { characters })
    }

    fn load_file(path: &Path) -> Result<Character> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let character: Character = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        if character.name.is_empty() {
            return Err(CharacterError::Other(anyhow::anyhow!(
                "character file {} has no name",
                path.display()
            ))
            .into());
        }
        Ok(character)
    }

    /// Names of all loaded characters.
    pub fn names(&self) -> Vec<&str> {
        self.characters.keys().map(String::as_str).collect()
    }

    /// Get a character by name.
    pub fn get(&self, name: &str) -> Option<Arc<Character>> {
        self.characters.get(name).cloned()
    }

    /// Get a character by name, or the only character if the directory holds
    /// exactly one, or an error naming what was asked for.
    pub fn select(&self, name: Option<&str>, templates_dir: &Path) -> Result<Arc<Character>> {
        match name {
            Some(name) => self
                .get(name)
                .ok_or_else(|| CharacterError::NotFound(name.to_string()).into()),
            None => {
                let mut iter = self.characters.values();
                match (iter.next(), iter.next()) {
                    (Some(only), None) => Ok(only.clone()),
                    (None, _) => Err(CharacterError::Empty(
                        templates_dir.display().to_string(),
                    )
                    .into()),
                    _ => Err(CharacterError::NotFound(format!(
                        "multiple characters available ({}), pass --character",
                        self.names().join(", ")
                    ))
                    .into()),
                }
            }
        }
    }
}
