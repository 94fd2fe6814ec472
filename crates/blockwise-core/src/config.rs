//! Editor configuration.
//!
//! ## Learning: Serde for Serialization
//!
//! `#[serde(default)]` on every section means a config file only needs the
//! keys it changes; everything else falls back to `Default::default()`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Editing behaviour
    pub editor: EditorConfig,

    /// Serialization output settings
    pub export: ExportConfig,

    /// Keyboard settings
    pub keyboard: KeyboardConfig,
}

impl Config {
    /// Loads config from the default location, falling back to defaults.
    pub fn load() -> Self {
        match Self::load_from_default_path() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Loads config from a file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    fn load_from_default_path() -> Result<Self, ConfigError> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default config file path.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("blockwise").join("config.toml"))
    }

    /// Writes the config to `path`, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Saves the config to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path()?)
    }
}

/// How malformed persisted content is treated on load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPolicy {
    /// Reject the document
    #[default]
    Strict,
    /// Re-index orders, drop unknown block types, fill empty elements
    Repair,
}

/// Editing behaviour configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Undo history limit
    pub undo_limit: usize,

    /// Consecutive text edits in one block within this window undo together (ms)
    pub coalesce_ms: u64,

    /// Deepest indentation a block may reach
    pub max_depth: usize,

    /// Block type that toggling a block onto its own type reverts to
    pub default_block: String,

    pub load_policy: LoadPolicy,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_limit: 100,
            coalesce_ms: 300,
            max_depth: 8,
            default_block: "Paragraph".to_string(),
            load_policy: LoadPolicy::Strict,
        }
    }
}

/// Serialization output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Width of the email body table in pixels
    pub email_width: u32,

    /// Font stack of the email body
    pub email_font_family: String,

    /// Background colour around the email body
    pub email_background: String,

    /// Text placed between Markdown blocks
    pub markdown_block_separator: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            email_width: 600,
            email_font_family: "Arial, Helvetica, sans-serif".to_string(),
            email_background: "#ffffff".to_string(),
            markdown_block_separator: "\n\n".to_string(),
        }
    }
}

/// Keyboard configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Custom key bindings: combo (`"mod+shift+d"`) to command name
    pub bindings: BTreeMap<String, String>,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config directory not found")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
