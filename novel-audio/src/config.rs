//! novel-audio configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::DEFAULT_CHUNK_PAUSE_MS;
use crate::text::splitter::DEFAULT_MAX_CHUNK_LENGTH;
use crate::translate::{LanguagePair, TranslationOptions};
use crate::tts::TtsOptions;
use crate::tts::alltalk::DEFAULT_BASE_URL;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NovelConfig {
    /// Longest chunk sent to the TTS server, in characters
    #[serde(default = "default_max_chunk_length")]
    pub max_chunk_length: usize,

    /// Pack consecutive short lines into one TTS chunk
    #[serde(default)]
    pub group_lines: bool,

    /// Glossary file; defaults to `glossary.json` in the project
    #[serde(default)]
    pub glossary_path: Option<PathBuf>,

    /// Voice sample the TTS server clones
    #[serde(default)]
    pub voice_reference: Option<PathBuf>,

    /// Speaker voice map for dialogue-tagged chapters; defaults to
    /// `character_voice_config.json` in the project
    #[serde(default)]
    pub voice_map_path: Option<PathBuf>,

    /// Silence between chunks in a chapter WAV
    #[serde(default = "default_chunk_pause_ms")]
    pub chunk_pause_ms: u32,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Playback speed (0.25-2.0)
    #[serde(default = "default_speed")]
    pub speed: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// llm-client preset; None uses its default preset
    #[serde(default)]
    pub preset: Option<String>,

    #[serde(default = "default_source_language")]
    pub source_language: String,

    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Longest source chunk per request, in characters
    #[serde(default = "default_translation_chunk_length")]
    pub chunk_length: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Attempts per chapter for transient failures
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_max_chunk_length() -> usize {
    DEFAULT_MAX_CHUNK_LENGTH
}

fn default_chunk_pause_ms() -> u32 {
    DEFAULT_CHUNK_PAUSE_MS
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_speed() -> f32 {
    1.0
}

fn default_request_timeout_secs() -> u64 {
    720
}

fn default_source_language() -> String {
    "Chinese".to_string()
}

fn default_target_language() -> String {
    "English".to_string()
}

fn default_translation_chunk_length() -> usize {
    6000
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

impl Default for NovelConfig {
    fn default() -> Self {
        Self {
            max_chunk_length: default_max_chunk_length(),
            group_lines: false,
            glossary_path: None,
            voice_reference: None,
            voice_map_path: None,
            chunk_pause_ms: default_chunk_pause_ms(),
            tts: TtsConfig::default(),
            translation: TranslationConfig::default(),
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            language: default_language(),
            speed: default_speed(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            preset: None,
            source_language: default_source_language(),
            target_language: default_target_language(),
            chunk_length: default_translation_chunk_length(),
            temperature: default_temperature(),
            max_attempts: default_max_attempts(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl NovelConfig {
    /// Get the config file path: ~/.config/novel-audio/config.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("novel-audio").join("config.toml"))
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: NovelConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save to `path`, or the default location when `None`.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn tts_options(&self) -> TtsOptions {
        let options = TtsOptions::new()
            .with_language(self.tts.language.clone())
            .with_speed(self.tts.speed);
        match &self.voice_reference {
            Some(voice) => options.with_voice_reference(voice),
            None => options,
        }
    }

    pub fn tts_timeout(&self) -> Duration {
        Duration::from_secs(self.tts.request_timeout_secs)
    }

    pub fn translation_options(&self) -> TranslationOptions {
        TranslationOptions {
            languages: LanguagePair {
                source: self.translation.source_language.clone(),
                target: self.translation.target_language.clone(),
            },
            temperature: self.translation.temperature,
            chunk_length: self.translation.chunk_length,
        }
    }
}
