use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{LlmError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Preset used when the caller does not name one
    #[serde(default = "default_preset")]
    pub default_preset: String,

    /// Named model presets for quick access
    #[serde(default)]
    pub presets: HashMap<String, ModelPreset>,

    /// Provider-specific configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_preset() -> String {
    "grok".to_string()
}

/// A named model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPreset {
    /// Provider identifier (xai, gemini, openrouter, anthropic)
    pub provider: String,

    /// Model name/identifier for the provider
    pub model: String,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (optional, can use env var instead)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom base URL (for API providers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, defaulting when it is missing
    pub fn load_from(config_path: &std::path::Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home =
            std::env::var("HOME").map_err(|_| LlmError::ConfigError("HOME not set".into()))?;
        Ok(PathBuf::from(home).join(".config/novel-audio/llm.toml"))
    }

    /// Get a preset by name
    pub fn get_preset(&self, name: &str) -> Result<&ModelPreset> {
        self.presets
            .get(name)
            .ok_or_else(|| LlmError::InvalidPreset(name.to_string()))
    }

    /// Resolve an optional preset name, falling back to `default_preset`
    pub fn resolve_preset(&self, name: Option<&str>) -> Result<&ModelPreset> {
        self.get_preset(name.unwrap_or(&self.default_preset))
    }

    /// Get provider config by provider name
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut presets = HashMap::new();

        presets.insert(
            "grok".to_string(),
            ModelPreset {
                provider: "xai".to_string(),
                model: "grok-4-0709".to_string(),
            },
        );
        presets.insert(
            "gemini".to_string(),
            ModelPreset {
                provider: "gemini".to_string(),
                model: "gemini-2.5-flash".to_string(),
            },
        );

        Self {
            default_preset: default_preset(),
            presets,
            providers: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_preset, "grok");

        let preset = config.get_preset("grok").unwrap();
        assert_eq!(preset.provider, "xai");
        assert_eq!(preset.model, "grok-4-0709");
        assert!(config.presets.contains_key("gemini"));
    }

    #[test]
    fn test_invalid_preset() {
        let config = Config::default();
        let result = config.get_preset("nonexistent");
        assert!(matches!(result, Err(LlmError::InvalidPreset(_))));
    }

    #[test]
    fn test_resolve_preset_falls_back_to_default() {
        let config = Config::default();
        assert_eq!(config.resolve_preset(None).unwrap().provider, "xai");
        assert_eq!(
            config.resolve_preset(Some("gemini")).unwrap().provider,
            "gemini"
        );
    }

    #[test]
    fn test_parse_provider_overrides() {
        let toml_str = r#"
default_preset = "router"

[presets.router]
provider = "openrouter"
model = "deepseek/deepseek-chat"

[providers.openrouter]
api_key = "sk-test"
timeout_secs = 120
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        let preset = config.resolve_preset(None).unwrap();
        assert_eq!(preset.model, "deepseek/deepseek-chat");

        let provider = config.get_provider_config("openrouter").unwrap();
        assert_eq!(provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(provider.timeout_secs, Some(120));
        assert!(provider.base_url.is_none());
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let dir = std::env::temp_dir().join("llm-client-missing-config-test");
        let config = Config::load_from(&dir.join("nope.toml")).unwrap();
        assert_eq!(config.default_preset, "grok");
    }
}
