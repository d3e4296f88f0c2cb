//! Configuration for a Figaro run.
//!
//! Settings are resolved with precedence: CLI flags > environment >
//! `~/.figaro/config.toml` > defaults. The MCP server registry
//! (`servers.json`) is loaded separately by `figaro-mcp`; this crate only
//! provides the directory it lives in.

use figaro_types::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The default Anthropic API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.anthropic.com";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// The default max tokens for one assistant turn.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// The default container runtime program.
pub const DEFAULT_RUNTIME: &str = "docker";

/// Resolved configuration.
#[derive(Debug, Clone)]
pub struct FigaroConfig {
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_base_url: String,
    pub container_runtime: String,
    pub config_dir: PathBuf,
}

/// Settings readable from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeSettings {
    /// Container runtime program used to launch tool servers.
    pub program: Option<String>,
}

/// Overrides from the command line, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

impl FigaroConfig {
    /// Load and resolve configuration from all sources.
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));

        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|key| !key.is_empty())
            .or(settings.api.api_key)
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set ANTHROPIC_API_KEY or add to ~/.figaro/config.toml)".into(),
            })?;

        let model = overrides
            .model
            .or_else(|| std::env::var("FIGARO_MODEL").ok())
            .or(settings.api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let max_tokens = overrides
            .max_tokens
            .or(settings.api.max_tokens)
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let api_base_url = std::env::var("ANTHROPIC_API_BASE_URL")
            .ok()
            .or(settings.api.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let container_runtime = std::env::var("FIGARO_CONTAINER_RUNTIME")
            .ok()
            .or(settings.runtime.program)
            .unwrap_or_else(|| DEFAULT_RUNTIME.to_string());

        Ok(FigaroConfig {
            api_key,
            model,
            max_tokens,
            api_base_url,
            container_runtime,
            config_dir,
        })
    }

    /// Path of the MCP server registry file.
    pub fn servers_path(&self) -> PathBuf {
        self.config_dir.join("servers.json")
    }
}

/// The Figaro config directory (`~/.figaro/`, or `FIGARO_CONFIG_DIR`).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FIGARO_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".figaro")
}

/// Parse a TOML settings file, falling back to defaults on any error.
fn load_settings_file(path: &std::path::Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_empty() {
        let settings = SettingsFile::default();
        assert!(settings.api.api_key.is_none());
        assert!(settings.runtime.program.is_none());
    }

    #[test]
    fn settings_toml_parse() {
        let toml_str = r#"
[api]
model = "claude-sonnet-4-5"
max_tokens = 2048

[runtime]
program = "podman"
"#;
        let settings: SettingsFile = toml::from_str(toml_str).unwrap();
        assert_eq!(settings.api.model.as_deref(), Some("claude-sonnet-4-5"));
        assert_eq!(settings.api.max_tokens, Some(2048));
        assert_eq!(settings.runtime.program.as_deref(), Some("podman"));
    }

    #[test]
    fn settings_missing_sections_default() {
        let settings: SettingsFile = toml::from_str("").unwrap();
        assert!(settings.api.model.is_none());
        assert!(settings.runtime.program.is_none());
    }
}
