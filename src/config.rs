//! TOML configuration parsing.
//!
//! Every section has defaults, so an empty file (or [`Config::minimal`]) is a
//! valid configuration. Only the gateway credential lives outside the file:
//! it is read from the environment variable named by `gateway.api_key_env`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// Directory holding bundled JSON assets.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    /// Asset name loaded for knowledge-base lookups.
    #[serde(default = "default_asset")]
    pub asset: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            assets_dir: default_assets_dir(),
            asset: default_asset(),
        }
    }
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("./assets")
}
fn default_asset() -> String {
    "data.json".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

impl GatewayConfig {
    /// Reads the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// External commands backing the voice collaborators.
///
/// Each command is an argument vector. `{path}` is replaced with the audio
/// file path and `{text}` with the text to speak.
#[derive(Debug, Deserialize, Clone)]
pub struct VoiceConfig {
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,
    #[serde(default)]
    pub record_command: Vec<String>,
    #[serde(default)]
    pub transcribe_command: Vec<String>,
    #[serde(default)]
    pub speak_command: Vec<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            record_command: Vec::new(),
            transcribe_command: Vec::new(),
            speak_command: Vec::new(),
        }
    }
}

fn default_recordings_dir() -> PathBuf {
    std::env::temp_dir().join("kbchat")
}

impl Config {
    /// Configuration used when no config file is present.
    pub fn minimal() -> Self {
        Self {
            knowledge: KnowledgeConfig::default(),
            gateway: GatewayConfig::default(),
            server: ServerConfig::default(),
            voice: VoiceConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Loads the config file if it exists, otherwise falls back to [`Config::minimal`].
pub fn load_or_minimal(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.knowledge.asset.trim().is_empty() {
        anyhow::bail!("knowledge.asset must not be empty");
    }

    if config.gateway.model.trim().is_empty() {
        anyhow::bail!("gateway.model must not be empty");
    }

    let base = config.gateway.base_url.as_str();
    if !base.starts_with("http://") && !base.starts_with("https://") {
        anyhow::bail!("gateway.base_url must start with http:// or https://");
    }

    if config.gateway.api_key_env.trim().is_empty() {
        anyhow::bail!("gateway.api_key_env must not be empty");
    }

    for (name, cmd) in [
        ("record_command", &config.voice.record_command),
        ("transcribe_command", &config.voice.transcribe_command),
    ] {
        if !cmd.is_empty() && !cmd.iter().any(|arg| arg.contains("{path}")) {
            anyhow::bail!("voice.{} must contain a {{path}} placeholder", name);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.knowledge.asset, "data.json");
        assert_eq!(config.gateway.model, "gemini-1.5-flash");
        assert_eq!(config.gateway.api_key_env, "GEMINI_API_KEY");
        assert!(config.voice.record_command.is_empty());
    }

    #[test]
    fn test_overrides() {
        let config = parse(
            r#"
[knowledge]
assets_dir = "/srv/kb"
asset = "facts.json"

[gateway]
model = "gemini-2.0-flash"
"#,
        )
        .unwrap();
        assert_eq!(config.knowledge.assets_dir, PathBuf::from("/srv/kb"));
        assert_eq!(config.knowledge.asset, "facts.json");
        assert_eq!(config.gateway.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let err = parse("[gateway]\nbase_url = \"ftp://example\"").unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_rejects_record_command_without_placeholder() {
        let err = parse("[voice]\nrecord_command = [\"arecord\", \"out.wav\"]").unwrap_err();
        assert!(err.to_string().contains("{path}"));
    }
}
