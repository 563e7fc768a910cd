//! Application configuration for redraft.
//!
//! User config lives at `~/.redraft/redraft.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RedraftError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "redraft.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".redraft";

// ---------------------------------------------------------------------------
// Config structs (matching redraft.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Document store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Proposal generator bridge settings.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Call-to-action defaults.
    #[serde(default)]
    pub cta: CtaConfig,
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the libSQL database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "~/.redraft/redraft.db".into()
}

/// `[generator]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Bridge command (e.g. `bun`).
    #[serde(default = "default_bridge_cmd")]
    pub bridge_cmd: String,

    /// Arguments passed to the bridge command.
    #[serde(default = "default_bridge_args")]
    pub bridge_args: Vec<String>,

    /// Working directory for the bridge subprocess (defaults to the current directory).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Model ID forwarded to the bridge.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the provider API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Maximum characters of plain-text body included in a prompt.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            bridge_cmd: default_bridge_cmd(),
            bridge_args: default_bridge_args(),
            working_dir: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_prompt_chars: default_max_prompt_chars(),
        }
    }
}

fn default_bridge_cmd() -> String {
    "bun".into()
}
fn default_bridge_args() -> Vec<String> {
    vec!["run".into(), "bridge/src/bridge.ts".into()]
}
fn default_model() -> String {
    "gpt-4.1-mini".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_max_prompt_chars() -> usize {
    9000
}

/// `[cta]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtaConfig {
    /// Link text used when a placement omits one.
    #[serde(default = "default_cta_text")]
    pub default_text: String,

    /// Link target used when a placement omits one or supplies an unsafe URL.
    #[serde(default = "default_cta_url")]
    pub default_url: String,
}

impl Default for CtaConfig {
    fn default() -> Self {
        Self {
            default_text: default_cta_text(),
            default_url: default_cta_url(),
        }
    }
}

fn default_cta_text() -> String {
    "Contact us".into()
}
fn default_cta_url() -> String {
    "/contact".into()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.redraft/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| RedraftError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.redraft/redraft.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| RedraftError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| RedraftError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| RedraftError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| RedraftError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| RedraftError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` against the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| RedraftError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

/// Check that the generator API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.generator.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(RedraftError::config(format!(
            "provider API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("database_path"));
        assert!(toml_str.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.generator.max_prompt_chars, 9000);
        assert_eq!(parsed.cta.default_url, "/contact");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[generator]
bridge_cmd = "node"
bridge_args = ["bridge.js"]

[cta]
default_text = "Book a call"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generator.bridge_cmd, "node");
        assert_eq!(config.generator.bridge_args, vec!["bridge.js".to_string()]);
        assert_eq!(config.generator.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.cta.default_text, "Book a call");
        assert_eq!(config.cta.default_url, "/contact");
        assert_eq!(config.storage.database_path, "~/.redraft/redraft.db");
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        let path = expand_home("/tmp/redraft.db").expect("expand");
        assert_eq!(path, PathBuf::from("/tmp/redraft.db"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.generator.api_key_env = "REDRAFT_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
