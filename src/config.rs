//! Configuration file loading with environment variable overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable holding the backend credential.
pub const TOKEN_ENV: &str = "REPLICATE_API_TOKEN";
/// Environment variable overriding the backend API base URL.
pub const API_BASE_ENV: &str = "REPLICATE_API_BASE";
/// Largest request body the HTTP server buffers by default. Sized for photos
/// sent inline as base64 data URIs.
pub const DEFAULT_MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// API key configuration.
    #[serde(default)]
    pub keys: KeysConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend connection settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Output handling.
    #[serde(default)]
    pub output: OutputConfig,
}

/// API key configuration.
#[derive(Debug, Default, Deserialize)]
pub struct KeysConfig {
    /// Replicate API token.
    pub replicate: Option<String>,
}

/// HTTP listener settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Backend connection settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the prediction API.
    pub api_base: String,
    /// Delay between prediction status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Give up on a prediction after this many seconds.
    pub poll_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.replicate.com/v1".to_string(),
            poll_interval_ms: 1000,
            poll_timeout_secs: 600,
        }
    }
}

/// Output handling.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Return objects without a locator field as degraded results instead
    /// of failing the request.
    pub allow_degraded: bool,
}

impl Config {
    /// Load configuration from the given path, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
        toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
    }

    /// Get the Replicate API token, preferring the environment variable.
    #[must_use]
    pub fn replicate_key(&self) -> Option<String> {
        self.replicate_key_from(std::env::var(TOKEN_ENV).ok())
    }

    /// Resolve the token from an already-read environment value.
    ///
    /// Blank values count as unset.
    #[must_use]
    pub fn replicate_key_from(&self, env_value: Option<String>) -> Option<String> {
        non_blank(env_value).or_else(|| non_blank(self.keys.replicate.clone()))
    }

    /// Get the backend API base URL, preferring the environment variable.
    #[must_use]
    pub fn api_base(&self) -> String {
        non_blank(std::env::var(API_BASE_ENV).ok())
            .unwrap_or_else(|| self.backend.api_base.clone())
            .trim_end_matches('/')
            .to_string()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Discover the config file path using the resolution order:
/// 1. Explicit path (from `--config` flag)
/// 2. `MEDIAGATE_CONFIG` environment variable
/// 3. `~/.config/mediagate/config.toml`
#[must_use]
pub fn discover_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }

    if let Ok(p) = std::env::var("MEDIAGATE_CONFIG") {
        return PathBuf::from(p);
    }

    default_config_path()
}

/// Default config path: `~/.config/mediagate/config.toml`.
fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config/mediagate/config.toml")
    } else {
        PathBuf::from("mediagate.toml")
    }
}
