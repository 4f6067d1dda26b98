//! TOML configuration file loading
//!
//! Supports `~/.config/sparky/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SparkyConfigFile {
    /// Persona identifier (e.g. "sparky")
    #[serde(default)]
    pub persona: Option<String>,

    /// Live conversation configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// One-shot speech and translation configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Live conversation configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Live model identifier
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Puck")
    pub voice: Option<String>,

    /// Websocket endpoint
    pub endpoint: Option<String>,

    /// Seconds to wait for the setup acknowledgment
    pub connect_timeout_secs: Option<u64>,

    /// Samples per outbound microphone frame
    pub frame_size: Option<usize>,
}

/// One-shot speech configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Display language (e.g. "Spanish")
    pub language: Option<String>,

    /// TTS model identifier
    pub tts_model: Option<String>,

    /// TTS voice name (e.g. "Zephyr")
    pub tts_voice: Option<String>,

    /// Translation model identifier
    pub translate_model: Option<String>,

    /// REST API base URL
    pub api_base_url: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SparkyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SparkyConfigFile {
    config_file_path().map_or_else(SparkyConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> SparkyConfigFile {
    if !path.exists() {
        return SparkyConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SparkyConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SparkyConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/sparky/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("sparky").join("config.toml"))
}
