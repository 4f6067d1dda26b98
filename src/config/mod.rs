//! Configuration management for Sparky

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::genai::{DEFAULT_BASE_URL, GenAiClient};
use crate::live::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_LIVE_ENDPOINT, DEFAULT_LIVE_MODEL, SessionOptions,
    WebSocketTransport,
};
use crate::persona::{DEFAULT_LIVE_VOICE, DEFAULT_PERSONA_ID, DEFAULT_TTS_VOICE};
use crate::translate::{DEFAULT_TRANSLATE_MODEL, Language};
use crate::voice::{DEFAULT_TTS_MODEL, FRAME_SIZE};
use crate::{Error, Persona, Result};
use file::SparkyConfigFile;

/// Sparky configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Active persona
    pub persona: Persona,

    /// Gemini API key
    pub api_key: Option<SecretString>,

    /// Live conversation configuration
    pub live: LiveConfig,

    /// One-shot speech configuration
    pub speech: SpeechConfig,
}

/// Live conversation configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Live model identifier
    pub model: String,

    /// Prebuilt voice name
    pub voice: String,

    /// Behavioral system instruction
    pub system_prompt: String,

    /// Websocket endpoint
    pub endpoint: String,

    /// Wait for the setup acknowledgment
    pub connect_timeout: Duration,

    /// Samples per outbound microphone frame
    pub frame_size: usize,
}

/// One-shot speech configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechConfig {
    /// Display language
    pub language: Language,

    /// TTS model identifier
    pub tts_model: String,

    /// TTS voice name
    pub tts_voice: String,

    /// Reading style prefixed to every utterance
    pub instruction: String,

    /// Translation model identifier
    pub translate_model: String,

    /// REST API base URL
    pub api_base_url: String,
}

impl Config {
    /// Load configuration
    ///
    /// Precedence is env > TOML file > persona > default. `persona_id`
    /// overrides the file's persona.
    ///
    /// # Errors
    ///
    /// Returns error if the persona cannot be loaded
    pub fn load(persona_id: Option<&str>) -> Result<Self> {
        let fc = file::load_config_file();
        Self::resolve(fc, persona_id, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the persona cannot be loaded
    pub fn resolve(
        fc: SparkyConfigFile,
        persona_id: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let persona_id = persona_id
            .map(str::to_string)
            .or(fc.persona)
            .unwrap_or_else(|| DEFAULT_PERSONA_ID.to_string());
        let persona = load_persona(&persona_id, env("SPARKY_PERSONA_DIR").map(PathBuf::from))?;

        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("API_KEY"))
            .or(fc.api_keys.gemini)
            .filter(|k| !k.is_empty())
            .map(SecretString::from);

        let connect_timeout = env("SPARKY_CONNECT_TIMEOUT")
            .and_then(|s| parse_or_warn::<u64>("SPARKY_CONNECT_TIMEOUT", &s))
            .or(fc.live.connect_timeout_secs)
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs);

        let frame_size = env("SPARKY_FRAME_SIZE")
            .and_then(|s| parse_or_warn::<usize>("SPARKY_FRAME_SIZE", &s))
            .or(fc.live.frame_size)
            .filter(|n| *n > 0)
            .unwrap_or(FRAME_SIZE);

        let live = LiveConfig {
            model: env("SPARKY_LIVE_MODEL")
                .or(fc.live.model)
                .or_else(|| persona.live_model().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_LIVE_MODEL.to_string()),
            voice: env("SPARKY_LIVE_VOICE")
                .or(fc.live.voice)
                .or_else(|| persona.live_voice().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_LIVE_VOICE.to_string()),
            system_prompt: persona.system_prompt().unwrap_or_default().to_string(),
            endpoint: env("SPARKY_LIVE_ENDPOINT")
                .or(fc.live.endpoint)
                .unwrap_or_else(|| DEFAULT_LIVE_ENDPOINT.to_string()),
            connect_timeout,
            frame_size,
        };

        let language = env("SPARKY_LANGUAGE")
            .or(fc.speech.language)
            .and_then(|s| parse_or_warn::<Language>("language", &s))
            .unwrap_or_default();

        let speech = SpeechConfig {
            language,
            tts_model: env("SPARKY_TTS_MODEL")
                .or(fc.speech.tts_model)
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.to_string()),
            tts_voice: env("SPARKY_TTS_VOICE")
                .or(fc.speech.tts_voice)
                .or_else(|| persona.tts_voice().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_TTS_VOICE.to_string()),
            instruction: persona.tts_instruction().unwrap_or_default().to_string(),
            translate_model: env("SPARKY_TRANSLATE_MODEL")
                .or(fc.speech.translate_model)
                .unwrap_or_else(|| DEFAULT_TRANSLATE_MODEL.to_string()),
            api_base_url: fc
                .speech
                .api_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        tracing::debug!(
            persona = persona.id(),
            live_model = %live.model,
            language = %speech.language,
            api_key = api_key.is_some(),
            "configuration resolved"
        );

        Ok(Self {
            persona,
            api_key,
            live,
            speech,
        })
    }

    /// The API key, required by every remote call
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn require_api_key(&self) -> Result<SecretString> {
        self.api_key
            .clone()
            .ok_or_else(|| Error::Config("GEMINI_API_KEY not set".to_string()))
    }

    /// REST client for translation and speech
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn genai_client(&self) -> Result<GenAiClient> {
        GenAiClient::new(self.require_api_key()?, self.speech.api_base_url.clone())
    }

    /// Websocket transport for live sessions
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn live_transport(&self) -> Result<WebSocketTransport> {
        Ok(WebSocketTransport::new(
            self.live.endpoint.clone(),
            self.require_api_key()?,
        ))
    }

    /// Session tunables
    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.live.model.clone(),
            frame_size: self.live.frame_size,
            connect_timeout: self.live.connect_timeout,
            ..SessionOptions::default()
        }
    }
}

/// Load a persona: `SPARKY_PERSONA_DIR` override, then embedded data
fn load_persona(persona_id: &str, dir: Option<PathBuf>) -> Result<Persona> {
    if let Some(dir) = dir {
        if dir.exists() {
            match Persona::from_dir(&dir, persona_id) {
                Ok(persona) => {
                    tracing::info!(
                        persona_id,
                        path = %dir.display(),
                        "loaded persona from SPARKY_PERSONA_DIR"
                    );
                    return Ok(persona);
                }
                Err(e) => {
                    tracing::warn!(
                        persona_id,
                        error = %e,
                        "SPARKY_PERSONA_DIR set but persona not loadable, continuing"
                    );
                }
            }
        } else {
            tracing::warn!(
                path = %dir.display(),
                "SPARKY_PERSONA_DIR set but directory does not exist"
            );
        }
    }

    Persona::embedded(persona_id)
}

fn parse_or_warn<T: std::str::FromStr>(name: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(name, value, "ignoring invalid configuration value");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn resolve(fc: SparkyConfigFile, vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(fc, None, |key| vars.get(key).cloned()).unwrap()
    }

    #[test]
    fn defaults_come_from_embedded_persona() {
        let config = resolve(SparkyConfigFile::default(), &[]);
        assert_eq!(config.persona.id(), "sparky");
        assert_eq!(config.live.model, DEFAULT_LIVE_MODEL);
        assert_eq!(config.live.voice, "Puck");
        assert!(config.live.system_prompt.starts_with("You are Sparky"));
        assert_eq!(config.live.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.live.frame_size, 4096);
        assert_eq!(config.speech.tts_voice, "Zephyr");
        assert_eq!(config.speech.tts_model, DEFAULT_TTS_MODEL);
        assert_eq!(config.speech.language, Language::English);
        assert!(config.api_key.is_none());
        assert!(config.genai_client().is_err());
    }

    #[test]
    fn env_overrides_file() {
        let mut fc = SparkyConfigFile::default();
        fc.live.voice = Some("Kore".to_string());
        fc.live.connect_timeout_secs = Some(3);
        fc.speech.language = Some("French".to_string());
        fc.api_keys.gemini = Some("from-file".to_string());

        let config = resolve(
            fc,
            &[
                ("SPARKY_LIVE_VOICE", "Charon"),
                ("SPARKY_LANGUAGE", "hindi"),
                ("GEMINI_API_KEY", "from-env"),
            ],
        );
        assert_eq!(config.live.voice, "Charon");
        assert_eq!(config.live.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.speech.language, Language::Hindi);
        assert_eq!(config.api_key.unwrap().expose_secret(), "from-env");
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = resolve(
            SparkyConfigFile::default(),
            &[
                ("SPARKY_CONNECT_TIMEOUT", "soon"),
                ("SPARKY_FRAME_SIZE", "0"),
                ("SPARKY_LANGUAGE", "Klingon"),
                ("API_KEY", ""),
            ],
        );
        assert_eq!(config.live.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.live.frame_size, FRAME_SIZE);
        assert_eq!(config.speech.language, Language::English);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn persona_dir_overrides_embedded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("sparky.json"),
            r#"{"version":"2.0.0","identity":{"id":"sparky","name":"Sparky Jr"},
                "voice":{"tts":{"voice":"Aoede"}}}"#,
        )
        .unwrap();

        let config = resolve(
            SparkyConfigFile::default(),
            &[("SPARKY_PERSONA_DIR", dir.path().to_str().unwrap())],
        );
        assert_eq!(config.persona.name(), "Sparky Jr");
        assert_eq!(config.speech.tts_voice, "Aoede");
        assert_eq!(config.live.voice, DEFAULT_LIVE_VOICE);
        assert!(config.live.system_prompt.is_empty());
    }

    #[test]
    fn unknown_persona_fails() {
        let err = Config::resolve(SparkyConfigFile::default(), Some("nobody"), |_| None)
            .unwrap_err();
        assert!(matches!(err, Error::PersonaNotFound(_)));
    }

    #[test]
    fn session_options_follow_live_config() {
        let config = resolve(SparkyConfigFile::default(), &[("SPARKY_FRAME_SIZE", "1024")]);
        let options = config.session_options();
        assert_eq!(options.frame_size, 1024);
        assert_eq!(options.model, config.live.model);
        assert_eq!(options.input_rate, 16000);
        assert_eq!(options.output_rate, 24000);
    }
}
