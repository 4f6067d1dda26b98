//! Persona configuration
//!
//! A persona is the buddy's identity: who it is, how it behaves in a live
//! conversation, and how it reads static content aloud. Files follow the
//! persona.json layout (`identity`, `voice`, `personality`).

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Identifier of the built-in persona
pub const DEFAULT_PERSONA_ID: &str = "sparky";

/// Live voice used when a persona names none
pub const DEFAULT_LIVE_VOICE: &str = "Puck";

/// One-shot speech voice used when a persona names none
pub const DEFAULT_TTS_VOICE: &str = "Zephyr";

/// Personas compiled into the binary
const EMBEDDED_PERSONAS: &[(&str, &str)] = &[("sparky", include_str!("../personas/sparky.json"))];

/// Identity and behavior of the buddy
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    /// Schema URL (optional, for validation)
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Semantic version of this persona file
    pub version: String,

    /// Core identity (required)
    pub identity: Identity,

    /// Voices for live talk and one-shot speech
    #[serde(default)]
    pub voice: Option<Voice>,

    /// Behavior and communication style
    #[serde(default)]
    pub personality: Option<Personality>,
}

/// Core identity of the entity
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub name: String,
    pub tagline: Option<String>,
    pub icon: Option<String>,
    #[serde(rename = "type")]
    pub entity_type: Option<EntityType>,
    pub description: Option<String>,
}

/// Entity type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Assistant,
    Bot,
    Character,
    Mascot,
}

/// Voice configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    /// Live conversation voice
    pub live: Option<LiveVoice>,

    /// One-shot reading voice
    pub tts: Option<TtsVoice>,
}

/// Live conversation voice
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveVoice {
    /// Prebuilt voice name
    pub voice: Option<String>,

    /// Live model override
    pub model: Option<String>,
}

/// One-shot reading voice
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsVoice {
    /// Prebuilt voice name
    pub voice: Option<String>,

    /// Reading style prefixed to every utterance
    pub instruction: Option<String>,
}

/// Behavior and communication style
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Personality {
    /// System instruction for live conversations
    pub system_prompt: Option<String>,

    /// Default communication tone
    pub tone: Option<String>,

    #[serde(default)]
    pub traits: Vec<String>,
}

impl Persona {
    /// Load a persona compiled into the binary
    ///
    /// # Errors
    ///
    /// Returns error if no embedded persona has this ID
    pub fn embedded(persona_id: &str) -> Result<Self> {
        let (_, json) = EMBEDDED_PERSONAS
            .iter()
            .find(|(id, _)| *id == persona_id)
            .ok_or_else(|| Error::PersonaNotFound(persona_id.to_string()))?;

        serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("embedded persona {persona_id} is invalid: {e}")))
    }

    /// IDs of the embedded personas
    pub fn embedded_ids() -> impl Iterator<Item = &'static str> {
        EMBEDDED_PERSONAS.iter().map(|(id, _)| *id)
    }

    /// Load `<persona_id>.json` from a directory
    ///
    /// # Errors
    ///
    /// Returns error if the file is missing or malformed
    pub fn from_dir(dir: &std::path::Path, persona_id: &str) -> Result<Self> {
        let path = dir.join(format!("{persona_id}.json"));
        if !path.exists() {
            return Err(Error::PersonaNotFound(persona_id.to_string()));
        }

        let content = std::fs::read_to_string(&path)?;
        let persona: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {persona_id}.json: {e}")))?;
        tracing::debug!(path = %path.display(), "loaded persona from JSON");
        Ok(persona)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.identity.name
    }

    /// System instruction for live conversations
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.personality.as_ref()?.system_prompt.as_deref()
    }

    /// Prebuilt voice for live conversations
    #[must_use]
    pub fn live_voice(&self) -> Option<&str> {
        self.voice.as_ref()?.live.as_ref()?.voice.as_deref()
    }

    /// Live model override
    #[must_use]
    pub fn live_model(&self) -> Option<&str> {
        self.voice.as_ref()?.live.as_ref()?.model.as_deref()
    }

    /// Prebuilt voice for one-shot speech
    #[must_use]
    pub fn tts_voice(&self) -> Option<&str> {
        self.voice.as_ref()?.tts.as_ref()?.voice.as_deref()
    }

    /// Reading style for one-shot speech
    #[must_use]
    pub fn tts_instruction(&self) -> Option<&str> {
        self.voice.as_ref()?.tts.as_ref()?.instruction.as_deref()
    }
}
