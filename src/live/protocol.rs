//! Live API wire messages
//!
//! Client messages are externally tagged (`{"setup":{..}}`,
//! `{"realtimeInput":{..}}`). Server messages carry at most one of
//! `setupComplete`, `serverContent` or `goAway`; unknown fields such as
//! usage metadata are ignored.

use serde::{Deserialize, Serialize};

use crate::genai::{Content, GenerationConfig, Modality, SpeechConfig};
use crate::voice::WireBlob;

/// Parameters of one live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSetup {
    /// Model name, with or without the `models/` prefix
    pub model: String,
    /// Prebuilt voice the model answers with
    pub voice: String,
    /// Behavioral system instruction
    pub system_instruction: String,
    /// Ask the server to transcribe its own audio
    pub output_transcription: bool,
}

/// Messages sent to the server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
}

/// First message of every connection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

/// Empty marker object enabling transcription
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct AudioTranscriptionConfig {}

/// Streamed microphone input
#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInput {
    pub audio: WireBlob,
}

impl ClientMessage {
    /// Build the setup message for a session
    #[must_use]
    pub fn setup(setup: &LiveSetup) -> Self {
        let model = if setup.model.starts_with("models/") {
            setup.model.clone()
        } else {
            format!("models/{}", setup.model)
        };

        let system_instruction = (!setup.system_instruction.is_empty())
            .then(|| Content::text(setup.system_instruction.clone()));

        Self::Setup(Setup {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![Modality::Audio],
                speech_config: Some(SpeechConfig::prebuilt(setup.voice.clone())),
            },
            system_instruction,
            output_audio_transcription: setup
                .output_transcription
                .then_some(AudioTranscriptionConfig {}),
        })
    }

    /// Wrap one encoded microphone frame
    #[must_use]
    pub const fn audio(blob: WireBlob) -> Self {
        Self::RealtimeInput(RealtimeInput { audio: blob })
    }
}

/// Messages received from the server
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

/// Model output for the current turn
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
}

/// A transcription fragment
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

/// Server notice that the connection will end soon
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerMessage {
    /// Setup acknowledgment
    #[must_use]
    pub fn setup_complete() -> Self {
        Self {
            setup_complete: Some(serde_json::Value::Object(serde_json::Map::new())),
            ..Self::default()
        }
    }

    /// A model turn carrying one audio chunk
    #[must_use]
    pub fn audio(blob: WireBlob) -> Self {
        Self::content(ServerContent {
            model_turn: Some(Content {
                role: Some("model".to_string()),
                parts: vec![crate::genai::Part {
                    text: None,
                    inline_data: Some(blob),
                }],
            }),
            ..ServerContent::default()
        })
    }

    /// An output transcription fragment
    #[must_use]
    pub fn transcript(text: impl Into<String>) -> Self {
        Self::content(ServerContent {
            output_transcription: Some(Transcription {
                text: Some(text.into()),
            }),
            ..ServerContent::default()
        })
    }

    /// A barge-in notification
    #[must_use]
    pub fn interrupted() -> Self {
        Self::content(ServerContent {
            interrupted: true,
            ..ServerContent::default()
        })
    }

    const fn content(content: ServerContent) -> Self {
        Self {
            setup_complete: None,
            server_content: Some(content),
            go_away: None,
        }
    }

    /// Whether this acknowledges the setup message
    #[must_use]
    pub const fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Inline audio payloads of the model turn, in order
    pub fn audio_chunks(&self) -> impl Iterator<Item = &WireBlob> {
        self.server_content
            .iter()
            .filter_map(|c| c.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|p| p.inline_data.as_ref())
    }

    /// Output transcription fragment, if any
    #[must_use]
    pub fn transcript_fragment(&self) -> Option<&str> {
        self.server_content
            .as_ref()
            .and_then(|c| c.output_transcription.as_ref())
            .and_then(|t| t.text.as_deref())
    }

    /// Whether the model was interrupted by the user
    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.interrupted)
    }

    /// Whether the model finished its turn
    #[must_use]
    pub fn is_turn_complete(&self) -> bool {
        self.server_content.as_ref().is_some_and(|c| c.turn_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> LiveSetup {
        LiveSetup {
            model: "gemini-live".to_string(),
            voice: "Puck".to_string(),
            system_instruction: "Be kind".to_string(),
            output_transcription: true,
        }
    }

    #[test]
    fn setup_message_shape() {
        let json = serde_json::to_value(ClientMessage::setup(&setup())).unwrap();
        let s = &json["setup"];
        assert_eq!(s["model"], "models/gemini-live");
        assert_eq!(s["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            s["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert_eq!(s["systemInstruction"]["parts"][0]["text"], "Be kind");
        assert!(s["outputAudioTranscription"].is_object());
    }

    #[test]
    fn setup_keeps_existing_model_prefix_and_skips_transcription() {
        let mut live = setup();
        live.model = "models/x".to_string();
        live.output_transcription = false;
        let json = serde_json::to_value(ClientMessage::setup(&live)).unwrap();
        assert_eq!(json["setup"]["model"], "models/x");
        assert!(json["setup"].get("outputAudioTranscription").is_none());
    }

    #[test]
    fn realtime_input_shape() {
        let blob = WireBlob::encode(&[0.0, 0.5], 16000);
        let json = serde_json::to_value(ClientMessage::audio(blob)).unwrap();
        assert_eq!(
            json["realtimeInput"]["audio"]["mimeType"],
            "audio/pcm;rate=16000"
        );
        assert!(json["realtimeInput"]["audio"]["data"].is_string());
    }

    #[test]
    fn parses_server_content() {
        let json = r#"{"serverContent":{
            "modelTurn":{"parts":[{"inlineData":{"mimeType":"audio/pcm;rate=24000","data":"AAA="}}]},
            "outputTranscription":{"text":"Hi"},
            "interrupted":true
        }}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.audio_chunks().count(), 1);
        assert_eq!(msg.transcript_fragment(), Some("Hi"));
        assert!(msg.is_interrupted());
        assert!(!msg.is_turn_complete());
        assert!(!msg.is_setup_complete());
    }

    #[test]
    fn parses_control_messages() {
        let ack: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(ack.is_setup_complete());

        let bye: ServerMessage =
            serde_json::from_str(r#"{"goAway":{"timeLeft":"5s"},"usageMetadata":{}}"#).unwrap();
        assert_eq!(bye.go_away.unwrap().time_left.as_deref(), Some("5s"));
    }
}
