//! Text-to-speech (TTS) processing

use async_trait::async_trait;

use super::pcm::WireBlob;
use crate::Result;
use crate::genai::{
    Content, GenAiClient, GenerateContentRequest, GenerationConfig, Modality, SpeechConfig,
};

/// Default one-shot speech model
pub const DEFAULT_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";

/// Produces a synthesized audio payload for a piece of text
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` with `voice`
    ///
    /// Returns `None` when the service produced no audio.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Option<WireBlob>>;
}

/// Synthesizes speech through the Gemini TTS model
#[derive(Debug, Clone)]
pub struct TextToSpeech {
    client: GenAiClient,
    model: String,
    instruction: String,
}

impl TextToSpeech {
    /// Create a TTS instance
    ///
    /// `instruction` is prefixed to every utterance to set the reading style.
    #[must_use]
    pub fn new(client: GenAiClient, model: String, instruction: String) -> Self {
        Self {
            client,
            model,
            instruction,
        }
    }

    /// Build the request for one utterance
    #[must_use]
    pub fn request(&self, text: &str, voice: &str) -> GenerateContentRequest {
        let prompt = if self.instruction.is_empty() {
            text.to_string()
        } else {
            format!("{} {text}", self.instruction.trim_end())
        };

        GenerateContentRequest {
            contents: vec![Content::text(prompt)],
            generation_config: Some(GenerationConfig {
                response_modalities: vec![Modality::Audio],
                speech_config: Some(SpeechConfig::prebuilt(voice)),
            }),
        }
    }
}

#[async_trait]
impl Synthesizer for TextToSpeech {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Option<WireBlob>> {
        let request = self.request(text, voice);
        let response = self.client.generate_content(&self.model, &request).await?;

        let audio = response
            .first_content()
            .and_then(Content::first_inline_data)
            .filter(|blob| !blob.data.is_empty())
            .cloned();

        tracing::debug!(
            model = %self.model,
            voice,
            chars = text.len(),
            audio = audio.is_some(),
            "speech synthesized"
        );

        Ok(audio)
    }
}
