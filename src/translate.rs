//! Display languages and text translation

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::genai::{Content, GenAiClient, GenerateContentRequest};
use crate::{Error, Result};

/// Default translation model
pub const DEFAULT_TRANSLATE_MODEL: &str = "gemini-3-flash-preview";

/// Languages the learning content can be shown and spoken in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    Spanish,
    French,
    Hindi,
    Japanese,
    Chinese,
    German,
    Arabic,
}

impl Language {
    /// Every supported language
    pub const ALL: [Self; 8] = [
        Self::English,
        Self::Spanish,
        Self::French,
        Self::Hindi,
        Self::Japanese,
        Self::Chinese,
        Self::German,
        Self::Arabic,
    ];

    /// English name used in prompts
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Spanish",
            Self::French => "French",
            Self::Hindi => "Hindi",
            Self::Japanese => "Japanese",
            Self::Chinese => "Chinese",
            Self::German => "German",
            Self::Arabic => "Arabic",
        }
    }

    /// Name of the language in itself
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Spanish => "Español",
            Self::French => "Français",
            Self::Hindi => "हिन्दी",
            Self::Japanese => "日本語",
            Self::Chinese => "中文",
            Self::German => "Deutsch",
            Self::Arabic => "العربية",
        }
    }

    /// Source content is authored in English
    #[must_use]
    pub const fn needs_translation(self) -> bool {
        !matches!(self, Self::English)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|l| l.name().eq_ignore_ascii_case(wanted) || l.label() == wanted)
            .ok_or_else(|| Error::Config(format!("unsupported language: {wanted}")))
    }
}

/// Translates text into a display language
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` into `target`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails
    async fn translate(&self, text: &str, target: Language) -> Result<String>;
}

/// Translates through a Gemini text model
#[derive(Debug, Clone)]
pub struct GeminiTranslator {
    client: GenAiClient,
    model: String,
}

impl GeminiTranslator {
    /// Create a translator
    #[must_use]
    pub const fn new(client: GenAiClient, model: String) -> Self {
        Self { client, model }
    }
}

/// Prompt asking for a child-friendly translation
#[must_use]
pub fn translation_prompt(text: &str, target: Language) -> String {
    format!(
        "Translate the following text for a child into {target}. \
         Keep the tone friendly and simple: \"{text}\""
    )
}

#[async_trait]
impl Translator for GeminiTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String> {
        if !target.needs_translation() {
            return Ok(text.to_string());
        }

        let request = GenerateContentRequest {
            contents: vec![Content::text(translation_prompt(text, target))],
            generation_config: None,
        };
        let response = self.client.generate_content(&self.model, &request).await?;

        response
            .text()
            .ok_or_else(|| Error::Translation("empty translation response".to_string()))
    }
}
