//! One-shot speech for static content
//!
//! Translate, synthesize, decode and play one utterance. Calls are
//! single-flight: a second `speak` while one is running returns
//! [`SpeakOutcome::Busy`] without touching the network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use super::device::AudioDevices;
use super::playback::{PLAYBACK_SAMPLE_RATE, play_to_end};
use super::tts::Synthesizer;
use crate::translate::{Language, Translator};
use crate::{Error, Result};

/// How a `speak` call ended
#[derive(Debug)]
pub enum SpeakOutcome {
    /// Another utterance was already in progress; nothing was done
    Busy,
    /// The utterance played to the end
    Spoken,
    /// The service returned no audio; completed without sound
    Silent,
    /// The utterance failed; the player is ready again
    Failed(Error),
}

impl SpeakOutcome {
    /// Whether this call actually ran (anything but `Busy`)
    #[must_use]
    pub const fn completed(&self) -> bool {
        !matches!(self, Self::Busy)
    }
}

/// Clears the busy flag however the utterance ends
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight player for one utterance at a time
pub struct SpeechPlayer<D> {
    devices: Mutex<D>,
    translator: Arc<dyn Translator>,
    synthesizer: Arc<dyn Synthesizer>,
    language: Language,
    voice: String,
    busy: Arc<AtomicBool>,
}

impl<D: AudioDevices> SpeechPlayer<D> {
    /// Create a player speaking with `voice`
    pub fn new(
        devices: D,
        translator: Arc<dyn Translator>,
        synthesizer: Arc<dyn Synthesizer>,
        voice: impl Into<String>,
    ) -> Self {
        Self {
            devices: Mutex::new(devices),
            translator,
            synthesizer,
            language: Language::default(),
            voice: voice.into(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the display language utterances are translated into
    #[must_use]
    pub const fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Change the display language
    pub const fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    /// Current display language
    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    /// Whether an utterance is in progress
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Speak `text` once
    ///
    /// Never returns an error: failures are reported as
    /// [`SpeakOutcome::Failed`] after the busy flag is released.
    pub async fn speak(&self, text: &str) -> SpeakOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("speech already in progress, ignoring");
            return SpeakOutcome::Busy;
        }
        let _guard = BusyGuard(Arc::clone(&self.busy));

        match self.run(text).await {
            Ok(true) => SpeakOutcome::Spoken,
            Ok(false) => SpeakOutcome::Silent,
            Err(e) => {
                tracing::warn!(error = %e, "speech failed");
                SpeakOutcome::Failed(e)
            }
        }
    }

    async fn run(&self, text: &str) -> Result<bool> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        let spoken = self.localize(text).await;

        let Some(blob) = self.synthesizer.synthesize(&spoken, &self.voice).await? else {
            tracing::info!("synthesis returned no audio");
            return Ok(false);
        };

        let buffer = blob.decode(PLAYBACK_SAMPLE_RATE)?;
        if buffer.is_empty() {
            tracing::info!("synthesized audio is empty");
            return Ok(false);
        }

        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();
        let mut output = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open_output(buffer.sample_rate, ended_tx)?;

        let played = play_to_end(output.as_mut(), &mut ended_rx, buffer).await;
        output.close();
        played?;

        Ok(true)
    }

    /// Translate into the display language, keeping the source on failure
    async fn localize(&self, text: &str) -> String {
        if !self.language.needs_translation() {
            return text.to_string();
        }

        match self.translator.translate(text, self.language).await {
            Ok(translated) if !translated.trim().is_empty() => translated,
            Ok(_) => text.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, language = %self.language, "translation failed, using source text");
                text.to_string()
            }
        }
    }
}
