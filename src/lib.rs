//! Sparky Voice - realtime voice core for a children's learning buddy
//!
//! This library provides:
//! - Live, full-duplex conversation with a streaming speech model
//! - Gapless playback of streamed model audio with barge-in
//! - One-shot, translated speech for static content
//! - Persona and configuration management
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  AudioFrame   ┌──────────────────┐  WireBlob   ┌──────────────┐
//! │  Microphone  │──────────────▶│  SessionManager  │────────────▶│ LiveTransport│
//! │ (capture.rs) │               │   (session.rs)   │◀────────────│  (websocket) │
//! └──────────────┘               └────────┬─────────┘ Transport-  └──────────────┘
//!                                         │           Event
//!                                         ▼
//!                                ┌──────────────────┐  schedule   ┌──────────────┐
//!                                │ PlaybackScheduler│────────────▶│   Speaker    │
//!                                │  (scheduler.rs)  │◀────────────│ (playback.rs)│
//!                                └──────────────────┘    ended    └──────────────┘
//!
//!   SpeechPlayer: Translator ─▶ Synthesizer ─▶ decode ─▶ Speaker   (independent)
//! ```

pub mod config;
pub mod error;
pub mod genai;
pub mod live;
pub mod persona;
pub mod translate;
pub mod voice;

pub use config::Config;
pub use error::{
    ALREADY_ACTIVE_MESSAGE, Error, Result, SESSION_FAILED_MESSAGE, START_FAILED_MESSAGE,
};
pub use live::{SessionEvent, SessionManager, SessionState, StopHandle};
pub use persona::Persona;
pub use translate::Language;
pub use voice::{SpeakOutcome, SpeechPlayer};
