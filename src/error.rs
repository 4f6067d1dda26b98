//! Error types for the Sparky voice core

use thiserror::Error;

/// Result type alias for Sparky operations
pub type Result<T> = std::result::Result<T, Error>;

/// Friendly message shown when a session cannot be started
pub const START_FAILED_MESSAGE: &str = "Check your microphone and try again!";

/// Friendly message shown when a running session fails
pub const SESSION_FAILED_MESSAGE: &str = "Sparky got a bit shy! Try again?";

/// Friendly message shown when asked to start while already talking
pub const ALREADY_ACTIVE_MESSAGE: &str = "Sparky is already listening!";

/// Errors that can occur in the voice core
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persona not found
    #[error("persona not found: {0}")]
    PersonaNotFound(String),

    /// Microphone access refused or no capture device
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Remote duplex channel could not be established
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Mid-session send/receive failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed inbound audio payload
    #[error("decode error: {0}")]
    Decode(String),

    /// A session is already connecting or active
    #[error("a live session is already active")]
    AlreadyActive,

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Translation error
    #[error("translation error: {0}")]
    Translation(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success API response
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Short, non-technical text for the front end
    ///
    /// Raw error detail is logged, never shown.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) | Self::ConnectFailed(_) => START_FAILED_MESSAGE,
            Self::AlreadyActive => ALREADY_ACTIVE_MESSAGE,
            _ => SESSION_FAILED_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_failures_ask_to_check_microphone() {
        assert_eq!(
            Error::PermissionDenied("refused".into()).user_message(),
            START_FAILED_MESSAGE
        );
        assert_eq!(
            Error::ConnectFailed("timeout".into()).user_message(),
            START_FAILED_MESSAGE
        );
    }

    #[test]
    fn double_start_is_not_blamed_on_microphone() {
        assert_eq!(Error::AlreadyActive.user_message(), ALREADY_ACTIVE_MESSAGE);
    }

    #[test]
    fn session_failures_use_shy_message() {
        assert_eq!(
            Error::Transport("reset".into()).user_message(),
            SESSION_FAILED_MESSAGE
        );
    }
}
