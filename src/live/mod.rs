//! Realtime duplex conversation with the streaming speech model

mod protocol;
mod session;
mod transport;

pub use protocol::{ClientMessage, GoAway, LiveSetup, ServerContent, ServerMessage, Transcription};
pub use session::{
    DEFAULT_CONNECT_TIMEOUT, SessionEvent, SessionManager, SessionOptions, SessionState,
    StopHandle, Transcript, caption_tail,
};
pub use transport::{
    DEFAULT_LIVE_ENDPOINT, DEFAULT_LIVE_MODEL, LiveConnection, LiveTransport, TransportEvent,
    WebSocketTransport,
};
