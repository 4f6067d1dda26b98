//! Duplex session manager
//!
//! Owns the one live conversation: microphone, output timeline, playback
//! scheduler and transport connection. A single task drives it by calling
//! [`SessionManager::run`], which `select!`s over stop requests, transport
//! events, playback completions and capture frames.
//!
//! ```text
//!  Idle ──start──▶ Connecting ──setupComplete──▶ Active
//!   ▲                  │                           │
//!   └──── stop / error / timeout / remote close ───┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::protocol::{LiveSetup, ServerMessage};
use super::transport::{DEFAULT_LIVE_MODEL, LiveConnection, LiveTransport, TransportEvent};
use crate::voice::{
    AudioDevices, AudioFrame, FRAME_SIZE, InputContext, PLAYBACK_SAMPLE_RATE, PlaybackHandle,
    PlaybackScheduler, SAMPLE_RATE,
};
use crate::{Error, Result};

/// Default wait for the setup acknowledgment
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Capture frames buffered between the audio thread and the session loop
const FRAME_QUEUE: usize = 8;

/// Connection state of the manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
}

/// Events for the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The manager moved to a new state
    StateChanged(SessionState),
    /// Full transcript after a new fragment arrived
    Transcript(String),
    /// The agent started (`true`) or finished (`false`) speaking
    AgentSpeaking(bool),
    /// Microphone frames are (or are no longer) being streamed
    Listening(bool),
    /// A failure, as text fit for a child's screen
    Error { message: String },
    /// The session was torn down
    Closed,
}

/// Accumulated output transcription
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    text: String,
}

impl Transcript {
    /// Append a fragment, separated by a single space
    ///
    /// Returns `false` for blank fragments, which are ignored.
    pub fn push(&mut self, fragment: &str) -> bool {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return false;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(fragment);
        true
    }

    /// Full text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Last `max_chars` characters, for a one-line caption
    #[must_use]
    pub fn tail(&self, max_chars: usize) -> &str {
        caption_tail(&self.text, max_chars)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

/// Last `max_chars` characters of `text`, split on a char boundary
#[must_use]
pub fn caption_tail(text: &str, max_chars: usize) -> &str {
    if max_chars == 0 {
        return "";
    }
    let start = text
        .char_indices()
        .rev()
        .nth(max_chars - 1)
        .map_or(0, |(i, _)| i);
    &text[start..]
}

/// Cloneable request to stop the current session
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<watch::Sender<u64>>);

impl StopHandle {
    /// Stop whatever session is connecting or active; a no-op when idle
    pub fn stop(&self) {
        self.0.send_modify(|generation| *generation = generation.wrapping_add(1));
    }
}

/// Tunables of a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub model: String,
    pub frame_size: usize,
    pub connect_timeout: Duration,
    pub input_rate: u32,
    pub output_rate: u32,
    pub output_transcription: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_LIVE_MODEL.to_string(),
            frame_size: FRAME_SIZE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            input_rate: SAMPLE_RATE,
            output_rate: PLAYBACK_SAMPLE_RATE,
            output_transcription: true,
        }
    }
}

/// Resources of one conversation
struct Session {
    id: Uuid,
    input: Box<dyn InputContext>,
    scheduler: PlaybackScheduler,
    frames: mpsc::Receiver<AudioFrame>,
    ended: mpsc::UnboundedReceiver<PlaybackHandle>,
    connection: Option<LiveConnection>,
}

impl Session {
    fn release(mut self) {
        self.input.close();
        self.scheduler.close();
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.frames.close();
    }
}

/// What woke the session loop
enum Wake {
    Stop,
    Transport(Option<TransportEvent>),
    Ended(Option<PlaybackHandle>),
    Frame(Option<AudioFrame>),
}

fn emit(events: &mpsc::UnboundedSender<SessionEvent>, event: SessionEvent) {
    // The front end may have gone away; the session still tears down cleanly.
    let _ = events.send(event);
}

/// Lifecycle of at most one live conversation
pub struct SessionManager<D, T> {
    devices: D,
    transport: T,
    options: SessionOptions,
    state: SessionState,
    session: Option<Session>,
    transcript: Transcript,
    events: mpsc::UnboundedSender<SessionEvent>,
    stop: StopHandle,
    stop_rx: watch::Receiver<u64>,
}

impl<D: AudioDevices, T: LiveTransport> SessionManager<D, T> {
    /// Create an idle manager and the receiver for its events
    pub fn new(
        devices: D,
        transport: T,
        options: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(0);

        let manager = Self {
            devices,
            transport,
            options,
            state: SessionState::Idle,
            session: None,
            transcript: Transcript::default(),
            events,
            stop: StopHandle(Arc::new(stop_tx)),
            stop_rx,
        };
        (manager, events_rx)
    }

    /// Handle for stopping from another task
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub const fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Identity of the current session, if any
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Playback scheduler of the current session
    #[must_use]
    pub fn scheduler(&self) -> Option<&PlaybackScheduler> {
        self.session.as_ref().map(|s| &s.scheduler)
    }

    /// Start a conversation
    ///
    /// Resolves once the service has acknowledged the setup and microphone
    /// frames are flowing, or once a concurrent stop request cancels the
    /// attempt (the manager is then `Idle` again).
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyActive`] unless the manager is `Idle`
    /// - [`Error::PermissionDenied`] if the microphone cannot be opened
    /// - [`Error::ConnectFailed`] if the service does not acknowledge in time
    pub async fn start(&mut self, system_prompt: &str, voice: &str) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::AlreadyActive);
        }

        // Stop requests from before this start do not apply to it.
        self.stop_rx.borrow_and_update();
        self.transcript.clear();

        let id = Uuid::new_v4();
        tracing::info!(session = %id, model = %self.options.model, voice, "starting live session");
        self.set_state(SessionState::Connecting);

        if let Err(e) = self.open_devices(id) {
            self.fail(&e);
            return Err(e);
        }

        let setup = LiveSetup {
            model: self.options.model.clone(),
            voice: voice.to_string(),
            system_instruction: system_prompt.to_string(),
            output_transcription: self.options.output_transcription,
        };

        let connection = match self.connect(&setup).await {
            Ok(Some(connection)) => connection,
            Ok(None) => {
                tracing::info!(session = %id, "start cancelled");
                self.teardown();
                return Ok(());
            }
            Err(e) => {
                self.fail(&e);
                return Err(e);
            }
        };

        let resumed = match self.session.as_mut() {
            Some(session) => {
                session.connection = Some(connection);
                let stale = std::iter::from_fn(|| session.frames.try_recv().ok()).count();
                if stale > 0 {
                    tracing::debug!(session = %id, stale, "discarding frames captured while connecting");
                }
                session.input.resume()
            }
            None => Err(Error::Audio("session released during connect".to_string())),
        };
        if let Err(e) = resumed {
            self.fail(&e);
            return Err(e);
        }

        self.set_state(SessionState::Active);
        emit(&self.events, SessionEvent::Listening(true));
        tracing::info!(session = %id, "live session active");

        Ok(())
    }

    /// Tear down the current session; idempotent
    pub fn stop(&mut self) {
        self.teardown();
    }

    /// Drive the session until it ends
    pub async fn run(&mut self) {
        while self.step().await {}
    }

    /// Process one wake-up of the session loop
    ///
    /// Returns `false` once there is no active session left to drive.
    pub async fn step(&mut self) -> bool {
        let (id, wake) = {
            let Some(session) = self.session.as_mut() else {
                return false;
            };
            let Some(connection) = session.connection.as_mut() else {
                return false;
            };

            let wake = tokio::select! {
                biased;
                _ = self.stop_rx.changed() => Wake::Stop,
                event = connection.events.recv() => Wake::Transport(event),
                handle = session.ended.recv() => Wake::Ended(handle),
                frame = session.frames.recv() => Wake::Frame(frame),
            };
            (session.id, wake)
        };

        match wake {
            Wake::Stop => {
                tracing::info!(session = %id, "stop requested");
                self.teardown();
                false
            }
            Wake::Transport(Some(event)) => self.handle_event(id, event),
            Wake::Transport(None) => self.handle_event(id, TransportEvent::Closed),
            Wake::Ended(Some(handle)) => {
                if let Some(session) = self.session.as_mut()
                    && session.scheduler.on_ended(handle)
                {
                    tracing::debug!(session = %id, "agent finished speaking");
                    emit(&self.events, SessionEvent::AgentSpeaking(false));
                }
                true
            }
            Wake::Ended(None) => {
                self.fail(&Error::Audio("output device went away".to_string()));
                false
            }
            Wake::Frame(Some(frame)) => self.forward_frame(&frame),
            Wake::Frame(None) => {
                self.fail(&Error::Audio("microphone disconnected".to_string()));
                false
            }
        }
    }

    /// Apply one transport event to session `session_id`
    ///
    /// Events for any other session are dropped. Returns whether the session
    /// is still running.
    pub fn handle_event(&mut self, session_id: Uuid, event: TransportEvent) -> bool {
        if self.session_id() != Some(session_id) {
            tracing::debug!(session = %session_id, "dropping event for stale session");
            return self.session.is_some();
        }

        match event {
            TransportEvent::Open => true,
            TransportEvent::Message(msg) => self.handle_message(&msg),
            TransportEvent::Error(e) => {
                self.fail(&Error::Transport(e));
                false
            }
            TransportEvent::Closed => {
                tracing::info!(session = %session_id, "live service closed the session");
                self.teardown();
                false
            }
        }
    }

    fn handle_message(&mut self, msg: &ServerMessage) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        if msg.is_interrupted() {
            let stopped = session.scheduler.interrupt();
            tracing::info!(session = %session.id, stopped, "agent interrupted");
            if stopped > 0 {
                emit(&self.events, SessionEvent::AgentSpeaking(false));
            }
        }

        for blob in msg.audio_chunks() {
            let was_speaking = session.scheduler.is_speaking();
            match session.scheduler.enqueue_blob(blob) {
                Ok(Some(_)) if !was_speaking => {
                    emit(&self.events, SessionEvent::AgentSpeaking(true));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(session = %session.id, error = %e, "skipping audio chunk");
                }
            }
        }

        if let Some(fragment) = msg.transcript_fragment()
            && self.transcript.push(fragment)
        {
            emit(
                &self.events,
                SessionEvent::Transcript(self.transcript.as_str().to_string()),
            );
        }

        if msg.is_turn_complete() {
            tracing::debug!(session = %session.id, "turn complete");
        }

        if let Some(go_away) = &msg.go_away {
            tracing::warn!(
                session = %session.id,
                time_left = go_away.time_left.as_deref().unwrap_or("unknown"),
                "live service is going away"
            );
            self.teardown();
            return false;
        }

        true
    }

    fn forward_frame(&mut self, frame: &AudioFrame) -> bool {
        let Some(connection) = self.session.as_ref().and_then(|s| s.connection.as_ref()) else {
            return false;
        };

        match connection.outbound.try_send(frame.encode()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("outbound queue full, dropping microphone frame");
                true
            }
            Err(TrySendError::Closed(_)) => {
                self.fail(&Error::Transport("outbound channel closed".to_string()));
                false
            }
        }
    }

    fn open_devices(&mut self, id: Uuid) -> Result<()> {
        let (frames_tx, frames) = mpsc::channel(FRAME_QUEUE);
        let mut input = self
            .devices
            .open_input(self.options.input_rate, self.options.frame_size, frames_tx)
            .map_err(|e| match e {
                Error::PermissionDenied(_) => e,
                other => Error::PermissionDenied(other.to_string()),
            })?;

        let (ended_tx, ended) = mpsc::unbounded_channel();
        let output = match self.devices.open_output(self.options.output_rate, ended_tx) {
            Ok(output) => output,
            Err(e) => {
                input.close();
                return Err(e);
            }
        };

        self.session = Some(Session {
            id,
            input,
            scheduler: PlaybackScheduler::new(output),
            frames,
            ended,
            connection: None,
        });
        Ok(())
    }

    /// Connect and wait for the setup acknowledgment
    ///
    /// `Ok(None)` means a stop request arrived first.
    async fn connect(&mut self, setup: &LiveSetup) -> Result<Option<LiveConnection>> {
        let timeout = self.options.connect_timeout;

        tokio::select! {
            biased;
            _ = self.stop_rx.changed() => Ok(None),
            result = tokio::time::timeout(timeout, await_open(&self.transport, setup)) => match result {
                Ok(connection) => connection.map(Some),
                Err(_) => Err(Error::ConnectFailed(format!(
                    "no setup acknowledgment within {}s",
                    timeout.as_secs_f64()
                ))),
            },
        }
    }

    fn fail(&mut self, error: &Error) {
        tracing::error!(session = ?self.session_id(), error = %error, "live session failed");
        emit(
            &self.events,
            SessionEvent::Error {
                message: error.user_message().to_string(),
            },
        );
        self.teardown();
    }

    fn teardown(&mut self) {
        let Some(session) = self.session.take() else {
            self.set_state(SessionState::Idle);
            return;
        };

        let id = session.id;
        let speaking = session.scheduler.is_speaking();
        let listening = self.state == SessionState::Active;
        session.release();

        if speaking {
            emit(&self.events, SessionEvent::AgentSpeaking(false));
        }
        if listening {
            emit(&self.events, SessionEvent::Listening(false));
        }
        self.set_state(SessionState::Idle);
        emit(&self.events, SessionEvent::Closed);

        tracing::info!(session = %id, "live session closed");
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            self.state = state;
            emit(&self.events, SessionEvent::StateChanged(state));
        }
    }
}

async fn await_open<T: LiveTransport>(transport: &T, setup: &LiveSetup) -> Result<LiveConnection> {
    let mut connection = transport.connect(setup).await.map_err(|e| match e {
        Error::ConnectFailed(_) => e,
        other => Error::ConnectFailed(other.to_string()),
    })?;

    loop {
        match connection.events.recv().await {
            Some(TransportEvent::Open) => return Ok(connection),
            Some(TransportEvent::Message(_)) => {
                tracing::debug!("ignoring message before setup acknowledgment");
            }
            Some(TransportEvent::Error(e)) => return Err(Error::ConnectFailed(e)),
            Some(TransportEvent::Closed) | None => {
                return Err(Error::ConnectFailed(
                    "closed before setup completed".to_string(),
                ));
            }
        }
    }
}
