//! Shared test utilities
//!
//! Fake audio devices with a hand-driven output clock, a scripted live
//! transport, and canned translation and synthesis services. Nothing here
//! touches audio hardware or the network.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use sparky_voice::live::{LiveConnection, LiveSetup, LiveTransport, SessionEvent, TransportEvent};
use sparky_voice::translate::{Language, Translator};
use sparky_voice::voice::{
    AudioBuffer, AudioDevices, AudioFrame, InputContext, OutputContext, Placement,
    PlaybackHandle, Synthesizer, WireBlob,
};
use sparky_voice::{Error, Result};
use tokio::sync::{Notify, mpsc, oneshot};

/// Output rate of the fake speaker
pub const OUTPUT_RATE: u32 = 24000;

/// System instruction used by session tests
pub const PROMPT: &str = "You are a test buddy.";

/// Encode `secs` seconds of a quiet tone as an inbound 24 kHz chunk
#[must_use]
pub fn chunk(secs: f64) -> WireBlob {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let len = (f64::from(OUTPUT_RATE) * secs).round() as usize;
    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..len).map(|i| (i as f32 * 0.05).sin() * 0.2).collect();
    WireBlob::encode(&samples, OUTPUT_RATE)
}

/// Collect every event emitted so far
pub fn drain(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Observable state behind [`FakeDevices`]
#[derive(Debug, Default)]
pub struct DeviceState {
    /// Output clock in seconds
    pub clock: f64,
    /// Every scheduled buffer as (handle, start, duration)
    pub scheduled: Vec<(PlaybackHandle, f64, f64)>,
    /// Handles stopped before their natural end
    pub stopped: Vec<PlaybackHandle>,
    /// Refuse to open the microphone
    pub deny_mic: bool,
    /// Report completion as soon as a buffer is scheduled
    pub auto_finish: bool,
    /// Seconds the clock advances while a buffer is being placed
    pub schedule_lag: f64,
    pub inputs_opened: usize,
    pub outputs_opened: usize,
    pub input_open: bool,
    pub output_open: bool,
    pub resumed: bool,
    pub input_rate: Option<u32>,
    pub frame_size: Option<usize>,
    pub output_rate: Option<u32>,
    frames: Option<mpsc::Sender<AudioFrame>>,
    ended: Option<mpsc::UnboundedSender<PlaybackHandle>>,
    next_handle: u64,
}

/// Audio devices whose clock and completions are driven by the test
#[derive(Debug, Clone, Default)]
pub struct FakeDevices(Arc<Mutex<DeviceState>>);

impl FakeDevices {
    /// Devices whose microphone is refused
    #[must_use]
    pub fn denying_mic() -> Self {
        let devices = Self::default();
        devices.state().deny_mic = true;
        devices
    }

    /// Devices whose speaker finishes every buffer instantly
    #[must_use]
    pub fn instant() -> Self {
        let devices = Self::default();
        devices.state().auto_finish = true;
        devices
    }

    pub fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_clock(&self, secs: f64) {
        self.state().clock = secs;
    }

    #[must_use]
    pub fn scheduled(&self) -> Vec<(PlaybackHandle, f64, f64)> {
        self.state().scheduled.clone()
    }

    #[must_use]
    pub fn stopped(&self) -> Vec<PlaybackHandle> {
        self.state().stopped.clone()
    }

    /// Report natural completion of `handle`
    pub fn finish(&self, handle: PlaybackHandle) {
        if let Some(ended) = &self.state().ended {
            let _ = ended.send(handle);
        }
    }

    /// Deliver one microphone frame
    pub fn push_frame(&self, samples: Vec<f32>) {
        let state = self.state();
        let rate = state.input_rate.unwrap_or(16000);
        if let Some(frames) = &state.frames {
            frames
                .try_send(AudioFrame::new(samples, rate))
                .expect("frame queue full");
        }
    }

    /// Simulate the microphone being unplugged
    pub fn disconnect_mic(&self) {
        self.state().frames = None;
    }

    #[must_use]
    pub fn any_open(&self) -> bool {
        let state = self.state();
        state.input_open || state.output_open
    }
}

impl AudioDevices for FakeDevices {
    fn open_input(
        &mut self,
        sample_rate: u32,
        frame_size: usize,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn InputContext>> {
        let mut state = self.state();
        if state.deny_mic {
            return Err(Error::PermissionDenied("denied by test".to_string()));
        }
        state.inputs_opened += 1;
        state.input_open = true;
        state.resumed = false;
        state.input_rate = Some(sample_rate);
        state.frame_size = Some(frame_size);
        state.frames = Some(frames);
        Ok(Box::new(FakeInput(Arc::clone(&self.0))))
    }

    fn open_output(
        &mut self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<PlaybackHandle>,
    ) -> Result<Box<dyn OutputContext>> {
        let mut state = self.state();
        state.outputs_opened += 1;
        state.output_open = true;
        state.output_rate = Some(sample_rate);
        state.ended = Some(ended);
        Ok(Box::new(FakeOutput(Arc::clone(&self.0))))
    }
}

struct FakeInput(Arc<Mutex<DeviceState>>);

impl FakeInput {
    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl InputContext for FakeInput {
    fn resume(&mut self) -> Result<()> {
        self.state().resumed = true;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = self.state();
        state.input_open = false;
        state.frames = None;
    }

    fn is_open(&self) -> bool {
        self.state().input_open
    }
}

struct FakeOutput(Arc<Mutex<DeviceState>>);

impl FakeOutput {
    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl OutputContext for FakeOutput {
    fn current_time(&self) -> f64 {
        self.state().clock
    }

    fn sample_rate(&self) -> u32 {
        OUTPUT_RATE
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<Placement> {
        let mut state = self.state();
        if !state.output_open {
            return Err(Error::Audio("output closed".to_string()));
        }
        state.clock += state.schedule_lag;
        let start = start_at.max(state.clock);
        state.next_handle += 1;
        let handle = PlaybackHandle(state.next_handle);
        state.scheduled.push((handle, start, buffer.duration()));
        if state.auto_finish
            && let Some(ended) = &state.ended
        {
            let _ = ended.send(handle);
        }
        Ok(Placement { handle, start })
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        self.state().stopped.push(handle);
    }

    fn close(&mut self) {
        self.state().output_open = false;
    }

    fn is_open(&self) -> bool {
        self.state().output_open
    }
}

/// Observable state behind [`FakeTransport`]
#[derive(Debug, Default)]
pub struct TransportState {
    pub connects: usize,
    pub setups: Vec<LiveSetup>,
    /// Acknowledge the setup immediately
    pub auto_open: bool,
    /// Refuse to connect
    pub refuse: bool,
    events: Option<mpsc::Sender<TransportEvent>>,
    outbound: Option<mpsc::Receiver<WireBlob>>,
    closed: Option<oneshot::Receiver<()>>,
}

/// Scripted live transport
#[derive(Debug, Clone, Default)]
pub struct FakeTransport(Arc<Mutex<TransportState>>);

impl FakeTransport {
    /// Transport that acknowledges the setup straight away
    #[must_use]
    pub fn opening() -> Self {
        let transport = Self::default();
        transport.state().auto_open = true;
        transport
    }

    /// Transport that connects but never acknowledges
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    /// Transport that cannot connect at all
    #[must_use]
    pub fn refusing() -> Self {
        let transport = Self::default();
        transport.state().refuse = true;
        transport
    }

    pub fn state(&self) -> MutexGuard<'_, TransportState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inject an inbound event; `false` if the session already hung up
    pub fn send(&self, event: TransportEvent) -> bool {
        self.state()
            .events
            .as_ref()
            .is_some_and(|events| events.try_send(event).is_ok())
    }

    /// Inject a server message
    pub fn message(&self, msg: sparky_voice::live::ServerMessage) -> bool {
        self.send(TransportEvent::Message(Box::new(msg)))
    }

    /// Frames forwarded by the session so far
    #[must_use]
    pub fn sent_frames(&self) -> Vec<WireBlob> {
        let mut state = self.state();
        let mut frames = Vec::new();
        if let Some(outbound) = state.outbound.as_mut() {
            while let Ok(blob) = outbound.try_recv() {
                frames.push(blob);
            }
        }
        frames
    }

    /// Whether the session closed its connection
    #[must_use]
    pub fn was_closed(&self) -> bool {
        let mut state = self.state();
        state
            .closed
            .as_mut()
            .is_some_and(|closed| !matches!(closed.try_recv(), Err(oneshot::error::TryRecvError::Empty)))
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.state().connects
    }
}

#[async_trait]
impl LiveTransport for FakeTransport {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection> {
        let mut state = self.state();
        state.connects += 1;
        state.setups.push(setup.clone());
        if state.refuse {
            return Err(Error::ConnectFailed("refused by test".to_string()));
        }

        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(16);
        let (close_tx, close_rx) = oneshot::channel();

        if state.auto_open {
            let _ = events_tx.try_send(TransportEvent::Open);
        }
        state.events = Some(events_tx);
        state.outbound = Some(outbound_rx);
        state.closed = Some(close_rx);

        Ok(LiveConnection::new(outbound_tx, events_rx, close_tx))
    }
}

/// Translator that tags text with the target language
#[derive(Debug, Default)]
pub struct FakeTranslator {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeTranslator {
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Translation("offline".to_string()));
        }
        Ok(format!("[{target}] {text}"))
    }
}

/// What [`FakeSynthesizer`] answers with
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    /// A tone of this many seconds
    Audio(f64),
    /// No payload
    Empty,
    /// A service error
    Fail,
}

/// Synthesizer with a canned reply and an optional gate to hold calls open
#[derive(Debug)]
pub struct FakeSynthesizer {
    pub reply: Reply,
    pub gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<(String, String)>>,
}

impl FakeSynthesizer {
    #[must_use]
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            gate: None,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    /// Hold every call until the returned gate is notified
    #[must_use]
    pub fn gated(reply: Reply) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let synth = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::new(reply)
        };
        (synth, gate)
    }

    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// (text, voice) of every call
    #[must_use]
    pub fn texts(&self) -> Vec<(String, String)> {
        self.texts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Option<WireBlob>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((text.to_string(), voice.to_string()));

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match self.reply {
            Reply::Audio(secs) => Ok(Some(chunk(secs))),
            Reply::Empty => Ok(None),
            Reply::Fail => Err(Error::Api {
                status: 503,
                body: "unavailable".to_string(),
            }),
        }
    }
}
