//! Audio device abstraction
//!
//! A live session owns exactly one input context (the microphone) and one
//! output context (the speaker timeline). Both are opened through
//! [`AudioDevices`] so the session state machine can run against fakes.

use tokio::sync::mpsc;

use super::pcm::{AudioBuffer, AudioFrame};
use crate::Result;

/// Identifier of one scheduled buffer on an output timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaybackHandle(pub u64);

/// Where a buffer actually landed on an output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub handle: PlaybackHandle,
    /// Start in seconds; later than requested if that time had already passed
    pub start: f64,
}

/// An open microphone stream
pub trait InputContext {
    /// Begin delivering frames
    ///
    /// # Errors
    ///
    /// Returns error if the device refuses to start
    fn resume(&mut self) -> Result<()>;

    /// Release the device; idempotent
    fn close(&mut self);

    /// Whether the device is still held
    fn is_open(&self) -> bool;
}

/// An open output timeline with sample-accurate scheduling
pub trait OutputContext {
    /// Current position of the output clock in seconds
    fn current_time(&self) -> f64;

    /// Sample rate of the timeline
    fn sample_rate(&self) -> u32;

    /// Schedule `buffer` to begin at `start_at` seconds
    ///
    /// A start time the clock has already passed begins at the current
    /// position; the returned [`Placement`] carries the actual start. The
    /// context reports natural completion of the handle on the `ended`
    /// channel it was opened with.
    ///
    /// # Errors
    ///
    /// Returns error if the context is closed or the device failed
    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<Placement>;

    /// Stop a scheduled buffer immediately; no completion is reported for it
    fn stop(&mut self, handle: PlaybackHandle);

    /// Release the device; idempotent
    fn close(&mut self);

    /// Whether the device is still held
    fn is_open(&self) -> bool;
}

/// Factory for device contexts
pub trait AudioDevices {
    /// Open the microphone at `sample_rate`, delivering `frame_size`-sample
    /// frames on `frames` once resumed
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::PermissionDenied`] if the microphone cannot be used
    fn open_input(
        &mut self,
        sample_rate: u32,
        frame_size: usize,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn InputContext>>;

    /// Open an output timeline at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no output device is usable
    fn open_output(
        &mut self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<PlaybackHandle>,
    ) -> Result<Box<dyn OutputContext>>;
}

/// Devices backed by the system's default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalDevices;

impl AudioDevices for CpalDevices {
    fn open_input(
        &mut self,
        sample_rate: u32,
        frame_size: usize,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Box<dyn InputContext>> {
        let capture = super::capture::AudioCapture::open(sample_rate, frame_size, frames)?;
        Ok(Box::new(capture))
    }

    fn open_output(
        &mut self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<PlaybackHandle>,
    ) -> Result<Box<dyn OutputContext>> {
        let playback = super::playback::AudioPlayback::open(sample_rate, ended)?;
        Ok(Box::new(playback))
    }
}
