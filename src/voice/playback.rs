//! Audio playback to speakers
//!
//! Output is a single cpal stream rendering a [`Mixer`]: a timeline of
//! buffers, each pinned to an absolute start frame. The mixer's frame
//! position is the output clock used by the playback scheduler.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::device::{OutputContext, Placement, PlaybackHandle};
use super::pcm::AudioBuffer;
use crate::{Error, Result};

/// Sample rate for playback (matches model and TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Grace period after a buffer's nominal end before giving up on completion
pub const COMPLETION_GRACE: Duration = Duration::from_millis(500);

/// One scheduled buffer on the timeline
#[derive(Debug)]
struct Voice {
    handle: PlaybackHandle,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sample-accurate mixing timeline
///
/// Rendering advances the frame position; buffers whose last sample has been
/// rendered are retired and reported on the `ended` channel.
#[derive(Debug)]
pub struct Mixer {
    sample_rate: u32,
    position: u64,
    next_handle: u64,
    voices: Vec<Voice>,
    ended: mpsc::UnboundedSender<PlaybackHandle>,
}

impl Mixer {
    /// Create an empty timeline at frame zero
    #[must_use]
    pub const fn new(sample_rate: u32, ended: mpsc::UnboundedSender<PlaybackHandle>) -> Self {
        Self {
            sample_rate,
            position: 0,
            next_handle: 1,
            voices: Vec::new(),
            ended,
        }
    }

    /// Current clock in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn current_time(&self) -> f64 {
        self.position as f64 / f64::from(self.sample_rate)
    }

    /// Current clock in frames
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Number of buffers not yet finished
    #[must_use]
    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Pin `samples` to begin at `start_at` seconds
    ///
    /// A start time already in the past begins at the current position.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn schedule(&mut self, samples: Vec<f32>, start_at: f64) -> Placement {
        let requested = (start_at.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        let start_frame = requested.max(self.position);
        let handle = PlaybackHandle(self.next_handle);
        self.next_handle += 1;
        self.voices.push(Voice {
            handle,
            start_frame,
            samples,
        });
        Placement {
            handle,
            start: start_frame as f64 / f64::from(self.sample_rate),
        }
    }

    /// Remove a buffer without reporting completion
    pub fn stop(&mut self, handle: PlaybackHandle) -> bool {
        let before = self.voices.len();
        self.voices.retain(|v| v.handle != handle);
        before != self.voices.len()
    }

    /// Remove every buffer without reporting completion
    pub fn stop_all(&mut self) {
        self.voices.clear();
    }

    /// Render interleaved output, duplicating the mono mix to every channel
    #[allow(clippy::cast_possible_truncation)]
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mut frames = 0u64;

        for frame in out.chunks_mut(channels) {
            let t = self.position + frames;
            let mixed: f32 = self
                .voices
                .iter()
                .filter(|v| t >= v.start_frame && t < v.end_frame())
                .map(|v| v.samples[(t - v.start_frame) as usize])
                .sum();
            frame.fill(mixed.clamp(-1.0, 1.0));
            frames += 1;
        }

        self.position += frames;

        let position = self.position;
        let ended = &self.ended;
        self.voices.retain(|v| {
            let done = v.end_frame() <= position;
            if done {
                let _ = ended.send(v.handle);
            }
            !done
        });
    }
}

/// Plays audio to the default output device
pub struct AudioPlayback {
    stream: Option<Stream>,
    mixer: Arc<Mutex<Mixer>>,
    sample_rate: u32,
}

impl AudioPlayback {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn open(sample_rate: u32, ended: mpsc::UnboundedSender<PlaybackHandle>) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = usize::from(config.channels);

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );

        let mixer = Arc::new(Mutex::new(Mixer::new(sample_rate, ended)));
        let render_mixer = Arc::clone(&mixer);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if let Ok(mut mixer) = render_mixer.lock() {
                        mixer.render(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            mixer,
            sample_rate,
        })
    }

    fn with_mixer<T>(&self, f: impl FnOnce(&mut Mixer) -> T) -> T {
        let mut mixer = self.mixer.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut mixer)
    }
}

impl OutputContext for AudioPlayback {
    fn current_time(&self) -> f64 {
        self.with_mixer(|m| m.current_time())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn schedule(&mut self, buffer: AudioBuffer, start_at: f64) -> Result<Placement> {
        if self.stream.is_none() {
            return Err(Error::Audio("output context closed".to_string()));
        }
        if buffer.sample_rate != self.sample_rate {
            return Err(Error::Audio(format!(
                "buffer rate {} does not match output rate {}",
                buffer.sample_rate, self.sample_rate
            )));
        }
        Ok(self.with_mixer(|m| m.schedule(buffer.samples, start_at)))
    }

    fn stop(&mut self, handle: PlaybackHandle) {
        self.with_mixer(|m| m.stop(handle));
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            self.with_mixer(Mixer::stop_all);
            drop(stream);
            tracing::debug!("audio playback closed");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioPlayback {
    fn drop(&mut self) {
        self.close();
    }
}

/// Play one buffer from the current clock time and wait for it to finish
///
/// Waits at most the buffer's duration plus a short grace period.
///
/// # Errors
///
/// Returns error if the buffer cannot be scheduled
pub async fn play_to_end(
    output: &mut dyn OutputContext,
    ended: &mut mpsc::UnboundedReceiver<PlaybackHandle>,
    buffer: AudioBuffer,
) -> Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }

    let wait = Duration::from_secs_f64(buffer.duration()) + COMPLETION_GRACE;
    let sample_count = buffer.len();
    let now = output.current_time();
    let handle = output.schedule(buffer, now)?.handle;

    let finished = tokio::time::timeout(wait, async {
        while let Some(done) = ended.recv().await {
            if done == handle {
                return true;
            }
        }
        false
    })
    .await;

    match finished {
        Ok(true) => tracing::debug!(samples = sample_count, "playback complete"),
        Ok(false) => tracing::warn!("playback channel closed before completion"),
        Err(_) => {
            tracing::warn!(samples = sample_count, "playback completion timed out");
            output.stop(handle);
        }
    }

    Ok(())
}
