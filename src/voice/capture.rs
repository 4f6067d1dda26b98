//! Audio capture from microphone
//!
//! The cpal callback slices device audio into fixed-size mono frames and
//! pushes them onto a bounded channel. The receiving end of that channel is
//! the lazy, unbounded frame sequence consumed by the live session.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use super::device::InputContext;
use super::pcm::{AudioFrame, quantize};
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Samples per outbound frame
pub const FRAME_SIZE: usize = 4096;

/// Accumulates device callback slices into exact-size mono frames
///
/// Interleaved multi-channel input is reduced to channel 0.
#[derive(Debug)]
pub struct FrameChunker {
    frame_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    /// Create a chunker for `channels`-wide interleaved input
    #[must_use]
    pub fn new(frame_size: usize, channels: u16) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            channels: usize::from(channels.max(1)),
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Feed interleaved samples, returning every frame completed by them
    pub fn push(&mut self, interleaved: &[f32]) -> Vec<Vec<f32>> {
        let mut frames = Vec::new();
        for sample in interleaved.iter().step_by(self.channels) {
            self.pending.push(*sample);
            if self.pending.len() == self.frame_size {
                frames.push(std::mem::replace(
                    &mut self.pending,
                    Vec::with_capacity(self.frame_size),
                ));
            }
        }
        frames
    }

    /// Samples waiting for the next frame boundary
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Captures audio from the default input device
pub struct AudioCapture {
    stream: Option<Stream>,
    sample_rate: u32,
    channels: u16,
}

impl AudioCapture {
    /// Open the default microphone at `sample_rate`
    ///
    /// The stream is built but not started; call [`InputContext::resume`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] if no input device is usable
    pub fn open(
        sample_rate: u32,
        frame_size: usize,
        frames: mpsc::Sender<AudioFrame>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::PermissionDenied("no input device available".to_string()))?;

        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::PermissionDenied(e.to_string()))?
            .filter(|c| {
                c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
                    && matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16)
            })
            .min_by_key(cpal::SupportedStreamConfigRange::channels)
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?
            .with_sample_rate(SampleRate(sample_rate));

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.config();
        let channels = config.channels;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            frame_size,
            "audio capture initialized"
        );

        let mut chunker = FrameChunker::new(frame_size, channels);
        let mut deliver = move |data: &[f32]| {
            for samples in chunker.push(data) {
                match frames.try_send(AudioFrame::new(samples, sample_rate)) {
                    Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("capture frame queue full, dropping frame");
                    }
                }
            }
        };

        let err_fn = |err: cpal::StreamError| {
            tracing::error!(error = %err, "audio capture error");
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<f32> =
                        data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                    deliver(&converted);
                },
                err_fn,
                None,
            ),
            _ => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| deliver(data),
                err_fn,
                None,
            ),
        }
        .map_err(|e| Error::PermissionDenied(e.to_string()))?;

        // Some backends start streams as soon as they are built
        if let Err(e) = stream.pause() {
            tracing::debug!(error = %e, "capture stream cannot be paused before resume");
        }

        Ok(Self {
            stream: Some(stream),
            sample_rate,
            channels,
        })
    }

    /// Get the sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of interleaved device channels
    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }
}

impl InputContext for AudioCapture {
    fn resume(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| Error::Audio("capture stream already closed".to_string()))?;
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        tracing::debug!("audio capture started");
        Ok(())
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(quantize(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
