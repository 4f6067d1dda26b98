//! 16-bit PCM wire codec
//!
//! Outbound microphone frames are quantized to little-endian `i16`, base64
//! encoded and tagged with an `audio/pcm;rate=<hz>` descriptor. Inbound
//! model audio arrives in the same format and is decoded back to `f32`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Scale factor between normalized floats and `i16`
///
/// 32767 rather than 32768 so a full-scale `1.0` cannot wrap around.
pub const PCM_SCALE: f32 = 32767.0;

/// MIME prefix for raw PCM payloads
const PCM_MIME_PREFIX: &str = "audio/pcm";

/// A fixed-size chunk of mono samples at a known rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Normalized samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Create a frame
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Encode this frame for the wire
    #[must_use]
    pub fn encode(&self) -> WireBlob {
        WireBlob::encode(&self.samples, self.sample_rate)
    }
}

/// Decoded audio ready for scheduling
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Normalized mono samples
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Playback duration in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Encoded transport unit: base64 PCM plus its format descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireBlob {
    /// Base64 of little-endian `i16` samples
    pub data: String,
    /// Format descriptor, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl WireBlob {
    /// Encode normalized samples at the given rate
    #[must_use]
    pub fn encode(samples: &[f32], sample_rate: u32) -> Self {
        Self {
            data: B64.encode(samples_to_pcm_bytes(samples)),
            mime_type: pcm_mime(sample_rate),
        }
    }

    /// Sample rate declared by the descriptor, if any
    #[must_use]
    pub fn sample_rate(&self) -> Option<u32> {
        parse_pcm_rate(&self.mime_type)
    }

    /// Decode into a buffer
    ///
    /// Uses the descriptor's rate when present, otherwise `fallback_rate`.
    ///
    /// # Errors
    ///
    /// Returns error if the payload is not valid base64 or not whole `i16` samples
    pub fn decode(&self, fallback_rate: u32) -> Result<AudioBuffer> {
        let rate = self.sample_rate().unwrap_or(fallback_rate);
        decode_base64_pcm(&self.data, rate)
    }
}

/// Build the descriptor for raw PCM at a rate
#[must_use]
pub fn pcm_mime(sample_rate: u32) -> String {
    format!("{PCM_MIME_PREFIX};rate={sample_rate}")
}

/// Extract `rate=<hz>` from an `audio/pcm` descriptor
#[must_use]
pub fn parse_pcm_rate(mime_type: &str) -> Option<u32> {
    let mut parts = mime_type.split(';').map(str::trim);
    if !parts.next()?.eq_ignore_ascii_case(PCM_MIME_PREFIX) {
        return None;
    }
    parts
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("rate"))
        .and_then(|(_, v)| v.trim().parse().ok())
}

/// Quantize one normalized sample
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn quantize(sample: f32) -> i16 {
    (sample * PCM_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

/// Map an `i16` back to a normalized float
#[must_use]
pub fn dequantize(sample: i16) -> f32 {
    (f32::from(sample) / PCM_SCALE).max(-1.0)
}

/// Serialize samples as little-endian `i16` bytes
#[must_use]
pub fn samples_to_pcm_bytes(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| quantize(s).to_le_bytes())
        .collect()
}

/// Parse little-endian `i16` bytes into normalized samples
///
/// # Errors
///
/// Returns error if the byte count is odd
pub fn pcm_bytes_to_samples(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "PCM payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| dequantize(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

/// Decode a base64 PCM payload at a known rate
///
/// # Errors
///
/// Returns error if the payload is not valid base64 or not whole `i16` samples
pub fn decode_base64_pcm(data: &str, sample_rate: u32) -> Result<AudioBuffer> {
    let bytes = B64
        .decode(data.trim())
        .map_err(|e| Error::Decode(format!("invalid base64 audio: {e}")))?;
    Ok(AudioBuffer::new(pcm_bytes_to_samples(&bytes)?, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_scale_does_not_wrap() {
        assert_eq!(quantize(1.0), i16::MAX);
        assert_eq!(quantize(-1.0), -i16::MAX);
        assert_eq!(quantize(1.5), i16::MAX);
        assert_eq!(quantize(-1.5), i16::MIN);
    }

    #[test]
    fn quantize_rounds_to_nearest() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.5), 16384);
        assert_eq!(quantize(-0.5), -16384);
    }

    #[test]
    fn bytes_are_little_endian() {
        let bytes = samples_to_pcm_bytes(&[1.0]);
        assert_eq!(bytes, vec![0xff, 0x7f]);
    }

    #[test]
    fn odd_length_is_a_decode_error() {
        let err = pcm_bytes_to_samples(&[0, 1, 2]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn invalid_base64_is_a_decode_error() {
        let err = decode_base64_pcm("not base64!!", 24000).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn parses_rate_from_descriptor() {
        assert_eq!(parse_pcm_rate("audio/pcm;rate=16000"), Some(16000));
        assert_eq!(parse_pcm_rate("audio/pcm; rate=24000"), Some(24000));
        assert_eq!(parse_pcm_rate("audio/pcm"), None);
        assert_eq!(parse_pcm_rate("audio/mpeg;rate=24000"), None);
    }

    #[test]
    fn frame_encodes_with_rate_tag() {
        let blob = AudioFrame::new(vec![0.0; 4], 16000).encode();
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(blob.data, B64.encode([0u8; 8]));
    }

    #[test]
    fn blob_decode_prefers_declared_rate() {
        let blob = WireBlob::encode(&[0.25, -0.25], 24000);
        let buffer = blob.decode(16000).unwrap();
        assert_eq!(buffer.sample_rate, 24000);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn buffer_duration() {
        let buffer = AudioBuffer::new(vec![0.0; 12000], 24000);
        assert!((buffer.duration() - 0.5).abs() < f64::EPSILON);
        assert!((AudioBuffer::new(vec![], 0).duration()).abs() < f64::EPSILON);
    }
}
