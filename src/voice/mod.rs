//! Voice processing module
//!
//! Handles PCM coding, audio capture, gapless playback scheduling and
//! one-shot speech synthesis.

mod capture;
mod device;
mod pcm;
mod playback;
mod scheduler;
mod speaker;
mod tts;

pub use capture::{AudioCapture, FRAME_SIZE, FrameChunker, SAMPLE_RATE, samples_to_wav};
pub use device::{
    AudioDevices, CpalDevices, InputContext, OutputContext, Placement, PlaybackHandle,
};
pub use pcm::{
    AudioBuffer, AudioFrame, PCM_SCALE, WireBlob, decode_base64_pcm, dequantize, parse_pcm_rate,
    pcm_bytes_to_samples, pcm_mime, quantize, samples_to_pcm_bytes,
};
pub use playback::{AudioPlayback, COMPLETION_GRACE, Mixer, PLAYBACK_SAMPLE_RATE, play_to_end};
pub use scheduler::{PlaybackScheduler, ScheduledChunk};
pub use speaker::{SpeakOutcome, SpeechPlayer};
pub use tts::{DEFAULT_TTS_MODEL, Synthesizer, TextToSpeech};
