//! Gapless playback scheduling with hard interruption
//!
//! Inbound model audio arrives in bursts. Each chunk is pinned to a running
//! cursor on the output clock so consecutive chunks play back-to-back no
//! matter how the network spaced them.

use std::collections::HashSet;

use super::device::{OutputContext, PlaybackHandle};
use super::pcm::{AudioBuffer, WireBlob};
use crate::Result;

/// Placement of one chunk on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    /// Handle of the scheduled buffer
    pub handle: PlaybackHandle,
    /// Start time in seconds on the output clock
    pub start: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl ScheduledChunk {
    /// End time in seconds on the output clock
    #[must_use]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Schedules decoded chunks back-to-back and tracks what is still playing
pub struct PlaybackScheduler {
    output: Box<dyn OutputContext>,
    cursor: f64,
    in_flight: HashSet<PlaybackHandle>,
}

impl PlaybackScheduler {
    /// Take ownership of an output timeline; the cursor starts at its clock
    #[must_use]
    pub fn new(output: Box<dyn OutputContext>) -> Self {
        let cursor = output.current_time();
        Self {
            output,
            cursor,
            in_flight: HashSet::new(),
        }
    }

    /// Decode a wire payload at the output rate and schedule it
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Decode`] for a malformed payload; the caller
    /// should skip the chunk and keep the session
    pub fn enqueue_blob(&mut self, blob: &WireBlob) -> Result<Option<ScheduledChunk>> {
        let buffer = blob.decode(self.output.sample_rate())?;
        self.enqueue(buffer)
    }

    /// Schedule a buffer immediately after everything already queued
    ///
    /// Empty buffers are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the output context rejects the buffer
    pub fn enqueue(&mut self, buffer: AudioBuffer) -> Result<Option<ScheduledChunk>> {
        if buffer.is_empty() {
            tracing::trace!("skipping empty audio chunk");
            return Ok(None);
        }

        let now = self.output.current_time();
        self.cursor = self.cursor.max(now);

        let duration = buffer.duration();
        let placed = self.output.schedule(buffer, self.cursor)?;
        let (handle, start) = (placed.handle, placed.start);

        self.in_flight.insert(handle);
        // The device may have moved the start if its clock passed the cursor
        self.cursor = start + duration;

        tracing::trace!(
            handle = handle.0,
            start,
            duration,
            in_flight = self.in_flight.len(),
            "scheduled audio chunk"
        );

        Ok(Some(ScheduledChunk {
            handle,
            start,
            duration,
        }))
    }

    /// Record natural completion of a handle
    ///
    /// Returns `true` when this completion drained the in-flight set, i.e. the
    /// agent has finished speaking.
    pub fn on_ended(&mut self, handle: PlaybackHandle) -> bool {
        self.in_flight.remove(&handle) && self.in_flight.is_empty()
    }

    /// Stop everything immediately and re-anchor the cursor to now
    ///
    /// Returns the number of handles stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.stop_in_flight();
        self.cursor = self.output.current_time();
        tracing::debug!(stopped, cursor = self.cursor, "playback interrupted");
        stopped
    }

    /// Stop all playback and release the output device
    pub fn close(&mut self) {
        self.stop_in_flight();
        self.output.close();
    }

    fn stop_in_flight(&mut self) -> usize {
        let stopped = self.in_flight.len();
        for handle in self.in_flight.drain() {
            self.output.stop(handle);
        }
        stopped
    }

    /// Start time for the next chunk, before the clock guard is applied
    #[must_use]
    pub const fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Current output clock in seconds
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.output.current_time()
    }

    /// Number of scheduled but unfinished chunks
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Whether any chunk is still scheduled
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Whether the output device is still held
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.output.is_open()
    }
}
