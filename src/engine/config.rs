#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::time::Duration;

use crate::{dsp::envelope::EnvelopeShape, engine::error::EngineError};

/// What to do when the event queue is full.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the earliest pending event to make room.
    #[default]
    DropOldest,
    /// Refuse the incoming event.
    DropNewest,
}

/// Engine-level tuning constants.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    pub frames_per_buffer: usize,
    pub channels: u16,
    pub bend_range_semitones: f32,
    /// Fixed gain applied to each voice so a full chord does not clip.
    pub voice_gain: f32,
    /// Most notes sounding at once before voices get stolen.
    pub max_voices: usize,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    /// Return finished voices to the free pool for reuse.
    pub recycle_voices: bool,
    /// Only react to this MIDI channel; `None` listens to all of them.
    pub channel_filter: Option<u8>,
    pub envelope: EnvelopeShape,
    pub stop_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frames_per_buffer: 240,
            channels: 2,
            bend_range_semitones: 2.0,
            voice_gain: 0.25,
            max_voices: 64,
            queue_capacity: 1024,
            overflow_policy: OverflowPolicy::DropOldest,
            recycle_voices: true,
            channel_filter: None,
            envelope: EnvelopeShape::default(),
            stop_timeout: Duration::from_millis(500),
        }
    }
}

impl EngineConfig {
    /// Samples in one interleaved output buffer.
    pub fn buffer_len(&self) -> usize {
        self.frames_per_buffer * self.channels as usize
    }

    /// Wall-clock length of one output buffer.
    pub fn buffer_period(&self) -> Duration {
        let nanos = self.frames_per_buffer as u64 * 1_000_000_000 / self.sample_rate.max(1) as u64;
        Duration::from_nanos(nanos)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |reason: &str| Err(EngineError::Config(reason.to_string()));

        if self.sample_rate == 0 {
            return invalid("sample_rate must be positive");
        }
        if self.frames_per_buffer == 0 {
            return invalid("frames_per_buffer must be positive");
        }
        if self.channels == 0 {
            return invalid("channels must be positive");
        }
        if self.queue_capacity == 0 {
            return invalid("queue_capacity must be positive");
        }
        if self.max_voices == 0 {
            return invalid("max_voices must be positive");
        }
        if !self.voice_gain.is_finite() || self.voice_gain < 0.0 {
            return invalid("voice_gain must be finite and non-negative");
        }
        if !self.bend_range_semitones.is_finite() || self.bend_range_semitones < 0.0 {
            return invalid("bend_range_semitones must be finite and non-negative");
        }
        if matches!(self.channel_filter, Some(channel) if channel > 15) {
            return invalid("channel_filter must be 0..=15");
        }
        Ok(())
    }
}
