#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shortest stage length; keeps per-sample increments finite.
const MIN_TIME: f32 = 1.0 / 48_000.0;

/*
ADSR Amplitude Envelope
=======================

Every voice multiplies its oscillator by this envelope. The envelope is a
small state machine driven by the gate (note on / note off) and advanced one
sample at a time.

  Level
    1.0 ┐     ╱╲
        │    ╱  ╲___________
    S   │   ╱               ╲
        │  ╱                 ╲
    0.0 └─╱───────────────────╲──→ Time
        Attack Decay  Sustain  Release

Stages:

    Idle ──note_on──→ Attack ──level=1──→ Decay ──level=S──→ Sustain
                         │                  │                   │
                         └──────note_off────┴───────────────────┘
                                            ↓
                                         Release ──level≤silence──→ Idle

All ramps are linear. Release starts from whatever level the envelope has
when the gate drops, not from the sustain level, so releasing mid-attack
does not click.

Release is pre-computed at note_off: we snapshot the starting level and the
number of samples the ramp should take, then interpolate. The ramp ends as
soon as the level falls to SILENCE_THRESHOLD; the voice owning the envelope
takes that as its signal to finish.
*/

/// Level at or below which a releasing envelope counts as silent.
pub const SILENCE_THRESHOLD: f32 = 1.0e-4;

/// Time constants for an envelope, in seconds (sustain is a level).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeShape {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl EnvelopeShape {
    pub fn adsr(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

impl Default for EnvelopeShape {
    fn default() -> Self {
        Self::adsr(0.01, 0.1, 0.7, 0.3)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

#[derive(Debug, Clone)]
pub struct Envelope {
    attack_time: f32,
    decay_time: f32,
    sustain_level: f32,
    release_time: f32,
    sample_rate: f32,

    stage: EnvelopeStage,
    level: f32,

    release_start_level: f32,
    release_total_samples: u32,
    release_elapsed_samples: u32,
}

impl Envelope {
    pub fn new(shape: EnvelopeShape, sample_rate: f32) -> Self {
        Self {
            attack_time: shape.attack.max(MIN_TIME),
            decay_time: shape.decay.max(MIN_TIME),
            sustain_level: shape.sustain.clamp(0.0, 1.0),
            release_time: shape.release.max(MIN_TIME),
            sample_rate,

            stage: EnvelopeStage::Idle,
            level: 0.0,
            release_start_level: 0.0,
            release_total_samples: 1,
            release_elapsed_samples: 0,
        }
    }

    /// Gate high: restart the attack from zero.
    pub fn note_on(&mut self) {
        self.level = 0.0;
        self.stage = EnvelopeStage::Attack;
        self.release_elapsed_samples = 0;
    }

    /// Gate low: ramp from the current level down to silence.
    pub fn note_off(&mut self) {
        if matches!(self.stage, EnvelopeStage::Idle | EnvelopeStage::Release) {
            return;
        }

        self.release_start_level = self.level;
        self.release_total_samples = (self.release_time * self.sample_rate).round().max(1.0) as u32;
        self.release_elapsed_samples = 0;
        self.stage = EnvelopeStage::Release;
    }

    /// Advance by one sample and return the new level.
    pub fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Idle => {
                self.level = 0.0;
            }

            EnvelopeStage::Attack => {
                self.level += 1.0 / (self.attack_time * self.sample_rate);

                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }

            EnvelopeStage::Decay => {
                let drop = 1.0 - self.sustain_level;
                self.level -= drop / (self.decay_time * self.sample_rate);

                if self.level <= self.sustain_level {
                    self.level = self.sustain_level;
                    self.stage = EnvelopeStage::Sustain;
                }
            }

            EnvelopeStage::Sustain => {
                self.level = self.sustain_level;
            }

            EnvelopeStage::Release => {
                let progress =
                    self.release_elapsed_samples as f32 / self.release_total_samples as f32;
                self.level = (self.release_start_level * (1.0 - progress)).max(0.0);
                self.release_elapsed_samples = self.release_elapsed_samples.saturating_add(1);

                if self.level <= SILENCE_THRESHOLD
                    || self.release_elapsed_samples >= self.release_total_samples
                {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
        }

        debug_assert!((0.0..=1.0).contains(&self.level));
        self.level
    }

    /// True while the envelope is producing output.
    pub fn is_active(&self) -> bool {
        !matches!(self.stage, EnvelopeStage::Idle)
    }

    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Idle;
        self.level = 0.0;
        self.release_start_level = 0.0;
        self.release_elapsed_samples = 0;
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }
}
