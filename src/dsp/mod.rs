//! Low-level DSP primitives used by the voices.
//!
//! These components are allocation-free and realtime-safe, making them safe to
//! embed directly inside voice structs.

/// Attack/decay/sustain/release envelope generator.
pub mod envelope;
/// Phase-accumulator oscillator and the closed waveform set.
pub mod oscillator;

pub use envelope::{EnvelopeShape, EnvelopeStage};
pub use oscillator::Waveform;
