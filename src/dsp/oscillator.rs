#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::f32::consts::TAU;

/*
Phase-Accumulator Oscillator
============================

Every waveform here is a function of a single number: the phase, which walks
from 0.0 up to 1.0 once per cycle and then wraps.

  phase       Position inside the current cycle, in [0.0, 1.0).

  increment   How far the phase moves per sample:

                  increment = frequency / sample_rate

              At 440 Hz and 48 kHz, increment ≈ 0.00917, so one cycle lasts
              about 109 samples.

Changing pitch only changes the increment. The phase itself is never touched,
so a pitch bend glides without a click.


Band Limiting (PolyBLEP)
------------------------

A naive sawtooth jumps from +1 to -1 in zero time. That discontinuity holds
harmonics far above Nyquist, which fold back down as inharmonic aliasing.

PolyBLEP ("polynomial band-limited step") patches the two samples around each
jump with a small polynomial correction:

    naive saw      ╱│╱│╱│        corrected saw    ╱╲╱╲╱   (rounded corners)
                  ╱ │╱ │╱

    t < dt          (just after the wrap):   2t' - t'^2 - 1,   t' = t / dt
    t > 1 - dt      (just before the wrap):  t'^2 + 2t' + 1,   t' = (t - 1) / dt

The square wave has two jumps per cycle (at 0.0 and 0.5), so it gets two
corrections. The sine has no jumps and needs none.
*/

/// The closed set of waveforms a voice can render.
///
/// Adding a timbre means adding a variant here and a branch in
/// [`Waveform::sample`]; program selection lives in `synth::factory`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Waveform {
    Sine,
    Saw,
    Square,
}

impl Waveform {
    /// Evaluate the waveform at `phase` for a phase step of `increment`.
    #[inline]
    pub fn sample(self, phase: f32, increment: f32) -> f32 {
        match self {
            Waveform::Sine => (TAU * phase).sin(),
            Waveform::Saw => 2.0 * phase - 1.0 - poly_blep(phase, increment),
            Waveform::Square => {
                let naive = if phase < 0.5 { 1.0 } else { -1.0 };
                let shifted = (phase + 0.5).fract();
                naive + poly_blep(phase, increment) - poly_blep(shifted, increment)
            }
        }
    }
}

#[inline]
fn poly_blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }

    if t < dt {
        let t = t / dt;
        t + t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + t + t + 1.0
    } else {
        0.0
    }
}

/// Phase accumulator shared by every waveform.
#[derive(Debug, Clone)]
pub struct Oscillator {
    waveform: Waveform,
    phase: f32,
}

impl Oscillator {
    pub fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            phase: 0.0,
        }
    }

    /// Produce one sample at `frequency` and advance the phase.
    #[inline]
    pub fn next_sample(&mut self, frequency: f32, sample_rate: f32) -> f32 {
        // Above Nyquist the wave is meaningless; pin the step just below it.
        let increment = (frequency / sample_rate).clamp(0.0, 0.499);
        let out = self.waveform.sample(self.phase, increment);

        self.phase += increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        out
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }
}
