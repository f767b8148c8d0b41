use std::collections::HashMap;

use crate::dsp::oscillator::Waveform;

/// Chooses the waveform new voices use for a given program number.
///
/// This is the "instrument design" seam: the voice manager only ever asks
/// for a waveform, so new timbres plug in here without touching callers.
pub trait ProgramMap: Send + Sync {
    fn waveform(&self, program: u8) -> Waveform;
}

impl<F> ProgramMap for F
where
    F: Fn(u8) -> Waveform + Send + Sync,
{
    fn waveform(&self, program: u8) -> Waveform {
        self(program)
    }
}

/// Odd programs play a sine, even programs a sawtooth.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParityPrograms;

impl ProgramMap for ParityPrograms {
    fn waveform(&self, program: u8) -> Waveform {
        if program & 1 == 1 {
            Waveform::Sine
        } else {
            Waveform::Saw
        }
    }
}

/// Explicit per-program assignments, falling back to [`ParityPrograms`].
#[derive(Debug, Default, Clone)]
pub struct ProgramTable {
    entries: HashMap<u8, Waveform>,
}

impl ProgramTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, program: u8, waveform: Waveform) -> Self {
        self.entries.insert(program, waveform);
        self
    }
}

impl ProgramMap for ProgramTable {
    fn waveform(&self, program: u8) -> Waveform {
        self.entries
            .get(&program)
            .copied()
            .unwrap_or_else(|| ParityPrograms.waveform(program))
    }
}
