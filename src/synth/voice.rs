use crate::{
    dsp::{
        envelope::{Envelope, EnvelopeShape},
        oscillator::{Oscillator, Waveform},
    },
    io::converter::midi_note_to_freq,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,      // In the free pool, silent
    Active,    // Sounding, follows frequency-scaler updates
    Releasing, // Key released, envelope ramping to silence
    Done,      // Silent for good; ready to be reaped
}

/// A single monophonic sound generator: oscillator, envelope and note state.
#[derive(Debug, Clone)]
pub struct Voice {
    id: u64,
    note: u8,
    velocity: u8,
    amplitude: f32,
    base_frequency: f32,
    frequency_scaler: f32,
    state: VoiceState,
    age: u64,
    epoch: u32,
    sample_rate: f32,
    oscillator: Oscillator,
    envelope: Envelope,
}

impl Voice {
    pub fn new(id: u64, waveform: Waveform, shape: EnvelopeShape, sample_rate: f32) -> Self {
        Self {
            id,
            note: 0,
            velocity: 0,
            amplitude: 0.0,
            base_frequency: 0.0,
            frequency_scaler: 1.0,
            state: VoiceState::Idle,
            age: 0,
            epoch: 0,
            sample_rate,
            oscillator: Oscillator::new(waveform),
            envelope: Envelope::new(shape, sample_rate),
        }
    }

    /// Arm the voice for `note`. Works from any state, so a voice that is
    /// still sounding can be re-armed in place.
    pub fn note_on(&mut self, note: u8, velocity: u8) {
        self.note = note;
        self.velocity = velocity;
        self.amplitude = velocity as f32 / 127.0;
        self.base_frequency = midi_note_to_freq(note);
        self.state = VoiceState::Active;
        self.envelope.note_on();
    }

    pub fn note_off(&mut self) {
        if self.state == VoiceState::Active {
            self.state = VoiceState::Releasing;
            self.envelope.note_off();
        }
    }

    /// Retune without touching phase or envelope.
    pub fn set_frequency_scaler(&mut self, scaler: f32) {
        self.frequency_scaler = scaler;
    }

    /// Add this voice's next `buffer.len() / channels_per_frame` frames into
    /// `buffer`, scaled by `gain`, writing the same sample to every channel.
    pub fn mix(&mut self, buffer: &mut [f32], channels_per_frame: usize, gain: f32) {
        if !matches!(self.state, VoiceState::Active | VoiceState::Releasing) {
            return;
        }

        let frequency = self.base_frequency * self.frequency_scaler;
        for frame in buffer.chunks_exact_mut(channels_per_frame.max(1)) {
            let sample = self.next_sample(frequency) * gain;
            for out in frame {
                *out += sample;
            }
        }
    }

    fn next_sample(&mut self, frequency: f32) -> f32 {
        let level = self.envelope.next_sample();
        let out = self.oscillator.next_sample(frequency, self.sample_rate) * level * self.amplitude;

        if self.state == VoiceState::Releasing && !self.envelope.is_active() {
            self.state = VoiceState::Done;
        }

        out
    }

    /// Return to `Idle` so the voice can wait in the free pool.
    pub fn recycle(&mut self) {
        self.state = VoiceState::Idle;
        self.note = 0;
        self.velocity = 0;
        self.amplitude = 0.0;
        self.envelope.reset();
        self.oscillator.reset();
    }

    pub fn is_done(&self) -> bool {
        self.state == VoiceState::Done
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn velocity(&self) -> u8 {
        self.velocity
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn waveform(&self) -> Waveform {
        self.oscillator.waveform()
    }

    pub fn frequency_scaler(&self) -> f32 {
        self.frequency_scaler
    }

    /// Oscillator phase, in cycles.
    pub fn phase(&self) -> f32 {
        self.oscillator.phase()
    }

    pub fn envelope_level(&self) -> f32 {
        self.envelope.level()
    }

    pub(crate) fn age(&self) -> u64 {
        self.age
    }

    pub(crate) fn set_age(&mut self, age: u64) {
        self.age = age;
    }

    pub(crate) fn epoch(&self) -> u32 {
        self.epoch
    }

    pub(crate) fn set_epoch(&mut self, epoch: u32) {
        self.epoch = epoch;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: f32 = 48_000.0;

    fn voice(waveform: Waveform) -> Voice {
        Voice::new(
            1,
            waveform,
            EnvelopeShape::adsr(0.001, 0.01, 0.8, 0.01),
            SAMPLE_RATE,
        )
    }

    #[test]
    fn lifecycle_runs_idle_to_done() {
        let mut v = voice(Waveform::Sine);
        assert_eq!(v.state(), VoiceState::Idle);

        v.note_on(60, 100);
        assert_eq!(v.state(), VoiceState::Active);

        let mut buffer = vec![0.0; 480];
        v.mix(&mut buffer, 2, 1.0);
        assert!(buffer.iter().any(|s| s.abs() > 0.0));

        v.note_off();
        assert_eq!(v.state(), VoiceState::Releasing);

        // 10ms release at 48kHz is 480 frames.
        for _ in 0..4 {
            v.mix(&mut buffer, 2, 1.0);
        }
        assert!(v.is_done());
    }

    #[test]
    fn note_off_is_ignored_unless_active() {
        let mut v = voice(Waveform::Saw);
        v.note_off();
        assert_eq!(v.state(), VoiceState::Idle);
    }

    #[test]
    fn channels_receive_identical_samples() {
        let mut v = voice(Waveform::Saw);
        v.note_on(57, 127);

        let mut buffer = vec![0.0; 64];
        v.mix(&mut buffer, 2, 0.5);
        for frame in buffer.chunks_exact(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn scaler_change_keeps_phase_and_envelope() {
        let mut v = voice(Waveform::Sine);
        v.note_on(69, 100);
        let mut buffer = vec![0.0; 200];
        v.mix(&mut buffer, 2, 1.0);

        let phase = v.phase();
        let level = v.envelope_level();
        v.set_frequency_scaler(1.5);

        assert_eq!(v.phase(), phase);
        assert_eq!(v.envelope_level(), level);
        assert_eq!(v.frequency_scaler(), 1.5);
        assert_eq!(v.state(), VoiceState::Active);
    }

    #[test]
    fn recycled_voice_is_idle_and_silent() {
        let mut v = voice(Waveform::Sine);
        v.note_on(60, 100);
        v.recycle();

        let mut buffer = vec![0.0; 32];
        v.mix(&mut buffer, 2, 1.0);
        assert!(buffer.iter().all(|&s| s == 0.0));
        assert_eq!(v.state(), VoiceState::Idle);
    }
}
