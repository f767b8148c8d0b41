use std::sync::Arc;

use crate::{
    engine::{config::EngineConfig, queue::EventQueue},
    io::midi::MidiFramer,
    synth::{
        factory::{ParityPrograms, ProgramMap},
        poly::VoiceManager,
    },
};

/// Everything one synthesis cycle touches, minus the thread and the sink.
///
/// The engine drives this from its own thread; tests and offline renders can
/// drive it directly with synthetic timestamps.
pub struct SynthCore {
    voices: VoiceManager,
    framer: MidiFramer,
    buffer: Vec<f32>,
    channels: usize,
    gain: f32,
}

impl SynthCore {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_programs(config, Arc::new(ParityPrograms))
    }

    pub fn with_programs(config: &EngineConfig, programs: Arc<dyn ProgramMap>) -> Self {
        Self {
            voices: VoiceManager::with_shared_programs(config, programs),
            framer: MidiFramer::new(),
            buffer: vec![0.0; config.buffer_len()],
            channels: config.channels as usize,
            gain: config.voice_gain,
        }
    }

    /// Apply every queued event due at or before `now`, oldest first.
    /// Returns the number of events consumed.
    ///
    /// Each event is framed on its own: running status and partial messages
    /// never carry from one queued event into the next, since consecutive
    /// events may come from different producers.
    pub fn process_due(&mut self, queue: &EventQueue, now: u64) -> usize {
        let mut consumed = 0;
        while let Some(event) = queue.pop_due(now) {
            self.apply_bytes(event.data());
            self.framer.reset();
            queue.recycle(event);
            consumed += 1;
        }
        consumed
    }

    /// Frame raw bytes and dispatch the resulting messages immediately.
    /// Framer state carries across calls, as on a single MIDI cable.
    pub fn apply_bytes(&mut self, data: &[u8]) {
        let voices = &mut self.voices;
        self.framer.feed(data, |msg| voices.handle(&msg));
    }

    /// Zero the output buffer and mix every live voice into it.
    pub fn render(&mut self) -> &[f32] {
        self.buffer.fill(0.0);
        self.voices.render(&mut self.buffer, self.channels, self.gain);
        &self.buffer
    }

    /// The most recently rendered buffer.
    pub fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    pub fn frames_per_buffer(&self) -> usize {
        self.buffer.len() / self.channels.max(1)
    }

    pub fn voices(&self) -> &VoiceManager {
        &self.voices
    }

    pub fn voices_mut(&mut self) -> &mut VoiceManager {
        &mut self.voices
    }
}
