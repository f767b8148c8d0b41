use std::{collections::HashMap, sync::Arc};

use log::debug;

use crate::{
    dsp::envelope::EnvelopeShape,
    engine::config::EngineConfig,
    io::{converter::bend_to_scaler, midi},
    synth::{
        factory::{ParityPrograms, ProgramMap},
        message::ControlMessage,
        voice::{Voice, VoiceState},
    },
};

const NOTE_COUNT: usize = 128;

/// Owns every voice and all global synthesis state.
///
/// Nothing in here is shared: the synthesis thread is the only caller, so
/// the table and pool need no locking. Other threads talk to it through the
/// event queue.
pub struct VoiceManager {
    /// Sounding voices, keyed by note number. A note appears at most once.
    table: HashMap<u8, Voice>,
    /// Finished voices waiting to be reused.
    pool: Vec<Voice>,
    programs: Arc<dyn ProgramMap>,
    program: u8,
    /// Bumped on every program change; voices from older epochs are never
    /// returned to the pool.
    epoch: u32,
    frequency_scaler: f32,
    bend_range: f32,
    sample_rate: f32,
    envelope: EnvelopeShape,
    max_voices: usize,
    recycle_voices: bool,
    channel_filter: Option<u8>,
    next_id: u64,
    frame_counter: u64,
    reap_scratch: Vec<u8>,
}

impl VoiceManager {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_programs(config, ParityPrograms)
    }

    pub fn with_programs(config: &EngineConfig, programs: impl ProgramMap + 'static) -> Self {
        Self::with_shared_programs(config, Arc::new(programs))
    }

    pub fn with_shared_programs(config: &EngineConfig, programs: Arc<dyn ProgramMap>) -> Self {
        let max_voices = config.max_voices.clamp(1, NOTE_COUNT);

        Self {
            table: HashMap::with_capacity(NOTE_COUNT),
            pool: Vec::with_capacity(max_voices),
            programs,
            program: 0,
            epoch: 0,
            frequency_scaler: 1.0,
            bend_range: config.bend_range_semitones,
            sample_rate: config.sample_rate as f32,
            envelope: config.envelope,
            max_voices,
            recycle_voices: config.recycle_voices,
            channel_filter: config.channel_filter,
            next_id: 0,
            frame_counter: 0,
            reap_scratch: Vec::with_capacity(NOTE_COUNT),
        }
    }

    /// Route one decoded message to its handler.
    pub fn handle(&mut self, msg: &ControlMessage) {
        if let (Some(filter), Some(channel)) = (self.channel_filter, msg.channel()) {
            if filter != channel {
                return;
            }
        }

        match *msg {
            ControlMessage::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity),
            ControlMessage::NoteOff {
                channel,
                note,
                velocity,
            } => self.note_off(channel, note, velocity),
            ControlMessage::PitchBend { channel, value } => self.pitch_bend(channel, value),
            ControlMessage::ProgramChange { program, .. } => self.program_change(program),
            ControlMessage::ControlChange {
                controller, value, ..
            } => self.control_change(controller, value),
            ControlMessage::Other { status, data, len } => {
                debug!("ignoring message status=0x{status:02X} data={data:02X?} len={len}");
            }
        }
    }

    pub fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(channel, note, velocity);
            return;
        }

        // Re-triggering a note replaces its voice outright.
        if let Some(old) = self.table.remove(&note) {
            self.release_to_pool(old);
        }

        if self.table.len() >= self.max_voices {
            self.steal_voice();
        }

        let mut voice = match self.pool.pop() {
            Some(voice) => voice,
            None => self.create_voice(),
        };
        voice.set_frequency_scaler(self.frequency_scaler);
        voice.set_age(self.frame_counter);
        voice.note_on(note, velocity);
        self.table.insert(note, voice);
    }

    pub fn note_off(&mut self, _channel: u8, note: u8, _velocity: u8) {
        if let Some(voice) = self.table.get_mut(&note) {
            voice.note_off();
        }
    }

    /// Apply a 14-bit bend (0..=16383, centered on 8192) to every bound voice.
    pub fn pitch_bend(&mut self, _channel: u8, value: u16) {
        self.set_frequency_scaler(bend_to_scaler(value, self.bend_range));
    }

    /// Switch timbre for future notes. Pooled voices of the old timbre are
    /// discarded so they cannot be handed out again.
    pub fn program_change(&mut self, program: u8) {
        self.program = program;
        self.epoch = self.epoch.wrapping_add(1);
        self.pool.clear();
    }

    pub fn all_notes_off(&mut self) {
        for voice in self.table.values_mut() {
            voice.note_off();
        }
    }

    fn control_change(&mut self, controller: u8, value: u8) {
        match controller {
            midi::CC_ALL_SOUND_OFF | midi::CC_ALL_NOTES_OFF => self.all_notes_off(),
            midi::CC_RESET_ALL_CONTROLLERS => self.set_frequency_scaler(1.0),
            _ => debug!("ignoring control change cc={controller} value={value}"),
        }
    }

    fn set_frequency_scaler(&mut self, scaler: f32) {
        self.frequency_scaler = scaler;
        for voice in self.table.values_mut() {
            voice.set_frequency_scaler(scaler);
        }
    }

    /// Reap finished voices, then add every remaining voice into `buffer`.
    ///
    /// `buffer` is interleaved with `channels` samples per frame. It is not
    /// cleared here; the caller zeroes it once per cycle.
    pub fn render(&mut self, buffer: &mut [f32], channels: usize, gain: f32) {
        self.reap_scratch.clear();
        self.reap_scratch.extend(
            self.table
                .iter()
                .filter(|(_, voice)| voice.is_done())
                .map(|(&note, _)| note),
        );

        while let Some(note) = self.reap_scratch.pop() {
            if let Some(voice) = self.table.remove(&note) {
                self.release_to_pool(voice);
            }
        }

        for voice in self.table.values_mut() {
            voice.mix(buffer, channels, gain);
        }

        self.frame_counter += (buffer.len() / channels.max(1)) as u64;
    }

    fn create_voice(&mut self) -> Voice {
        let waveform = self.programs.waveform(self.program);
        let mut voice = Voice::new(self.next_id, waveform, self.envelope, self.sample_rate);
        voice.set_epoch(self.epoch);
        self.next_id += 1;
        voice
    }

    fn release_to_pool(&mut self, mut voice: Voice) {
        if self.recycle_voices && voice.epoch() == self.epoch && self.pool.len() < self.max_voices {
            voice.recycle();
            self.pool.push(voice);
        }
    }

    /// Make room for one more note: oldest releasing voice first, then the
    /// oldest voice of any kind.
    fn steal_voice(&mut self) {
        let oldest = |state: Option<VoiceState>| {
            self.table
                .iter()
                .filter(|(_, v)| state.map_or(true, |s| v.state() == s))
                .min_by_key(|(_, v)| v.age())
                .map(|(&note, _)| note)
        };

        let victim = oldest(Some(VoiceState::Releasing)).or_else(|| oldest(None));
        if let Some(note) = victim {
            debug!("stealing voice for note {note}");
            if let Some(voice) = self.table.remove(&note) {
                self.release_to_pool(voice);
            }
        }
    }

    pub fn voice(&self, note: u8) -> Option<&Voice> {
        self.table.get(&note)
    }

    pub fn notes(&self) -> impl Iterator<Item = u8> + '_ {
        self.table.keys().copied()
    }

    /// Voices currently bound in the table, including ones still releasing.
    pub fn active_count(&self) -> usize {
        self.table.len()
    }

    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }

    pub fn frequency_scaler(&self) -> f32 {
        self.frequency_scaler
    }

    pub fn program(&self) -> u8 {
        self.program
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::oscillator::Waveform;

    const CHANNELS: usize = 2;
    const FRAMES: usize = 240;

    fn config() -> EngineConfig {
        EngineConfig {
            envelope: EnvelopeShape::adsr(0.001, 0.01, 0.8, 0.02),
            ..EngineConfig::default()
        }
    }

    fn cycle(manager: &mut VoiceManager) -> Vec<f32> {
        let mut buffer = vec![0.0; FRAMES * CHANNELS];
        manager.render(&mut buffer, CHANNELS, 0.25);
        buffer
    }

    fn run_until_empty(manager: &mut VoiceManager, max_cycles: usize) -> usize {
        for n in 0..max_cycles {
            if manager.active_count() == 0 {
                return n;
            }
            cycle(manager);
        }
        panic!("voices never finished");
    }

    #[test]
    fn note_on_binds_one_active_voice() {
        let mut manager = VoiceManager::new(&config());
        for note in [0u8, 60, 127] {
            manager.note_on(0, note, 100);
            let voice = manager.voice(note).expect("voice bound");
            assert_eq!(voice.state(), VoiceState::Active);
        }
        assert_eq!(manager.active_count(), 3);
    }

    #[test]
    fn retrigger_replaces_existing_voice() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 60, 100);
        manager.note_on(0, 60, 50);

        assert_eq!(manager.active_count(), 1);
        assert_eq!(manager.voice(60).map(|v| v.velocity()), Some(50));
    }

    #[test]
    fn note_off_releases_then_removes() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 64, 100);
        cycle(&mut manager);

        manager.note_off(0, 64, 0);
        assert_eq!(
            manager.voice(64).map(|v| v.state()),
            Some(VoiceState::Releasing)
        );

        // 20ms release = 960 frames = 4 buffers, plus one to reap.
        let cycles = run_until_empty(&mut manager, 16);
        assert!(cycles <= 6, "took {cycles} cycles");
        assert!(manager.voice(64).is_none());
    }

    #[test]
    fn zero_velocity_note_on_is_note_off() {
        let mut a = VoiceManager::new(&config());
        let mut b = VoiceManager::new(&config());
        for m in [&mut a, &mut b] {
            m.note_on(0, 60, 100);
            cycle(m);
        }

        a.note_on(0, 60, 0);
        b.note_off(0, 60, 0);

        assert_eq!(a.voice(60).map(|v| v.state()), Some(VoiceState::Releasing));
        assert_eq!(b.voice(60).map(|v| v.state()), Some(VoiceState::Releasing));
        assert_eq!(cycle(&mut a), cycle(&mut b));
    }

    #[test]
    fn note_off_for_unknown_note_is_noop() {
        let mut manager = VoiceManager::new(&config());
        manager.note_off(0, 10, 0);
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn pitch_bend_updates_every_voice_in_place() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 60, 100);
        manager.note_on(0, 67, 100);
        cycle(&mut manager);

        let before: Vec<(f32, f32)> = [60, 67]
            .iter()
            .map(|&n| {
                let v = manager.voice(n).unwrap();
                (v.phase(), v.envelope_level())
            })
            .collect();

        manager.pitch_bend(0, 0);
        let expected = 2.0_f32.powf(-2.0 / 12.0);
        assert!((manager.frequency_scaler() - expected).abs() < 1e-6);

        for (i, &n) in [60u8, 67].iter().enumerate() {
            let v = manager.voice(n).unwrap();
            assert_eq!(v.frequency_scaler(), manager.frequency_scaler());
            assert_eq!((v.phase(), v.envelope_level()), before[i]);
            assert_eq!(v.state(), VoiceState::Active);
        }

        manager.pitch_bend(0, 8192);
        assert_eq!(manager.frequency_scaler(), 1.0);
    }

    #[test]
    fn new_voices_inherit_current_bend() {
        let mut manager = VoiceManager::new(&config());
        manager.pitch_bend(0, 16383);
        manager.note_on(0, 60, 100);
        assert_eq!(
            manager.voice(60).map(|v| v.frequency_scaler()),
            Some(manager.frequency_scaler())
        );
    }

    #[test]
    fn finished_voices_are_recycled() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 60, 100);
        let id = manager.voice(60).unwrap().id();
        manager.note_off(0, 60, 0);
        run_until_empty(&mut manager, 16);

        assert_eq!(manager.pool_len(), 1);
        manager.note_on(0, 62, 100);
        assert_eq!(manager.voice(62).unwrap().id(), id);
        assert_eq!(manager.pool_len(), 0);
    }

    #[test]
    fn recycling_can_be_disabled() {
        let mut manager = VoiceManager::new(&EngineConfig {
            recycle_voices: false,
            ..config()
        });
        manager.note_on(0, 60, 100);
        manager.note_off(0, 60, 0);
        run_until_empty(&mut manager, 16);

        assert_eq!(manager.pool_len(), 0);
    }

    #[test]
    fn program_change_clears_pool_and_blocks_stale_voices() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 60, 100);
        manager.note_on(0, 61, 100);
        let old_ids: Vec<u64> = [60u8, 61].iter().map(|&n| manager.voice(n).unwrap().id()).collect();

        // One voice reaches the pool before the switch, one is still held.
        manager.note_off(0, 60, 0);
        for _ in 0..8 {
            cycle(&mut manager);
        }
        assert_eq!(manager.pool_len(), 1);

        manager.program_change(1);
        assert_eq!(manager.pool_len(), 0);

        // The held voice finishes after the switch and must not be pooled.
        manager.note_off(0, 61, 0);
        run_until_empty(&mut manager, 16);
        assert_eq!(manager.pool_len(), 0);

        manager.note_on(0, 72, 100);
        let voice = manager.voice(72).unwrap();
        assert!(!old_ids.contains(&voice.id()));
        assert_eq!(voice.waveform(), Waveform::Sine);
    }

    #[test]
    fn program_parity_selects_waveform() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 60, 100);
        assert_eq!(manager.voice(60).unwrap().waveform(), Waveform::Saw);

        manager.program_change(3);
        manager.note_on(0, 61, 100);
        assert_eq!(manager.voice(61).unwrap().waveform(), Waveform::Sine);
    }

    #[test]
    fn all_notes_off_releases_everything() {
        let mut manager = VoiceManager::new(&config());
        for note in 60..64 {
            manager.note_on(0, note, 90);
        }
        manager.all_notes_off();
        assert!(manager
            .notes()
            .all(|n| manager.voice(n).unwrap().state() == VoiceState::Releasing));
    }

    #[test]
    fn control_change_all_notes_off() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 60, 90);
        manager.handle(&ControlMessage::ControlChange {
            channel: 0,
            controller: midi::CC_ALL_NOTES_OFF,
            value: 0,
        });
        assert_eq!(
            manager.voice(60).map(|v| v.state()),
            Some(VoiceState::Releasing)
        );
    }

    #[test]
    fn reset_all_controllers_recenters_bend() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 60, 90);
        manager.pitch_bend(0, 0);
        assert!(manager.frequency_scaler() < 1.0);

        manager.handle(&ControlMessage::ControlChange {
            channel: 0,
            controller: midi::CC_RESET_ALL_CONTROLLERS,
            value: 0,
        });
        assert_eq!(manager.frequency_scaler(), 1.0);
        assert_eq!(manager.voice(60).map(|v| v.frequency_scaler()), Some(1.0));
    }

    #[test]
    fn steals_oldest_releasing_voice_first() {
        let mut manager = VoiceManager::new(&EngineConfig {
            max_voices: 2,
            ..config()
        });
        manager.note_on(0, 60, 100);
        cycle(&mut manager);
        manager.note_on(0, 62, 100);
        cycle(&mut manager);
        manager.note_off(0, 62, 0);

        manager.note_on(0, 64, 100);
        assert_eq!(manager.active_count(), 2);
        assert!(manager.voice(60).is_some());
        assert!(manager.voice(62).is_none());

        manager.note_on(0, 65, 100);
        assert!(manager.voice(60).is_none(), "oldest active voice stolen");
    }

    #[test]
    fn channel_filter_drops_other_channels() {
        let mut manager = VoiceManager::new(&EngineConfig {
            channel_filter: Some(1),
            ..config()
        });
        manager.handle(&ControlMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        });
        manager.handle(&ControlMessage::NoteOn {
            channel: 1,
            note: 61,
            velocity: 100,
        });
        assert!(manager.voice(60).is_none());
        assert!(manager.voice(61).is_some());
    }

    #[test]
    fn silent_without_voices() {
        let mut manager = VoiceManager::new(&config());
        let buffer = cycle(&mut manager);
        assert_eq!(buffer.len(), FRAMES * CHANNELS);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn single_voice_output_is_scaled_by_gain() {
        let mut manager = VoiceManager::new(&config());
        manager.note_on(0, 69, 100);
        let mut reference = manager.voice(69).unwrap().clone();

        let mixed = cycle(&mut manager);
        let mut own = vec![0.0; FRAMES * CHANNELS];
        reference.mix(&mut own, CHANNELS, 1.0);

        for (m, o) in mixed.iter().zip(&own) {
            assert!((m - o * 0.25).abs() < 1e-6);
        }
    }
}
