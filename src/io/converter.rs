use crate::{io::midi, synth::message::ControlMessage};

/// Center of the 14-bit pitch-bend range.
pub const BEND_CENTER: u16 = 0x2000;
/// Largest legal 14-bit pitch-bend value.
pub const BEND_MAX: u16 = 0x3FFF;

/// Convert MIDI note number to frequency in Hz.
/// A4 = 440 Hz = MIDI note 69
pub fn midi_note_to_freq(note: u8) -> f32 {
    440.0 * 2.0_f32.powf((note as f32 - 69.0) / 12.0)
}

/// Semitone offset for a 14-bit bend value: `range * (value - 8192) / 8192`.
pub fn bend_to_semitones(value: u16, range_semitones: f32) -> f64 {
    let value = value.min(BEND_MAX) as f64;
    range_semitones as f64 * (value - BEND_CENTER as f64) / BEND_CENTER as f64
}

/// Frequency multiplier for a bend value: `2^(semitones / 12)`.
///
/// The center value yields exactly 1.0.
pub fn bend_to_scaler(value: u16, range_semitones: f32) -> f32 {
    2.0_f64.powf(bend_to_semitones(value, range_semitones) / 12.0) as f32
}

/// Decode one complete, framed MIDI message.
///
/// `bytes` must start with a status byte; short or unknown messages come back
/// as [`ControlMessage::Other`].
pub fn decode(bytes: &[u8]) -> ControlMessage {
    let Some(&status) = bytes.first() else {
        return ControlMessage::Other {
            status: 0,
            data: [0, 0],
            len: 0,
        };
    };

    let data1 = bytes.get(1).copied();
    let data2 = bytes.get(2).copied();
    let channel = status & midi::STATUS_CHANNEL_MASK;

    match (status & midi::STATUS_COMMAND_MASK, data1, data2) {
        (midi::STATUS_NOTE_OFF, Some(note), Some(velocity)) => ControlMessage::NoteOff {
            channel,
            note,
            velocity,
        },
        (midi::STATUS_NOTE_ON, Some(note), Some(velocity)) => ControlMessage::NoteOn {
            channel,
            note,
            velocity,
        },
        (midi::STATUS_PITCH_BEND, Some(lsb), Some(msb)) => ControlMessage::PitchBend {
            channel,
            value: ((msb as u16 & 0x7F) << 7) | (lsb as u16 & 0x7F),
        },
        (midi::STATUS_PROGRAM_CHANGE, Some(program), _) => {
            ControlMessage::ProgramChange { channel, program }
        }
        (midi::STATUS_CONTROL_CHANGE, Some(controller), Some(value)) => {
            ControlMessage::ControlChange {
                channel,
                controller,
                value,
            }
        }
        _ => ControlMessage::Other {
            status,
            data: [data1.unwrap_or(0), data2.unwrap_or(0)],
            len: bytes.len(),
        },
    }
}
