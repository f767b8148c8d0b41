/// Coarse classification of a [`ControlMessage`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    NoteOn,
    NoteOff,
    PitchBend,
    ProgramChange,
    ControlChange,
    Other,
}

/// One complete, decoded control message.
///
/// Values are plain data and never change after decoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// 14-bit bend, 0..=16383, centered on 8192.
    PitchBend { channel: u8, value: u16 },
    ProgramChange { channel: u8, program: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Anything the synth does not act on. Keeps the status byte, up to two
    /// data bytes and the original length for diagnostics.
    Other { status: u8, data: [u8; 2], len: usize },
}

impl ControlMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ControlMessage::NoteOn { .. } => MessageKind::NoteOn,
            ControlMessage::NoteOff { .. } => MessageKind::NoteOff,
            ControlMessage::PitchBend { .. } => MessageKind::PitchBend,
            ControlMessage::ProgramChange { .. } => MessageKind::ProgramChange,
            ControlMessage::ControlChange { .. } => MessageKind::ControlChange,
            ControlMessage::Other { .. } => MessageKind::Other,
        }
    }

    /// Channel for channel-voice messages, `None` for system messages.
    pub fn channel(&self) -> Option<u8> {
        match *self {
            ControlMessage::NoteOn { channel, .. }
            | ControlMessage::NoteOff { channel, .. }
            | ControlMessage::PitchBend { channel, .. }
            | ControlMessage::ProgramChange { channel, .. }
            | ControlMessage::ControlChange { channel, .. } => Some(channel),
            ControlMessage::Other { .. } => None,
        }
    }
}
