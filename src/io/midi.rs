//! MIDI wire constants and the byte-stream framer.

use crate::{io::converter, synth::message::ControlMessage};

pub const STATUS_COMMAND_MASK: u8 = 0xF0;
pub const STATUS_CHANNEL_MASK: u8 = 0x0F;

pub const STATUS_NOTE_OFF: u8 = 0x80;
pub const STATUS_NOTE_ON: u8 = 0x90;
pub const STATUS_POLYPHONIC_AFTERTOUCH: u8 = 0xA0;
pub const STATUS_CONTROL_CHANGE: u8 = 0xB0;
pub const STATUS_PROGRAM_CHANGE: u8 = 0xC0;
pub const STATUS_CHANNEL_PRESSURE: u8 = 0xD0;
pub const STATUS_PITCH_BEND: u8 = 0xE0;

pub const STATUS_SYSTEM_EXCLUSIVE: u8 = 0xF0;
pub const STATUS_END_SYSEX: u8 = 0xF7;
pub const STATUS_TIMING_CLOCK: u8 = 0xF8;
pub const STATUS_ACTIVE_SENSING: u8 = 0xFE;

pub const CC_ALL_SOUND_OFF: u8 = 120;
pub const CC_RESET_ALL_CONTROLLERS: u8 = 121;
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// True when every byte in `data` is an active-sensing keep-alive.
///
/// Such packets carry nothing musical; ingestion drops them before they
/// reach the event queue. An empty packet counts as keep-alive only.
pub fn is_all_active_sensing(data: &[u8]) -> bool {
    data.iter().all(|&b| b == STATUS_ACTIVE_SENSING)
}

/// Total length in bytes (status included) of a message with this status.
pub fn message_len(status: u8) -> usize {
    match status {
        0x80..=0xBF | 0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        0xF1 | 0xF3 => 2,
        0xF2 => 3,
        _ => 1,
    }
}

#[inline]
fn is_status(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// Splits a raw MIDI byte stream into complete messages.
///
/// Handles running status, interleaved real-time bytes and SysEx. Bytes may
/// arrive in arbitrary fragments; state carries across calls to [`feed`]
/// until [`reset`] marks the end of a self-contained packet.
///
/// [`feed`]: MidiFramer::feed
/// [`reset`]: MidiFramer::reset
#[derive(Debug, Default)]
pub struct MidiFramer {
    buffer: [u8; 3],
    count: usize,
    needed: usize,
    running_status: Option<u8>,
    sysex: Option<SysexState>,
}

#[derive(Debug, Default)]
struct SysexState {
    head: [u8; 2],
    len: usize,
}

impl MidiFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push raw bytes and emit every message they complete.
    pub fn feed(&mut self, bytes: &[u8], mut emit: impl FnMut(ControlMessage)) {
        for &byte in bytes {
            self.push(byte, &mut emit);
        }
    }

    /// Forget running status and drop any partial message or SysEx.
    pub fn reset(&mut self) {
        self.count = 0;
        self.needed = 0;
        self.running_status = None;
        self.sysex = None;
    }

    fn push(&mut self, byte: u8, emit: &mut impl FnMut(ControlMessage)) {
        if byte >= STATUS_TIMING_CLOCK {
            // Real-time bytes may land anywhere, even inside another message.
            emit(converter::decode(&[byte]));
            return;
        }

        if let Some(sysex) = self.sysex.as_mut() {
            if !is_status(byte) {
                if sysex.len < 3 {
                    sysex.head[sysex.len - 1] = byte;
                }
                sysex.len += 1;
                return;
            }

            self.finish_sysex(byte == STATUS_END_SYSEX, emit);
            if byte == STATUS_END_SYSEX {
                return;
            }
        }

        if is_status(byte) {
            self.start_message(byte, emit);
            return;
        }

        if self.count > 0 {
            self.buffer[self.count] = byte;
            self.count += 1;
        } else if let Some(status) = self.running_status {
            self.buffer[0] = status;
            self.buffer[1] = byte;
            self.count = 2;
            self.needed = message_len(status);
        } else {
            // Data byte with nothing to attach it to.
            return;
        }

        if self.count == self.needed {
            emit(converter::decode(&self.buffer[..self.count]));
            self.count = 0;
        }
    }

    fn start_message(&mut self, status: u8, emit: &mut impl FnMut(ControlMessage)) {
        if status == STATUS_SYSTEM_EXCLUSIVE {
            self.running_status = None;
            self.count = 0;
            self.sysex = Some(SysexState { head: [0, 0], len: 1 });
            return;
        }

        // Only channel messages establish running status; system common
        // messages cancel it.
        self.running_status = (status < STATUS_SYSTEM_EXCLUSIVE).then_some(status);

        let len = message_len(status);
        if len == 1 {
            self.count = 0;
            emit(converter::decode(&[status]));
            return;
        }

        self.buffer[0] = status;
        self.count = 1;
        self.needed = len;
    }

    fn finish_sysex(&mut self, terminated: bool, emit: &mut impl FnMut(ControlMessage)) {
        if let Some(sysex) = self.sysex.take() {
            let len = sysex.len + usize::from(terminated);
            emit(ControlMessage::Other {
                status: STATUS_SYSTEM_EXCLUSIVE,
                data: sysex.head,
                len,
            });
        }
    }
}
