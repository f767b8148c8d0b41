// Purpose: Voice management, polyphony, MIDI message handling
// This layer sits above the DSP primitives and manages multiple voices

pub mod factory;
pub mod message;
pub mod poly;
pub mod voice;
