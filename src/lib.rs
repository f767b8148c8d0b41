pub mod dsp;
pub mod engine; // Realtime loop, event queue and lifecycle
pub mod io;
pub mod synth; // Voice management and polyphony
