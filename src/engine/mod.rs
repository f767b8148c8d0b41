// Purpose: the realtime engine - event queue, synthesis cycle, thread lifecycle
// This layer sits above synth and owns the only cross-thread boundary

pub mod config;
pub mod cycle;
pub mod error;
pub mod input;
pub mod observer;
pub mod queue;
pub mod synth_engine;

pub use config::{EngineConfig, OverflowPolicy};
pub use cycle::SynthCore;
pub use error::{EngineError, IngestError, QueueFull, SinkError};
pub use input::{Clock, MidiInput};
pub use observer::EngineObserver;
pub use synth_engine::{EngineStatus, SynthEngine};
