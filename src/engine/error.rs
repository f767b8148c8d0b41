use std::time::Duration;

use thiserror::Error;

/// Failures reported by an audio sink.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SinkError {
    #[error("no output device available")]
    NoDevice,
    #[error("output stream error: {0}")]
    Stream(String),
    #[error("audio write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("audio sink is not started")]
    NotStarted,
    #[error("{0}")]
    Other(String),
}

/// Failures of the synthesis engine as a whole.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid engine config: {0}")]
    Config(String),
    #[error("audio sink failed: {0}")]
    Sink(#[from] SinkError),
    #[error("synthesis loop panicked: {0}")]
    Panicked(String),
    #[error("failed to spawn synthesis thread: {0}")]
    Spawn(String),
    #[error("synthesis thread did not stop within {0:?}; resources released anyway")]
    StopTimeout(Duration),
}

/// The event queue had no room for another event.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("event queue is full ({capacity} events)")]
pub struct QueueFull {
    pub capacity: usize,
}

/// Why a message could not be handed to the engine.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("synth engine is not running")]
    NotRunning,
    #[error(transparent)]
    QueueFull(#[from] QueueFull),
}
