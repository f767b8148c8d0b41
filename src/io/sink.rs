use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::engine::error::SinkError;

/// Destination for rendered audio.
///
/// The synthesis thread calls `start` once, `write` once per buffer and
/// `stop` on the way out no matter how the loop ended. `write` may block
/// until the device has room; that is the loop's only suspension point.
pub trait AudioSink: Send {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<(), SinkError>;

    /// Queue one interleaved buffer for playback.
    fn write(&mut self, buffer: &[f32]) -> Result<(), SinkError>;

    fn stop(&mut self) -> Result<(), SinkError>;
}

/// Builds a fresh sink for every engine run.
pub trait SinkFactory {
    type Sink: AudioSink + 'static;

    fn create_sink(&mut self) -> Result<Self::Sink, SinkError>;
}

impl<F, S> SinkFactory for F
where
    F: FnMut() -> Result<S, SinkError>,
    S: AudioSink + 'static,
{
    type Sink = S;

    fn create_sink(&mut self) -> Result<Self::Sink, SinkError> {
        self()
    }
}

#[derive(Default)]
struct Capture {
    buffers: Mutex<Vec<Vec<f32>>>,
    running: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Sink that records every buffer in memory.
///
/// Clones share the same recording, so keep one clone to inspect what an
/// engine run produced. With [`paced`](CaptureSink::paced) each write waits
/// out one buffer period, standing in for a device's backpressure.
#[derive(Clone, Default)]
pub struct CaptureSink {
    capture: Arc<Capture>,
    paced: bool,
    sample_rate: u32,
    channels: u16,
    next_deadline: Option<Instant>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }

    /// Copy of everything written so far.
    pub fn buffers(&self) -> Vec<Vec<f32>> {
        self.capture.buffers.lock().clone()
    }

    pub fn buffer_count(&self) -> usize {
        self.capture.buffers.lock().len()
    }

    pub fn is_running(&self) -> bool {
        self.capture.running.load(Ordering::Acquire)
    }

    pub fn start_count(&self) -> usize {
        self.capture.starts.load(Ordering::Acquire)
    }

    pub fn stop_count(&self) -> usize {
        self.capture.stops.load(Ordering::Acquire)
    }

    fn buffer_period(&self, samples: usize) -> Duration {
        let frames = samples / self.channels.max(1) as usize;
        Duration::from_nanos(frames as u64 * 1_000_000_000 / self.sample_rate.max(1) as u64)
    }
}

impl AudioSink for CaptureSink {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<(), SinkError> {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.next_deadline = None;
        self.capture.running.store(true, Ordering::Release);
        self.capture.starts.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn write(&mut self, buffer: &[f32]) -> Result<(), SinkError> {
        if !self.is_running() {
            return Err(SinkError::NotStarted);
        }

        self.capture.buffers.lock().push(buffer.to_vec());

        if self.paced {
            let period = self.buffer_period(buffer.len());
            let deadline = self.next_deadline.unwrap_or_else(Instant::now) + period;
            if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                thread::sleep(wait);
            }
            self.next_deadline = Some(deadline);
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.capture.running.store(false, Ordering::Release);
        self.capture.stops.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
