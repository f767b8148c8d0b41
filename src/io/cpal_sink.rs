//! Audio sink backed by the system's default output device.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Sender};
use log::{error, info};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::{engine::error::SinkError, io::sink::AudioSink};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Plays buffers on the default `cpal` output device.
///
/// The synthesis thread writes into a lock-free ring buffer; the device
/// callback drains it. A full ring makes `write` wait, which paces the loop
/// to the device clock. The `cpal` stream lives on its own keeper thread
/// because streams cannot move between threads on every platform.
pub struct CpalSink {
    latency: Duration,
    write_timeout: Duration,
    producer: Option<Producer<f32>>,
    shutdown: Option<Sender<()>>,
    keeper: Option<JoinHandle<()>>,
    failed: Arc<AtomicBool>,
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(20),
            write_timeout: Duration::from_millis(250),
            producer: None,
            shutdown: None,
            keeper: None,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// How much audio may sit in the ring buffer ahead of the device.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Longest a single `write` may wait for room before giving up.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for CpalSink {
    fn start(&mut self, sample_rate: u32, channels: u16) -> Result<(), SinkError> {
        self.stop()?;
        self.failed.store(false, Ordering::Release);

        let frames = (self.latency.as_secs_f64() * sample_rate as f64).ceil() as usize;
        let capacity = frames.max(64) * channels.max(1) as usize;
        let (producer, consumer) = RingBuffer::<f32>::new(capacity);

        let (ready_tx, ready_rx) = bounded::<Result<(), SinkError>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let failed = Arc::clone(&self.failed);

        let keeper = thread::Builder::new()
            .name("saavy-audio-out".into())
            .spawn(move || {
                let stream = match open_stream(sample_rate, channels, consumer, failed) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Park here until the sink drops its end of the channel.
                let _ = shutdown_rx.recv();
                drop(stream);
            })
            .map_err(|err| SinkError::Stream(err.to_string()))?;

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = keeper.join();
                return Err(err);
            }
            Err(_) => {
                drop(shutdown_tx);
                return Err(SinkError::Stream("output stream did not start in time".into()));
            }
        }

        info!("audio output running at {sample_rate} Hz, {channels} channels");
        self.producer = Some(producer);
        self.shutdown = Some(shutdown_tx);
        self.keeper = Some(keeper);
        Ok(())
    }

    fn write(&mut self, buffer: &[f32]) -> Result<(), SinkError> {
        let producer = self.producer.as_mut().ok_or(SinkError::NotStarted)?;
        let deadline = Instant::now() + self.write_timeout;
        let mut written = 0;

        while written < buffer.len() {
            if self.failed.load(Ordering::Acquire) {
                return Err(SinkError::Stream("output stream reported an error".into()));
            }

            let free = producer.slots();
            if free == 0 {
                if Instant::now() >= deadline {
                    return Err(SinkError::WriteTimeout(self.write_timeout));
                }
                // Woken early by unpark() when the engine is stopping.
                thread::park_timeout(Duration::from_millis(1));
                continue;
            }

            let n = free.min(buffer.len() - written);
            let chunk = producer
                .write_chunk_uninit(n)
                .map_err(|err| SinkError::Other(err.to_string()))?;
            chunk.fill_from_iter(buffer[written..written + n].iter().copied());
            written += n;
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.producer = None;
        self.shutdown = None;

        if let Some(keeper) = self.keeper.take() {
            keeper
                .join()
                .map_err(|_| SinkError::Other("audio keeper thread panicked".into()))?;
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("failed to stop audio output: {err}");
        }
    }
}

fn open_stream(
    sample_rate: u32,
    channels: u16,
    mut consumer: Consumer<f32>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream, SinkError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(SinkError::NoDevice)?;

    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let available = consumer.slots().min(data.len());
                let (ready, underrun) = data.split_at_mut(available);

                match consumer.read_chunk(available) {
                    Ok(chunk) => {
                        let (first, second) = chunk.as_slices();
                        ready[..first.len()].copy_from_slice(first);
                        ready[first.len()..].copy_from_slice(second);
                        chunk.commit_all();
                    }
                    Err(_) => ready.fill(0.0),
                }

                underrun.fill(0.0);
            },
            move |err| {
                error!("audio output stream error: {err}");
                failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|err| SinkError::Stream(err.to_string()))?;

    stream
        .play()
        .map_err(|err| SinkError::Stream(err.to_string()))?;

    Ok(stream)
}
