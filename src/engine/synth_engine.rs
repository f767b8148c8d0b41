use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::{
    engine::{
        config::EngineConfig,
        cycle::SynthCore,
        error::EngineError,
        input::{Clock, MidiInput, QueueSlot},
        observer::{EngineObserver, NoopObserver},
        queue::EventQueue,
    },
    io::sink::{AudioSink, SinkFactory},
    synth::factory::{ParityPrograms, ProgramMap},
};

/// Where the engine is in its lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineStatus {
    Stopped,
    Running,
    /// The last run ended with this error.
    Failed(EngineError),
}

/// Status shared with the synthesis thread, tagged with the run allowed to
/// write it. A run left behind by a timed-out `stop` no longer matches.
#[derive(Debug)]
struct Shared {
    run: Option<u64>,
    status: EngineStatus,
}

/// Handles owned by the caller for one run of the synthesis thread.
struct Run {
    handle: JoinHandle<Result<(), EngineError>>,
    exited: Receiver<()>,
    stop: Arc<AtomicBool>,
}

/// Realtime polyphonic synthesizer.
///
/// `start` spawns a dedicated synthesis thread and returns right away; MIDI
/// bytes go in through [`MidiInput`] handles; `stop` shuts the thread down
/// within a bounded time.
///
/// ```ignore
/// use saavy_synth::{engine::{EngineConfig, SynthEngine}, io::sink::CaptureSink};
///
/// let sink = CaptureSink::new();
/// let mut engine = SynthEngine::new(EngineConfig::default(), {
///     let sink = sink.clone();
///     move || Ok::<_, SinkError>(sink.clone())
/// })?;
/// engine.start()?;
/// engine.input().send_now(&[0x90, 60, 100])?;
/// engine.stop()?;
/// ```
pub struct SynthEngine<F: SinkFactory> {
    config: EngineConfig,
    factory: F,
    programs: Arc<dyn ProgramMap>,
    observer: Arc<dyn EngineObserver>,
    clock: Clock,
    slot: QueueSlot,
    shared: Arc<Mutex<Shared>>,
    next_run: u64,
    run: Option<Run>,
}

impl<F: SinkFactory> SynthEngine<F> {
    pub fn new(config: EngineConfig, factory: F) -> Result<Self, EngineError> {
        config.validate()?;

        Ok(Self {
            config,
            factory,
            programs: Arc::new(ParityPrograms),
            observer: Arc::new(NoopObserver),
            clock: Clock::new(),
            slot: Arc::new(RwLock::new(None)),
            shared: Arc::new(Mutex::new(Shared {
                run: None,
                status: EngineStatus::Stopped,
            })),
            next_run: 0,
            run: None,
        })
    }

    /// Use `programs` to pick waveforms from the next `start` on.
    pub fn with_programs(mut self, programs: impl ProgramMap + 'static) -> Self {
        self.programs = Arc::new(programs);
        self
    }

    pub fn with_observer(mut self, observer: impl EngineObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// A producer handle. Stays valid across restarts.
    pub fn input(&self) -> MidiInput {
        MidiInput::new(Arc::clone(&self.slot), self.clock, self.config.overflow_policy)
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn status(&self) -> EngineStatus {
        self.shared.lock().status.clone()
    }

    /// True while the synthesis thread is alive.
    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }

    /// Start synthesizing on a fresh thread, stopping any previous run first.
    ///
    /// Returns once the thread is spawned. Failures inside the loop, such as
    /// the sink failing to open, are reported through [`status`],
    /// [`EngineObserver::on_error`] and the result of [`stop`].
    ///
    /// [`status`]: SynthEngine::status
    /// [`stop`]: SynthEngine::stop
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.run.is_some() {
            if let Err(err) = self.stop() {
                warn!("previous synthesis run ended badly: {err}");
            }
        }

        let sink = self.factory.create_sink()?;
        let queue = Arc::new(EventQueue::new(self.config.queue_capacity));
        let stop = Arc::new(AtomicBool::new(false));
        let (exited_tx, exited_rx) = bounded::<()>(0);
        let run_id = self.next_run;
        self.next_run += 1;

        let synth_loop = SynthLoop {
            sink,
            core: SynthCore::with_programs(&self.config, Arc::clone(&self.programs)),
            queue: Arc::clone(&queue),
            stop: Arc::clone(&stop),
            clock: self.clock,
            observer: Arc::clone(&self.observer),
            shared: Arc::clone(&self.shared),
            run_id,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            _exited: exited_tx,
        };

        *self.slot.write() = Some(queue);
        {
            let mut shared = self.shared.lock();
            shared.run = Some(run_id);
            shared.status = EngineStatus::Running;
        }

        let spawned = thread::Builder::new()
            .name("saavy-synth".into())
            .spawn(move || synth_loop.run());

        match spawned {
            Ok(handle) => {
                self.run = Some(Run {
                    handle,
                    exited: exited_rx,
                    stop,
                });
                Ok(())
            }
            Err(err) => {
                *self.slot.write() = None;
                let err = EngineError::Spawn(err.to_string());
                let mut shared = self.shared.lock();
                shared.run = None;
                shared.status = EngineStatus::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Signal the loop to exit and wait up to `stop_timeout` for it.
    ///
    /// The queue and thread handles are released whether or not the thread
    /// made it out in time. Returns the loop's own failure if it had one, or
    /// [`EngineError::StopTimeout`] if it did not exit in time.
    pub fn stop(&mut self) -> Result<(), EngineError> {
        let Some(run) = self.run.take() else {
            return Ok(());
        };

        run.stop.store(true, Ordering::Release);
        // Wake the loop if it is parked waiting on the sink.
        run.handle.thread().unpark();
        *self.slot.write() = None;

        let timeout = self.config.stop_timeout;
        let outcome = match run.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match run.handle.join() {
                Ok(result) => result,
                Err(payload) => Err(EngineError::Panicked(panic_message(payload.as_ref()))),
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!("synthesis thread still running after {timeout:?}, detaching it");
                Err(EngineError::StopTimeout(timeout))
            }
        };

        // Retire the run so a detached thread cannot report into a later one.
        let mut shared = self.shared.lock();
        shared.run = None;
        match &outcome {
            Ok(()) | Err(EngineError::StopTimeout(_)) => {
                if !matches!(shared.status, EngineStatus::Failed(_)) {
                    shared.status = EngineStatus::Stopped;
                }
            }
            Err(err) => shared.status = EngineStatus::Failed(err.clone()),
        }
        drop(shared);

        outcome
    }
}

impl<F: SinkFactory> Drop for SynthEngine<F> {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!("synth engine stopped with error: {err}");
        }
    }
}

/// State moved onto the synthesis thread for one run.
struct SynthLoop<S: AudioSink> {
    sink: S,
    core: SynthCore,
    queue: Arc<EventQueue>,
    stop: Arc<AtomicBool>,
    clock: Clock,
    observer: Arc<dyn EngineObserver>,
    shared: Arc<Mutex<Shared>>,
    run_id: u64,
    sample_rate: u32,
    channels: u16,
    /// Dropped when the thread exits, which is what `stop` waits on.
    _exited: Sender<()>,
}

impl<S: AudioSink> SynthLoop<S> {
    fn run(mut self) -> Result<(), EngineError> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.cycle_until_stopped()))
            .unwrap_or_else(|payload| Err(EngineError::Panicked(panic_message(payload.as_ref()))));

        if self.is_current() {
            self.observer.on_loop_ended();
        }

        // The sink is stopped on every exit path, even after a panic.
        match panic::catch_unwind(AssertUnwindSafe(|| self.sink.stop())) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("failed to stop audio sink: {err}"),
            Err(payload) => warn!(
                "audio sink panicked while stopping: {}",
                panic_message(payload.as_ref())
            ),
        }

        match &result {
            Ok(()) => info!("synthesis loop stopped"),
            Err(err) => {
                let current = {
                    let mut shared = self.shared.lock();
                    let current = shared.run == Some(self.run_id);
                    if current {
                        shared.status = EngineStatus::Failed(err.clone());
                    }
                    current
                };

                if current {
                    error!("synthesis loop failed: {err}");
                    self.observer.on_error(err);
                } else {
                    warn!("detached synthesis run {} failed after stop: {err}", self.run_id);
                }
            }
        }

        result
    }

    /// True until `stop` retires this run.
    fn is_current(&self) -> bool {
        self.shared.lock().run == Some(self.run_id)
    }

    fn cycle_until_stopped(&mut self) -> Result<(), EngineError> {
        self.sink.start(self.sample_rate, self.channels)?;
        info!(
            "synthesis loop running at {} Hz, {} frames per buffer",
            self.sample_rate,
            self.core.frames_per_buffer()
        );
        self.observer.on_loop_started();

        let frames = self.core.frames_per_buffer();
        while !self.stop.load(Ordering::Acquire) {
            let now = self.clock.now_nanos();
            self.core.process_due(&self.queue, now);
            self.core.render();
            self.sink.write(self.core.buffer())?;
            self.observer
                .on_buffer_completed(frames, self.core.voices().active_count());
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
