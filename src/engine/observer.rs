use crate::engine::error::EngineError;

/// Hooks called from the synthesis thread.
///
/// Every method defaults to doing nothing. Implementations run on the
/// realtime thread and must return quickly.
pub trait EngineObserver: Send + Sync {
    /// The sink is started and the first cycle is about to run.
    fn on_loop_started(&self) {}

    /// One buffer has been handed to the sink.
    fn on_buffer_completed(&self, _frames: usize, _active_voices: usize) {}

    /// The loop has exited, for any reason. The sink is stopped right after.
    fn on_loop_ended(&self) {}

    /// The loop is terminating because of `error`.
    fn on_error(&self, _error: &EngineError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

impl<T: EngineObserver + ?Sized> EngineObserver for std::sync::Arc<T> {
    fn on_loop_started(&self) {
        (**self).on_loop_started()
    }

    fn on_buffer_completed(&self, frames: usize, active_voices: usize) {
        (**self).on_buffer_completed(frames, active_voices)
    }

    fn on_loop_ended(&self) {
        (**self).on_loop_ended()
    }

    fn on_error(&self, error: &EngineError) {
        (**self).on_error(error)
    }
}
