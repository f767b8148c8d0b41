//! Scenario benchmarks: whole synthesis cycles the way the engine runs them.

mod polyphony;
mod queue;

pub use polyphony::bench_polyphony;
pub use queue::bench_queue;
