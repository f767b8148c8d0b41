use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::RwLock;

use crate::{
    engine::{
        config::OverflowPolicy,
        error::IngestError,
        queue::EventQueue,
    },
    io::midi::is_all_active_sensing,
};

/// Monotonic engine clock. Timestamps are nanoseconds since the engine was
/// created, so producers and the synthesis thread agree on "now".
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    /// Timestamp `delay` from now, saturating at `u64::MAX`.
    pub fn nanos_after(&self, delay: Duration) -> u64 {
        let delay = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        self.now_nanos().saturating_add(delay)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot holding the queue of the current run, empty while stopped.
pub(crate) type QueueSlot = Arc<RwLock<Option<Arc<EventQueue>>>>;

/// Producer-side handle for feeding MIDI bytes to a running engine.
///
/// Cheap to clone; any number of threads may hold one. Sends made while the
/// engine is stopped fail with [`IngestError::NotRunning`].
#[derive(Clone)]
pub struct MidiInput {
    slot: QueueSlot,
    clock: Clock,
    policy: OverflowPolicy,
}

impl MidiInput {
    pub(crate) fn new(slot: QueueSlot, clock: Clock, policy: OverflowPolicy) -> Self {
        Self {
            slot,
            clock,
            policy,
        }
    }

    /// Queue raw MIDI bytes (one or more messages) to play at `timestamp`.
    ///
    /// Packets made only of active-sensing keep-alives are dropped here.
    pub fn send(&self, data: &[u8], timestamp: u64) -> Result<(), IngestError> {
        if is_all_active_sensing(data) {
            return Ok(());
        }

        let slot = self.slot.read();
        let queue = slot.as_ref().ok_or(IngestError::NotRunning)?;
        queue.enqueue(timestamp, data, self.policy)?;
        Ok(())
    }

    /// Queue raw MIDI bytes to play as soon as possible.
    pub fn send_now(&self, data: &[u8]) -> Result<(), IngestError> {
        self.send(data, self.clock.now_nanos())
    }

    pub fn now_nanos(&self) -> u64 {
        self.clock.now_nanos()
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Events the current run's queue has discarded on overflow.
    pub fn dropped(&self) -> u64 {
        self.slot.read().as_ref().map_or(0, |queue| queue.dropped())
    }

    pub fn is_connected(&self) -> bool {
        self.slot.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_with_queue(capacity: usize, policy: OverflowPolicy) -> (MidiInput, Arc<EventQueue>) {
        let queue = Arc::new(EventQueue::new(capacity));
        let slot: QueueSlot = Arc::new(RwLock::new(Some(Arc::clone(&queue))));
        (MidiInput::new(slot, Clock::new(), policy), queue)
    }

    #[test]
    fn active_sensing_never_reaches_the_queue() {
        let (input, queue) = input_with_queue(8, OverflowPolicy::DropOldest);
        input.send(&[0xFE], 0).unwrap();
        input.send(&[0xFE, 0xFE, 0xFE], 0).unwrap();
        assert!(queue.is_empty());

        input.send(&[0xFE, 0x90, 60, 100], 0).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn stopped_engine_rejects_sends() {
        let slot: QueueSlot = Arc::new(RwLock::new(None));
        let input = MidiInput::new(slot, Clock::new(), OverflowPolicy::DropOldest);
        assert_eq!(input.send_now(&[0x90, 60, 100]), Err(IngestError::NotRunning));
        assert!(!input.is_connected());
    }

    #[test]
    fn overflow_surfaces_with_drop_newest() {
        let (input, _queue) = input_with_queue(1, OverflowPolicy::DropNewest);
        input.send(&[0x90, 60, 100], 1).unwrap();
        assert!(matches!(
            input.send(&[0x90, 61, 100], 2),
            Err(IngestError::QueueFull(_))
        ));
        assert_eq!(input.dropped(), 1);
    }

    #[test]
    fn clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now_nanos();
        let b = clock.now_nanos();
        assert!(b >= a);
        assert!(clock.nanos_after(Duration::from_millis(10)) >= b + 10_000_000);
    }

    #[test]
    fn far_future_delays_saturate() {
        let clock = Clock::new();
        assert_eq!(clock.nanos_after(Duration::MAX), u64::MAX);
        assert_eq!(clock.nanos_after(Duration::from_nanos(u64::MAX)), u64::MAX);
    }
}
