//! Timestamp-ordered event queue shared between MIDI producers and the
//! synthesis thread.

use std::{
    cmp::Ordering,
    collections::BinaryHeap,
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
};

use log::warn;
use parking_lot::Mutex;

use crate::engine::{config::OverflowPolicy, error::QueueFull};

/// Bytes most channel messages need; pooled events start with this much room.
const EVENT_INLINE_BYTES: usize = 3;

/// A raw, timestamped MIDI packet waiting to be played.
///
/// Events are pooled: once consumed, hand them back with
/// [`EventQueue::recycle`] so their byte buffers get reused.
#[derive(Debug)]
pub struct Event {
    timestamp: u64,
    data: Vec<u8>,
}

impl Event {
    fn empty() -> Self {
        Self {
            timestamp: 0,
            data: Vec::with_capacity(EVENT_INLINE_BYTES),
        }
    }

    /// Due time, in engine-clock nanoseconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Heap entry: earliest timestamp first, insertion order breaks ties.
struct Pending {
    timestamp: u64,
    seq: u64,
    event: Event,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap (a max-heap) pops the earliest event.
        (other.timestamp, other.seq).cmp(&(self.timestamp, self.seq))
    }
}

struct QueueInner {
    pending: BinaryHeap<Pending>,
    pool: Vec<Event>,
    next_seq: u64,
}

/// Bounded, thread-safe queue of pending events.
///
/// Any number of threads may enqueue; one consumer drains. Storage is
/// allocated up front, so steady-state operation never allocates unless a
/// packet is longer than any seen before.
pub struct EventQueue {
    inner: Mutex<QueueInner>,
    capacity: usize,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let pool = (0..capacity).map(|_| Event::empty()).collect();

        Self {
            inner: Mutex::new(QueueInner {
                pending: BinaryHeap::with_capacity(capacity),
                pool,
                next_seq: 0,
            }),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Add an event, failing with [`QueueFull`] if there is no room.
    pub fn try_enqueue(&self, timestamp: u64, data: &[u8]) -> Result<(), QueueFull> {
        let mut inner = self.inner.lock();
        if inner.pending.len() >= self.capacity {
            return Err(QueueFull {
                capacity: self.capacity,
            });
        }
        Self::push(&mut inner, timestamp, data);
        Ok(())
    }

    /// Add an event, resolving a full queue with `policy`.
    ///
    /// Either way a discarded event is counted in [`dropped`]. With
    /// [`OverflowPolicy::DropNewest`] the caller still sees the `QueueFull`.
    ///
    /// [`dropped`]: EventQueue::dropped
    pub fn enqueue(
        &self,
        timestamp: u64,
        data: &[u8],
        policy: OverflowPolicy,
    ) -> Result<(), QueueFull> {
        let mut inner = self.inner.lock();

        if inner.pending.len() >= self.capacity {
            self.dropped.fetch_add(1, AtomicOrdering::Relaxed);
            match policy {
                OverflowPolicy::DropNewest => {
                    warn!("event queue full, dropping incoming event at t={timestamp}");
                    return Err(QueueFull {
                        capacity: self.capacity,
                    });
                }
                OverflowPolicy::DropOldest => {
                    if let Some(evicted) = inner.pending.pop() {
                        warn!(
                            "event queue full, dropping oldest event at t={}",
                            evicted.timestamp
                        );
                        inner.pool.push(evicted.event);
                    }
                }
            }
        }

        Self::push(&mut inner, timestamp, data);
        Ok(())
    }

    fn push(inner: &mut QueueInner, timestamp: u64, data: &[u8]) {
        let mut event = inner.pool.pop().unwrap_or_else(Event::empty);
        event.timestamp = timestamp;
        event.data.clear();
        event.data.extend_from_slice(data);

        let seq = inner.next_seq;
        inner.next_seq = inner.next_seq.wrapping_add(1);
        inner.pending.push(Pending {
            timestamp,
            seq,
            event,
        });
    }

    /// Remove and return the earliest event if it is due at or before `now`.
    pub fn pop_due(&self, now: u64) -> Option<Event> {
        let mut inner = self.inner.lock();
        let due = inner
            .pending
            .peek()
            .is_some_and(|next| next.timestamp <= now);
        if due {
            inner.pending.pop().map(|p| p.event)
        } else {
            None
        }
    }

    /// Hand a consumed event back to the pool.
    pub fn recycle(&self, event: Event) {
        let mut inner = self.inner.lock();
        if inner.pool.len() < self.capacity {
            inner.pool.push(event);
        }
    }

    /// Move every event due at or before `now` into `out`, in timestamp
    /// order. Returns how many were moved.
    pub fn drain_due_by(&self, now: u64, out: &mut Vec<Event>) -> usize {
        let mut inner = self.inner.lock();
        let start = out.len();
        while inner
            .pending
            .peek()
            .is_some_and(|next| next.timestamp <= now)
        {
            if let Some(pending) = inner.pending.pop() {
                out.push(pending.event);
            }
        }
        out.len() - start
    }

    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(AtomicOrdering::Relaxed)
    }

    /// Events sitting in the reuse pool.
    pub fn pooled(&self) -> usize {
        self.inner.lock().pool.len()
    }
}
