//! Benchmarks for event queue traffic between producers and the cycle.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_synth::engine::{queue::EventQueue, OverflowPolicy};

const BURSTS: &[usize] = &[1, 16, 128];

pub fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/queue");
    let queue = EventQueue::new(1024);

    for &burst in BURSTS {
        group.bench_with_input(BenchmarkId::new("enqueue_drain", burst), &burst, |b, &burst| {
            b.iter(|| {
                for i in 0..burst {
                    let note = (i % 128) as u8;
                    let _ = queue.enqueue(i as u64, &[0x90, note, 100], OverflowPolicy::DropOldest);
                }
                let mut drained = 0;
                while let Some(event) = queue.pop_due(black_box(u64::MAX)) {
                    drained += event.data().len();
                    queue.recycle(event);
                }
                black_box(drained)
            })
        });
    }

    group.finish();
}
