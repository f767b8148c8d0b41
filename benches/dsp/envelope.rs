//! Benchmarks for the ADSR envelope generator.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_synth::dsp::envelope::{Envelope, EnvelopeShape};

use crate::BLOCK_SIZES;

pub fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsp/envelope");

    for &size in BLOCK_SIZES {
        let mut buffer = vec![0.0f32; size];

        // Attack phase (ramping up)
        let mut env = Envelope::new(EnvelopeShape::adsr(10.0, 0.1, 0.7, 0.3), 48_000.0);
        env.note_on();
        group.bench_with_input(BenchmarkId::new("attack", size), &size, |b, _| {
            b.iter(|| {
                for sample in buffer.iter_mut() {
                    *sample = black_box(env.next_sample());
                }
            })
        });

        // Sustain phase (holding steady)
        let mut env = Envelope::new(EnvelopeShape::adsr(0.001, 0.001, 0.7, 0.3), 48_000.0);
        env.note_on();
        for _ in 0..200 {
            env.next_sample();
        }
        group.bench_with_input(BenchmarkId::new("sustain", size), &size, |b, _| {
            b.iter(|| {
                for sample in buffer.iter_mut() {
                    *sample = black_box(env.next_sample());
                }
            })
        });
    }

    group.finish();
}
