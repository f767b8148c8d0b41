//! Benchmarks for rendering many held voices through one cycle.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion};
use saavy_synth::engine::{EngineConfig, SynthCore};

use crate::BLOCK_SIZES;

const VOICE_COUNTS: &[u8] = &[1, 8, 32];

pub fn bench_polyphony(c: &mut Criterion) {
    let mut group = c.benchmark_group("scenarios/polyphony");

    for &frames in BLOCK_SIZES {
        for &voices in VOICE_COUNTS {
            let config = EngineConfig {
                frames_per_buffer: frames,
                ..EngineConfig::default()
            };
            let mut core = SynthCore::new(&config);
            // Held notes never finish, so nothing is reaped mid-benchmark.
            for note in 0..voices {
                core.apply_bytes(&[0x90, 36 + note, 100]);
            }

            let id = format!("{voices}_voices");
            group.bench_with_input(BenchmarkId::new(id, frames), &frames, |b, _| {
                b.iter(|| black_box(core.render().len()))
            });
        }

        // Chord held under a continuous pitch-bend sweep.
        let config = EngineConfig {
            frames_per_buffer: frames,
            ..EngineConfig::default()
        };
        let mut core = SynthCore::new(&config);
        core.apply_bytes(&[0x90, 48, 100, 55, 100, 60, 100, 64, 100]);
        let mut bend: u16 = 0;
        group.bench_with_input(BenchmarkId::new("chord_with_bend", frames), &frames, |b, _| {
            b.iter(|| {
                bend = (bend + 97) & 0x3FFF;
                core.apply_bytes(&[0xE0, (bend & 0x7F) as u8, (bend >> 7) as u8]);
                black_box(core.render().len())
            })
        });
    }

    group.finish();
}
