//! saavy-synth - play a short phrase through the realtime synth engine
//!
//! Run with: cargo run -- --program 1 --note-ms 250

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    sync::Arc,
    thread,
    time::Duration,
};

use clap::Parser;
use color_eyre::eyre::{Result as EyreResult, WrapErr};
use log::info;

use saavy_synth::{
    dsp::EnvelopeShape,
    engine::{EngineConfig, EngineObserver, MidiInput, SinkError, SynthEngine},
    io::cpal_sink::CpalSink,
};

#[derive(Parser, Debug)]
#[command(name = "saavy-synth", about = "Play a scripted phrase on the default output device")]
struct Args {
    /// Program number; odd plays sine voices, even plays sawtooth voices
    #[arg(long, default_value_t = 0)]
    program: u8,

    /// Length of each note in milliseconds
    #[arg(long, default_value_t = 200)]
    note_ms: u64,

    /// Pitch-bend range in semitones
    #[arg(long, default_value_t = 2.0)]
    bend_range: f32,

    /// Gain applied to each voice
    #[arg(long, default_value_t = 0.25)]
    gain: f32,

    /// Release time in seconds
    #[arg(long, default_value_t = 0.3)]
    release: f32,

    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,

    #[arg(long, default_value_t = 240)]
    frames: usize,
}

/// Counts buffers and tracks peak polyphony for the summary line.
#[derive(Default)]
struct Meter {
    buffers: AtomicUsize,
    peak_voices: AtomicUsize,
}

impl EngineObserver for Meter {
    fn on_buffer_completed(&self, _frames: usize, active_voices: usize) {
        self.buffers.fetch_add(1, Ordering::Relaxed);
        self.peak_voices.fetch_max(active_voices, Ordering::Relaxed);
    }
}

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = EngineConfig {
        sample_rate: args.sample_rate,
        frames_per_buffer: args.frames,
        bend_range_semitones: args.bend_range,
        voice_gain: args.gain,
        envelope: EnvelopeShape::adsr(0.01, 0.1, 0.7, args.release),
        ..EngineConfig::default()
    };

    let meter = Arc::new(Meter::default());
    let mut engine = SynthEngine::new(config, || Ok::<_, SinkError>(CpalSink::new()))
        .wrap_err("invalid engine configuration")?
        .with_observer(Arc::clone(&meter));

    engine.start().wrap_err("failed to start synth engine")?;

    let input = engine.input();
    let total = schedule_phrase(&input, args.program, Duration::from_millis(args.note_ms))
        .wrap_err("failed to queue phrase")?;

    println!("=== saavy-synth ===");
    println!("Program: {}", args.program);
    println!("Playing for {:.2}s...", total.as_secs_f32());

    thread::sleep(total + Duration::from_secs_f32(args.release) + Duration::from_millis(100));
    engine.stop().wrap_err("synth engine reported an error")?;

    info!(
        "rendered {} buffers, peak polyphony {}",
        meter.buffers.load(Ordering::Relaxed),
        meter.peak_voices.load(Ordering::Relaxed)
    );
    Ok(())
}

/// Queue an arpeggio, a held chord with a pitch-bend sweep, then release.
/// Returns how long the phrase runs.
fn schedule_phrase(input: &MidiInput, program: u8, step: Duration) -> EyreResult<Duration> {
    let start = input.now_nanos() + 50_000_000;
    let at = |offset: Duration| start + offset.as_nanos() as u64;

    input.send(&[0xC0, program], start)?;

    let arpeggio = [60u8, 64, 67, 72];
    for (i, &note) in arpeggio.iter().enumerate() {
        let on = step * i as u32;
        input.send(&[0x90, note, 100], at(on))?;
        input.send(&[0x80, note, 0], at(on + step))?;
    }

    let chord_at = step * arpeggio.len() as u32;
    input.send(&[0x90, 48, 90, 55, 90, 64, 90], at(chord_at))?;

    // Sweep the bend up to the top of its range and back to center.
    let sweep_steps = 16u32;
    for i in 0..=sweep_steps * 2 {
        let t = if i <= sweep_steps { i } else { sweep_steps * 2 - i };
        let value = 8192 + (8191 * t / sweep_steps) as u16;
        let offset = chord_at + step * 2 * i / (sweep_steps * 2);
        input.send(&[0xE0, (value & 0x7F) as u8, (value >> 7) as u8], at(offset))?;
    }

    let release_at = chord_at + step * 3;
    input.send(&[0xB0, 123, 0], at(release_at))?;

    Ok(release_at + Duration::from_millis(50))
}
