// Performance benchmarks for track chains and the session processor
//
// Run with: cargo bench --bench chain_bench

use cadenza_core::domain::chain::{ChainSlot, EffectMode, TrackChainManager};
use cadenza_core::domain::config::EffectKind;
use cadenza_core::domain::processor::{SessionProcessor, Transport};
use cadenza_core::domain::{AudioBuffer, ProcessSpec};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

const SAMPLE_RATE: f64 = 48000.0;

fn sine_block(frames: usize) -> AudioBuffer {
    let signal: Vec<f32> = (0..frames)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / SAMPLE_RATE as f32).sin())
        .collect();
    AudioBuffer::from_channels(vec![signal.clone(), signal])
}

fn bench_track_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("track_mode");
    let spec = ProcessSpec::new(SAMPLE_RATE, 512, 2);

    for mode in [EffectMode::Off, EffectMode::Dsp, EffectMode::Hybrid] {
        let mut chains = TrackChainManager::new(spec);
        chains.prepare(&spec);
        for kind in [EffectKind::Equalizer, EffectKind::Compressor, EffectKind::Limiter] {
            chains.add_effect(0, ChainSlot::Dsp, kind.build());
        }
        chains.set_mode(0, mode);
        let input = sine_block(512);
        let mut block = input.clone();

        group.bench_with_input(BenchmarkId::from_parameter(format!("{:?}", mode)), &mode, |b, _| {
            b.iter(|| {
                block.copy_from(&input).ok();
                chains.process(black_box(&mut block), 0);
            });
        });
    }

    group.finish();
}

fn bench_session_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_block");

    for block_size in [64, 256, 512, 1024] {
        let spec = ProcessSpec::new(SAMPLE_RATE, block_size, 2);
        let (mut session, _controller) = SessionProcessor::new(spec);
        if session.prepare(&spec).is_err() {
            continue;
        }
        session.chains_mut().add_dsp_effect(0, EffectKind::DeEsser.build());
        session.chains_mut().set_mode(0, EffectMode::Dsp);
        let input = sine_block(block_size);
        let mut block = input.clone();

        group.bench_with_input(BenchmarkId::from_parameter(block_size), &block_size, |b, _| {
            b.iter(|| {
                block.copy_from(&input).ok();
                session
                    .process_block(black_box(&mut block), Transport::default())
                    .ok();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_track_modes, bench_session_block);
criterion_main!(benches);
