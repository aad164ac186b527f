//! Criterion benchmarks for the composite chains
//!
//! Measures:
//! - Mastering chain cost per preset
//! - FX suite cost with every stage enabled

use cadenza_benchmarks::stereo_block;
use cadenza_core::domain::dsp::Effect;
use cadenza_core::domain::mastering::{MasteringChain, MasteringPreset};
use cadenza_core::domain::suite::{FxSuite, SuiteState};
use cadenza_core::domain::ProcessSpec;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

const SAMPLE_RATE: u32 = 48000;
const BLOCK: usize = 512;

fn bench_mastering_presets(c: &mut Criterion) {
    let mut group = c.benchmark_group("mastering_preset");
    let spec = ProcessSpec::new(SAMPLE_RATE as f64, BLOCK, 2);

    for preset in MasteringPreset::ALL {
        let mut chain = MasteringChain::new();
        chain.apply_preset(preset);
        chain.prepare(&spec);
        let input = stereo_block(BLOCK, SAMPLE_RATE);
        let mut block = input.clone();

        group.bench_with_input(BenchmarkId::from_parameter(preset), &preset, |b, _| {
            b.iter(|| {
                block.copy_from(&input).ok();
                chain.process(black_box(&mut block)).ok();
            })
        });
    }

    group.finish();
}

fn bench_full_suite(c: &mut Criterion) {
    let spec = ProcessSpec::new(SAMPLE_RATE as f64, BLOCK, 2);
    let mut suite = FxSuite::new();
    suite.set_state(SuiteState {
        multiband: true,
        transient_shaper: true,
        deesser: true,
        saturation: true,
        stereo_widener: true,
        vocal_clone: true,
        space_reverb: true,
        limiter: true,
    });
    suite.prepare(&spec);
    let input = stereo_block(BLOCK, SAMPLE_RATE);
    let mut block = input.clone();

    c.bench_function("fx_suite_all_stages_512", |b| {
        b.iter(|| {
            block.copy_from(&input).ok();
            suite.process(black_box(&mut block)).ok();
        })
    });
}

criterion_group!(benches, bench_mastering_presets, bench_full_suite);
criterion_main!(benches);
