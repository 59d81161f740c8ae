//! Benchmarks for the host reference transform and filter.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sdft_filter::synth::{generate_tones, generate_white_noise};
use sdft_filter::{EngineConfig, Mask, ReferenceSdft};

const SAMPLE_RATE: u32 = 16000;

fn config(spec_height: u32) -> EngineConfig {
    EngineConfig {
        spec_height,
        segment_width: 32,
        hop: spec_height / 8,
        host_mask_height: spec_height,
        host_mask_width: 32,
        sample_rate: SAMPLE_RATE,
        ..Default::default()
    }
}

fn bench_forward(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reference Forward");

    for spec_height in [256, 1024, 4096] {
        let config = config(spec_height);
        let mut reference = ReferenceSdft::new(&config);
        let signal = generate_white_noise(config.signal_len(), 1.0, 42);

        group.throughput(Throughput::Elements(config.spectrum_len() as u64));
        group.bench_with_input(BenchmarkId::new("forward", spec_height), &signal, |b, signal| {
            b.iter(|| {
                black_box(reference.forward(signal));
            });
        });
    }

    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reference Filter");
    group.sample_size(10);

    for spec_height in [256, 1024] {
        let config = config(spec_height);
        let mut reference = ReferenceSdft::new(&config);
        let signal_in = generate_tones(&[(200.0, 0.5), (2000.0, 0.5)], SAMPLE_RATE, config.input_len());
        let mask = Mask::band_pass(spec_height as usize, 32, SAMPLE_RATE, 0.0, 500.0);

        group.throughput(Throughput::Elements(config.signal_len() as u64));
        group.bench_with_input(BenchmarkId::new("filter", spec_height), &signal_in, |b, signal_in| {
            b.iter(|| {
                black_box(reference.filter(&mask, signal_in));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forward, bench_filter);
criterion_main!(benches);
