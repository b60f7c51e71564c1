//! Benchmarks for the unfused anti-aliased activation
//!
//! Run with: cargo bench

use candle_core::{Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use indextts_api::models::vocoder::{
    kaiser_sinc_filter1d, Activation1d, DownSample1d, SnakeActivation, SnakeKind, UpSample1d,
};

/// Benchmark filter construction
fn bench_filter_design(c: &mut Criterion) {
    let mut group = c.benchmark_group("kaiser_sinc_filter");
    for kernel_size in [12usize, 18, 24] {
        group.bench_with_input(
            BenchmarkId::new("taps", kernel_size),
            &kernel_size,
            |b, &kernel_size| b.iter(|| kaiser_sinc_filter1d(black_box(0.25), 0.3, kernel_size)),
        );
    }
    group.finish();
}

/// Benchmark the resamplers alone
fn bench_resample(c: &mut Criterion) {
    let device = Device::Cpu;
    let up = UpSample1d::new(2, None);
    let down = DownSample1d::new(2, None);
    let x = Tensor::randn(0f32, 1.0, (1, 64, 4096), &device).unwrap();
    let x_up = up.forward(&x).unwrap();

    let mut group = c.benchmark_group("resample");
    group.bench_function("upsample_2x", |b| b.iter(|| up.forward(black_box(&x)).unwrap()));
    group.bench_function("downsample_2x", |b| {
        b.iter(|| down.forward(black_box(&x_up)).unwrap())
    });
    group.finish();
}

/// Benchmark the full up -> snake -> down path
fn bench_activation(c: &mut Criterion) {
    let device = Device::Cpu;

    let mut group = c.benchmark_group("activation1d");
    group.sample_size(20);
    for channels in [64usize, 256] {
        let act = SnakeActivation::init(SnakeKind::SnakeBeta, channels, true, &device).unwrap();
        let layer = Activation1d::with_defaults(act, false).unwrap();
        let x = Tensor::randn(0f32, 1.0, (1, channels, 2048), &device).unwrap();

        group.bench_with_input(BenchmarkId::new("snakebeta", channels), &x, |b, x| {
            b.iter(|| layer.forward(black_box(x)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_filter_design, bench_resample, bench_activation);
criterion_main!(benches);
