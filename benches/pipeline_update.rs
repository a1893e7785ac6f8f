//! Benchmarks for pipeline updates
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use voxflow::pipeline::filters::{ImageSource, MeanFilter, UnaryFunctorFilter};
use voxflow::pipeline::WorkerPool;
use voxflow::{ExecutionSettings, Index, Pipeline, Region, Size, SplitStrategy};

const WIDTH: u64 = 512;
const HEIGHT: u64 = 512;

fn ramp(idx: &Index<2>) -> f32 {
    (idx.0[0] + idx.0[1] * WIDTH as i64) as f32
}

fn pipeline(threads: usize, strategy: SplitStrategy) -> Pipeline<f32, 2> {
    let settings = ExecutionSettings::default()
        .with_threads(threads)
        .with_split_strategy(strategy);
    Pipeline::with_settings(settings, Arc::new(WorkerPool::new(threads)))
}

fn bench_point_wise_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("point_wise_update");
    let full = Region::from_size(Size([WIDTH, HEIGHT]));
    group.throughput(Throughput::Elements(full.number_of_pixels()));

    for threads in [1, 2, 4, 8] {
        let mut p = pipeline(threads, SplitStrategy::SlowestAxis);
        let src = p.add_filter(ImageSource::new(full, ramp));
        let scale = p.add_filter(UnaryFunctorFilter::new("scale", |v: f32| v * 0.5 + 1.0));
        p.connect(src, scale).expect("connect");
        p.update(src).expect("source update");

        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            b.iter(|| {
                p.modified(scale).expect("modified");
                p.update(scale).expect("update");
                black_box(p.output(scale).expect("output").as_slice().len())
            })
        });
    }

    group.finish();
}

fn bench_mean_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("mean_update");
    let full = Region::from_size(Size([WIDTH, HEIGHT]));
    group.throughput(Throughput::Elements(full.number_of_pixels()));

    for strategy in [
        SplitStrategy::SlowestAxis,
        SplitStrategy::LargestAxis,
        SplitStrategy::Multidimensional,
    ] {
        let mut p = pipeline(4, strategy);
        let src = p.add_filter(ImageSource::new(full, ramp));
        let mean = p.add_filter(MeanFilter::new(Size([1, 1])));
        p.connect(src, mean).expect("connect");

        group.bench_with_input(
            BenchmarkId::from_parameter(strategy),
            &strategy,
            |b, _| {
                b.iter(|| {
                    p.modified(mean).expect("modified");
                    p.update(mean).expect("update");
                })
            },
        );
    }

    group.finish();
}

fn bench_streamed_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("streamed_update");
    let full = Region::from_size(Size([WIDTH, HEIGHT]));

    for divisions in [1, 4, 16] {
        let mut p = pipeline(4, SplitStrategy::SlowestAxis);
        let src = p.add_filter(ImageSource::new(full, ramp));
        let mean = p.add_filter(MeanFilter::new(Size([1, 1])));
        p.connect(src, mean).expect("connect");

        group.bench_with_input(
            BenchmarkId::from_parameter(divisions),
            &divisions,
            |b, &divisions| {
                b.iter(|| {
                    p.stream(mean, None, divisions, SplitStrategy::SlowestAxis, |_, image| {
                        black_box(image.as_slice().len());
                        Ok(())
                    })
                    .expect("stream")
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_point_wise_update,
    bench_mean_update,
    bench_streamed_update
);
criterion_main!(benches);
