//! Benchmarks for the per-sample transform chain.
//!
//! This measures:
//! 1. Each stage on its own, at the full source size
//! 2. The whole chain, built at runtime and composed statically with `then`
//!
//! Decoding is excluded; see the integration tests for end-to-end coverage.
//!
//! To run these, use:
//! ```bash
//! cargo bench -p affordance_data
//! ```

use affordance_data::transforms::vision::{CenterCrop, Normalize, ToTensor};
use affordance_data::transforms::Transform;
use affordance_data::{LabelMask, RawSample, TransformChain};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgb, RgbImage};

/// Source sizes (height, width) swept by the chain benchmark.
const SIZES: [(u32, u32); 3] = [(256, 320), (480, 640), (960, 1280)];

fn make_sample(height: u32, width: u32) -> RawSample {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mask = LabelMask::filled(height as usize, width as usize, 2);
    RawSample::new(image, mask).expect("aligned sample")
}

fn bench_stages(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stages");
    let sample = make_sample(480, 640);
    let crop = CenterCrop::default();

    group.bench_function("center_crop", |b| {
        b.iter(|| black_box(crop.apply(sample.clone()).unwrap()))
    });

    let cropped = crop.apply(sample.clone()).unwrap();
    group.bench_function("to_tensor", |b| {
        b.iter(|| black_box(ToTensor.apply(cropped.clone()).unwrap()))
    });

    let tensors = ToTensor.apply(cropped).unwrap();
    let normalize = Normalize::default();
    group.bench_function("normalize", |b| {
        b.iter(|| black_box(normalize.apply(tensors.clone()).unwrap()))
    });
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("Chain");
    let runtime = TransformChain::default();
    let composed = CenterCrop::default().then(ToTensor).then(Normalize::default());

    for &(height, width) in &SIZES {
        let sample = make_sample(height, width);
        let id = format!("{height}x{width}");

        group.bench_with_input(BenchmarkId::new("runtime", &id), &sample, |b, s| {
            b.iter(|| black_box(runtime.run(s.clone()).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("composed", &id), &sample, |b, s| {
            b.iter(|| black_box(composed.apply(s.clone()).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_stages, bench_chain);
criterion_main!(benches);
