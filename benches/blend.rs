use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::{ArrayD, IxDyn};
use std::hint::black_box;
use volume_merge::blend::{blend_volume, BlendPolicy};
use volume_merge::distance::{DistanceTransformService, EuclideanDistanceTransform};
use volume_merge::volume::{Geometry, Region, Volume};

const SIZES: [usize; 2] = [32, 96];

fn ramp(size: usize) -> ArrayD<f32> {
    ArrayD::from_shape_fn(IxDyn(&[size; 3]), |i| (i[0] + i[1] + i[2]) as f32)
}

fn sphere_mask(size: usize) -> Volume {
    let geometry = Geometry::unit(Region::from_size(vec![size; 3]).unwrap());
    let center = size as f64 / 2.0;
    Volume::from_fn(geometry, |i| {
        let r2: f64 = i.iter().map(|&v| (v as f64 - center).powi(2)).sum();
        if r2 < center * center {
            1.0
        } else {
            0.0
        }
    })
}

fn bench_blend(c: &mut Criterion) {
    let mut group = c.benchmark_group("blend");
    for size in SIZES {
        let output = ramp(size);
        let secondary = ramp(size).mapv(|v| v * 2.0);
        let distance = ArrayD::from_elem(IxDyn(&[size; 3]), 1.0_f32);
        group.throughput(Throughput::Elements((size * size * size) as u64));
        for policy in [BlendPolicy::Overwrite, BlendPolicy::Average, BlendPolicy::Weighted] {
            group.bench_with_input(
                BenchmarkId::new(policy.to_string(), size),
                &size,
                |b, _| {
                    b.iter_batched_ref(
                        || output.clone(),
                        |output| {
                            blend_volume(
                                policy,
                                output,
                                black_box(&distance),
                                black_box(&secondary),
                                black_box(&distance),
                                1.0,
                            )
                        },
                        criterion::BatchSize::LargeInput,
                    )
                },
            );
        }
    }
    group.finish();
}

fn bench_distance(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance");
    group.sample_size(20);
    for size in SIZES {
        let mask = sphere_mask(size);
        group.throughput(Throughput::Elements((size * size * size) as u64));
        group.bench_with_input(BenchmarkId::new("euclidean", size), &mask, |b, mask| {
            b.iter(|| black_box(EuclideanDistanceTransform.distance_field(black_box(mask))))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_blend, bench_distance);
criterion_main!(benches);
