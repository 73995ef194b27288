//! Scheduler Benchmarks
//!
//! Partitioning cost and the per-frame visibility pass

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::{Mat4, Vec3};
use stipple_core::PointCloudDataset;
use stipple_lod::{ChunkScheduler, ChunkingConfig, Octree, OctreeConfig, SchedulerConfig, build_chunk_set};

fn dataset(count: usize) -> PointCloudDataset {
    let side = (count as f32).cbrt().ceil() as usize;
    let points = (0..count)
        .map(|i| Vec3::new((i % side) as f32, (i / side % side) as f32, (i / (side * side)) as f32))
        .collect();
    // No colours, so the counts cannot mismatch
    PointCloudDataset::new(points, Vec::new()).unwrap()
}

fn camera(eye: Vec3) -> Mat4 {
    Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 1_000.0) * Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y)
}

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    group.sample_size(10);

    for count in [100_000usize, 1_000_000].iter() {
        let dataset = dataset(*count);
        group.bench_with_input(BenchmarkId::new("octree", count), &dataset, |b, dataset| {
            b.iter(|| black_box(Octree::from_dataset(dataset, &OctreeConfig::default())))
        });
        group.bench_with_input(BenchmarkId::new("chunks", count), &dataset, |b, dataset| {
            b.iter(|| black_box(build_chunk_set(dataset, &ChunkingConfig::default())))
        });
    }

    group.finish();
}

fn bench_update_visibility(c: &mut Criterion) {
    let mut group = c.benchmark_group("update_visibility");

    let dataset = dataset(1_000_000);
    let set = Octree::from_dataset(&dataset, &OctreeConfig {
        max_points_per_node: 2_000,
        ..OctreeConfig::default()
    })
    .to_chunk_set();

    for budget in [100_000usize, 1_000_000].iter() {
        let mut scheduler = ChunkScheduler::new(SchedulerConfig {
            point_budget: *budget,
            ..SchedulerConfig::default()
        });
        let mut frame = 0u32;
        group.bench_with_input(BenchmarkId::from_parameter(budget), budget, |b, _| {
            b.iter(|| {
                frame = frame.wrapping_add(1);
                let angle = frame as f32 * 0.01;
                let eye = Vec3::new(angle.cos() * 200.0, 50.0, angle.sin() * 200.0);
                black_box(scheduler.update_visibility(&set, camera(eye)))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_partition, bench_update_visibility);
criterion_main!(benches);
