//! Benchmarks the two spatial indices that back every photon query during
//! shading: `PointKdTree::range_search` (global/caustics/irradiance) and
//! `VolumePhotonTree::intersect_segment` (volumetric beam estimate).
//! Grounded on the teacher's `render_benchmark.rs` (one `criterion_group`,
//! `measurement_time` bumped to 10s for the noisier photon workload).

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use photon_gi::kdtree::{NeighborHeap, PointKdTree};
use photon_gi::photon::{Photon, VolumetricPhoton};
use photon_gi::photon_volume::VolumePhotonTree;
use photon_gi::spectrum::Spectrum;
use photon_gi::{Point3f, Ray, Vec3f};
use std::time::Duration;

fn scattered_photons(n: usize) -> Vec<Photon> {
    let mut state = 0x9E3779B97F4A7C15u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f32 / (1u64 << 53) as f32
    };
    (0..n)
        .map(|_| Photon {
            position: Point3f::new(next() * 20.0 - 10.0, next() * 20.0 - 10.0, next() * 20.0 - 10.0),
            omega_in: Vec3f::new(0.0, 0.0, 1.0),
            power: Spectrum::uniform(1.0),
        })
        .collect()
}

fn bench_kdtree_range_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdtree_range_search");
    for &n in &[10_000usize, 100_000, 1_000_000] {
        let tree = PointKdTree::build(scattered_photons(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let mut heap = NeighborHeap::new(50);
            let mut out = Vec::new();
            b.iter_batched(
                || Point3f::new(0.0, 0.0, 0.0),
                |center| tree.range_search(center, 1.0, &mut heap, &mut out),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_volumetric_segment_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("volumetric_beam_segment");
    for &n in &[10_000usize, 100_000] {
        let photons: Vec<VolumetricPhoton> = scattered_photons(n)
            .into_iter()
            .map(|photon| VolumetricPhoton { photon, radius: 0.05, is_direct: false })
            .collect();
        let tree = VolumePhotonTree::build(photons);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            let ray = Ray::new(Point3f::new(-10.0, 0.0, 0.0), Vec3f::new(1.0, 0.0, 0.0));
            let mut out = Vec::new();
            b.iter(|| {
                out.clear();
                tree.intersect_segment(&ray, 0.0, 20.0, &mut out);
            })
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = bench_kdtree_range_search, bench_volumetric_segment_query
}
criterion_main!(benches);
