mod perf;

use criterion::{Criterion, criterion_group, criterion_main};
use swarm::{ParticleStore, constants::DEFAULT_POPULATION, seed::Disc};

fn seeded() -> ParticleStore {
    let mut store = ParticleStore::new(DEFAULT_POPULATION);
    Disc::default().fill(&mut store);
    store
}

fn bench_fill(c: &mut Criterion) {
    let mut store = ParticleStore::new(DEFAULT_POPULATION);
    c.bench_function("disc_fill_512k", |b| b.iter(|| Disc::default().fill(&mut store)));
}

fn bench_derive_transforms(c: &mut Criterion) {
    let mut store = seeded();
    c.bench_function("derive_transforms_512k", |b| b.iter(|| store.derive_transforms()));
}

fn bench_bounds(c: &mut Criterion) {
    let store = seeded();
    c.bench_function("bounds_512k", |b| b.iter(|| std::hint::black_box(store.bounds())));
}

criterion_group! {
    name = benches;
    config = Criterion::default().with_profiler(perf::FlamegraphProfiler::new(100));
    targets = bench_fill, bench_derive_transforms, bench_bounds
}
criterion_main!(benches);
