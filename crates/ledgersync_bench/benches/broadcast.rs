//! End-to-end mutation benchmarks against the in-memory remote.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ledgersync_bench::{random_item, random_operation_set};
use ledgersync_engine::{
    Broadcaster, CollectionStore, Credential, FailurePolicy, MockRemote, Resource, SingletonKind,
    SingletonSync, SyncConfig,
};
use ledgersync_protocol::Regulator;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Benchmark broadcasting a pre-planned operation set.
fn bench_broadcast(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("broadcast");
    let identity = Resource::new(SingletonKind::Identity, "did:bench");
    let policy = FailurePolicy::Halt;
    let set = random_operation_set(200, 64);

    group.throughput(Throughput::Elements(set.len() as u64));
    group.bench_function("600_items", |b| {
        b.iter(|| {
            let remote = MockRemote::new();
            let report = rt.block_on(
                Broadcaster::new(&remote, Regulator::default(), &policy).broadcast(
                    "bench",
                    set.clone(),
                    &identity,
                ),
            );
            black_box(report.chunks_accepted)
        });
    });

    group.finish();
}

/// Benchmark a bulk create through plan, broadcast and commit.
fn bench_apply_bulk(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("apply_bulk");
    let raw: Vec<_> = (0..500).map(|_| random_item(64)).collect();

    group.throughput(Throughput::Elements(raw.len() as u64));
    group.bench_function("500_creates", |b| {
        b.iter(|| {
            let remote = Arc::new(MockRemote::new());
            let singletons = Arc::new(SingletonSync::new(remote.clone()));
            singletons.configure(Some(&Credential::new("0xbench")));
            let store = CollectionStore::new("bench", remote, singletons, SyncConfig::default());
            let report = rt.block_on(store.apply_bulk(raw.clone()));
            black_box(report.committed)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_broadcast, bench_apply_bulk);
criterion_main!(benches);
