//! Store operation benchmarks: lock round trips, bulk saves, snapshot
//! capture/restore.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gridstore::entity::{Block, BlockId, BlockReplica, Dataset, DatasetReplica, Group, Site};
use gridstore::{InventoryStore, LoadFlags, NameFilter, SnapshotClear, StoreConfig};

fn seeded_store(num_datasets: u64) -> InventoryStore {
    let mut store = InventoryStore::open(&StoreConfig::memory()).unwrap();

    let sites: Vec<Site> = (0..10)
        .map(|i| Site::new(format!("T2_BENCH_{:02}", i), "bench.example.org"))
        .collect();
    store.save_sites(&sites).unwrap();
    store.save_groups(&[Group::new("DataOps")]).unwrap();

    let datasets: Vec<Dataset> = (0..num_datasets)
        .map(|i| {
            let mut ds = Dataset::new(format!("/Bench/Set{:04}/RAW", i));
            for b in 0..4u64 {
                ds.upsert_block(Block::new(BlockId((i * 4 + b) as u128 + 1), 1 << 30, 10, false));
            }
            ds
        })
        .collect();
    store.save_datasets(&datasets).unwrap();

    let replicas: Vec<DatasetReplica> = datasets
        .iter()
        .map(|ds| {
            let mut replica = DatasetReplica::new(ds.name.clone(), "T2_BENCH_00");
            replica.is_complete = true;
            for block in &ds.blocks {
                replica
                    .block_replicas
                    .push(BlockReplica::new(block.id, Some("DataOps".to_string()), block.size));
            }
            replica
        })
        .collect();
    store.add_dataset_replicas(&replicas).unwrap();

    store
}

fn bench_lock_roundtrip(c: &mut Criterion) {
    let mut store = InventoryStore::open(&StoreConfig::memory()).unwrap();

    c.bench_function("lock_acquire_release", |b| {
        b.iter(|| {
            assert!(store.acquire_lock(true).unwrap());
            store.release_lock(false).unwrap();
        })
    });

    c.bench_function("lock_reentrant_depth_8", |b| {
        b.iter(|| {
            for _ in 0..8 {
                store.acquire_lock(true).unwrap();
            }
            for _ in 0..8 {
                store.release_lock(false).unwrap();
            }
        })
    });
}

fn bench_load_data(c: &mut Criterion) {
    let mut store = seeded_store(500);

    c.bench_function("load_data_500_datasets", |b| {
        b.iter(|| {
            let inv = store
                .load_data(
                    &NameFilter::all(),
                    &NameFilter::all(),
                    LoadFlags::everything(),
                )
                .unwrap();
            black_box(inv.replica_count())
        })
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let mut store = seeded_store(200);

    c.bench_function("snapshot_capture_200_datasets", |b| {
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            let tag = format!("bench-{}", n);
            store
                .make_snapshot(SnapshotClear::None, Some(tag.as_str()))
                .unwrap()
        })
    });

    store.make_snapshot(SnapshotClear::None, Some("restore-me")).unwrap();
    c.bench_function("snapshot_restore_200_datasets", |b| {
        b.iter(|| store.recover_from(black_box("restore-me")).unwrap())
    });
}

criterion_group!(benches, bench_lock_roundtrip, bench_load_data, bench_snapshot);
criterion_main!(benches);
