//! Benchmarks for the storage layers

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tokio::runtime::Runtime;
use unified_storage::backends::InMemoryStorage;
use unified_storage::coding::CodingStorage;
use unified_storage::environment::StorageEnvironment;
use unified_storage::traits::KeyValueDataStorage;
use unified_storage::unified::{UnifiedKey, UnifiedStorage};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to create runtime")
}

fn bench_adapter(c: &mut Criterion) {
    let rt = runtime();
    let env = StorageEnvironment::isolated();
    let storage = rt
        .block_on(InMemoryStorage::open_default(&env))
        .expect("open");
    let key = "bench-key".to_string();
    let value = bytes::Bytes::from(vec![0xAB_u8; 256]);

    c.bench_function("memory_save", |b| {
        b.iter(|| {
            rt.block_on(storage.save(black_box(value.clone()), &key))
                .expect("save");
        });
    });

    rt.block_on(storage.save(value, &key)).expect("save");
    c.bench_function("memory_fetch", |b| {
        b.iter(|| {
            let fetched = rt.block_on(storage.fetch(black_box(&key))).expect("fetch");
            black_box(fetched);
        });
    });
}

fn bench_coding_layer(c: &mut Criterion) {
    let rt = runtime();
    let env = StorageEnvironment::isolated();
    let storage = CodingStorage::new(
        rt.block_on(InMemoryStorage::open_default(&env)).expect("open"),
    );
    let key = "bench-key".to_string();
    let value: Vec<u64> = (0..64).collect();

    c.bench_function("coding_save", |b| {
        b.iter(|| {
            rt.block_on(storage.save(black_box(&value), &key)).expect("save");
        });
    });

    c.bench_function("coding_fetch", |b| {
        b.iter(|| {
            let fetched: Option<Vec<u64>> =
                rt.block_on(storage.fetch(black_box(&key))).expect("fetch");
            black_box(fetched);
        });
    });
}

fn bench_facade(c: &mut Criterion) {
    let rt = runtime();
    let env = StorageEnvironment::isolated();
    let storage = UnifiedStorage::with_environment(
        unified_storage::factory::DefaultStorageFactory::new(),
        env,
    );
    let key: UnifiedKey<InMemoryStorage, u64> = UnifiedKey::new("bench-key");

    rt.block_on(storage.save(&1_u64, &key)).expect("save");
    c.bench_function("facade_fetch_cached", |b| {
        b.iter(|| {
            let fetched = rt.block_on(storage.fetch(black_box(&key))).expect("fetch");
            black_box(fetched);
        });
    });
}

criterion_group!(benches, bench_adapter, bench_coding_layer, bench_facade);
criterion_main!(benches);
