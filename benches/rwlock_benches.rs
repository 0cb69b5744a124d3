use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use palisade::sync::prelude::*;

use rand::prelude::*;
use rand_distr::Pareto;
use std::collections::HashMap;
use std::sync::Arc;

type Table = Arc<RwLock<HashMap<String, u64>>>;
type StdTable = Arc<std::sync::RwLock<HashMap<String, u64>>>;

fn table() -> Table {
    let mut table: HashMap<String, u64> = HashMap::new();
    table.insert("CORE".into(), 1_u64);
    Arc::new(RwLock::new(table))
}

fn std_table() -> StdTable {
    let mut table: HashMap<String, u64> = HashMap::new();
    table.insert("CORE".into(), 1_u64);
    Arc::new(std::sync::RwLock::new(table))
}

fn pareto_dist() -> f64 {
    1. / thread_rng().sample(Pareto::new(1., 5.0_f64.log(4.0_f64)).unwrap())
}

fn pure_read(table: Table, key: String, thread_count: u64) {
    let mut threads = vec![];

    for thread_no in 0..thread_count {
        let table = table.clone();
        let key = key.clone();

        let t = std::thread::Builder::new()
            .name(format!("t_{}", thread_no))
            .spawn(move || {
                let guard = table.read();
                guard.get(&key);
            })
            .unwrap();

        threads.push(t);
    }

    for t in threads.into_iter() {
        t.join().unwrap();
    }
}

fn rw_pareto(table: Table, key: String, dist: f64, thread_count: u64) {
    let mut threads = vec![];

    for thread_no in 0..thread_count {
        let table = table.clone();
        let key = key.clone();

        let t = std::thread::Builder::new()
            .name(format!("t_{}", thread_no))
            .spawn(move || {
                if dist < 0.8_f64 {
                    table.with_read(|t| t.get(&key).copied());
                } else {
                    table.with_write(|t| *t.entry(key).or_insert(0) += 1);
                }
            })
            .unwrap();

        threads.push(t);
    }

    for t in threads.into_iter() {
        t.join().unwrap();
    }
}

fn std_rw_pareto(table: StdTable, key: String, dist: f64, thread_count: u64) {
    let mut threads = vec![];

    for thread_no in 0..thread_count {
        let table = table.clone();
        let key = key.clone();

        let t = std::thread::Builder::new()
            .name(format!("t_{}", thread_no))
            .spawn(move || {
                if dist < 0.8_f64 {
                    let guard = table.read().unwrap();
                    guard.get(&key);
                } else {
                    let mut guard = table.write().unwrap();
                    *guard.entry(key).or_insert(0) += 1;
                }
            })
            .unwrap();

        threads.push(t);
    }

    for t in threads.into_iter() {
        t.join().unwrap();
    }
}

fn bench_rwlock_pure_reads(c: &mut Criterion) {
    let table = table();
    let key: String = "CORE".into();

    let threads = 8;

    let mut group = c.benchmark_group("rwlock_read_throughput");
    group.throughput(Throughput::Elements(threads as u64));
    group.bench_function("pure reads", move |b| {
        b.iter_batched(
            || (table.clone(), key.clone()),
            |vars| pure_read(vars.0, vars.1, threads),
            BatchSize::SmallInput,
        )
    });
}

fn bench_rwlock_rw_pareto(c: &mut Criterion) {
    let table = table();
    let std_table = std_table();
    let key: String = "CORE".into();
    let std_key = key.clone();

    let threads = 8;

    let mut group = c.benchmark_group("rwlock_rw_pareto_throughput");
    group.throughput(Throughput::Elements(threads as u64));
    group.bench_function("palisade rw_pareto", move |b| {
        b.iter_batched(
            || (table.clone(), key.clone(), pareto_dist()),
            |vars| rw_pareto(vars.0, vars.1, vars.2, threads),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("std rw_pareto", move |b| {
        b.iter_batched(
            || (std_table.clone(), std_key.clone(), pareto_dist()),
            |vars| std_rw_pareto(vars.0, vars.1, vars.2, threads),
            BatchSize::SmallInput,
        )
    });
}

fn bench_rwlock_uncontended(c: &mut Criterion) {
    let raw = RawRwLock::new();

    let mut group = c.benchmark_group("rwlock_uncontended");
    group.bench_function("read acquire/release", |b| {
        b.iter(|| {
            raw.acquire_read();
            raw.release_read()
        })
    });
    group.bench_function("write acquire/release", |b| {
        b.iter(|| {
            raw.acquire_write();
            raw.release_write()
        })
    });
}

criterion_group! {
    name = rwlock_benches;
    config = Criterion::default();
    targets = bench_rwlock_pure_reads, bench_rwlock_rw_pareto, bench_rwlock_uncontended
}
criterion_main!(rwlock_benches);
