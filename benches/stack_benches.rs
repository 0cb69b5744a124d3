use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use palisade::sync::prelude::*;

use rayon::prelude::*;
use std::sync::Arc;

const OPS: u64 = 10_000;

fn bench_treiber_push_pop(c: &mut Criterion) {
    let stack: TreiberStack<u64> = TreiberStack::new();

    let mut group = c.benchmark_group("treiber_push_pop");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("parallel push/pop", |b| {
        b.iter(|| {
            (0..OPS).into_par_iter().for_each(|i| {
                stack.push(i);
                stack.pop();
            })
        })
    });
}

fn bench_recycling_push_pop(c: &mut Criterion) {
    let pool = Arc::new(NodePool::with_capacity(1_024));
    let stack: RecyclingStack<u64> = RecyclingStack::with_pool(pool);

    let mut group = c.benchmark_group("recycling_push_pop");
    group.throughput(Throughput::Elements(OPS));
    group.bench_function("parallel push/pop", |b| {
        b.iter(|| {
            (0..OPS).into_par_iter().for_each(|i| {
                stack.push(i);
                stack.pop();
            })
        })
    });
}

criterion_group! {
    name = stack_benches;
    config = Criterion::default();
    targets = bench_treiber_push_pop, bench_recycling_push_pop
}
criterion_main!(stack_benches);
