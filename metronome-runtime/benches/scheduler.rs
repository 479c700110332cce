//! Criterion benchmarks for the reaction admission and queueing hot path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use metronome_common::{ReactionIndex, StatusCell};
use metronome_runtime::pq::ReactionQueue;
use metronome_runtime::Reaction;

fn admission_benchmark(c: &mut Criterion) {
    let cell = StatusCell::new();
    c.bench_function("status admit + retire", |b| {
        b.iter(|| {
            black_box(cell.try_admit());
            let _ = black_box(cell.retire());
        })
    });
}

fn queue_benchmark(c: &mut Criterion) {
    let reactions: Vec<_> = (0..1024)
        .map(|key| Reaction::bodiless("bench", ReactionIndex::new(0, key)))
        .collect();

    c.bench_function("queue insert + drain 1024", |b| {
        b.iter(|| {
            let mut queue = ReactionQueue::with_capacity(reactions.len());
            for reaction in &reactions {
                queue.insert(reaction.clone());
            }
            while let Some(reaction) = queue.pop_min() {
                black_box(reaction);
            }
        })
    });
}

criterion_group!(benches, admission_benchmark, queue_benchmark);
criterion_main!(benches);
