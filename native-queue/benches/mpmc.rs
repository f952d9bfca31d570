//! Benchmarks for the concurrent queue and stack.
//!
//! Compares against a `Mutex<VecDeque>` baseline.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use native_queue::{ConcurrentQueue, ConcurrentStack};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread;

// ============================================================================
// Uncontended round trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");

    group.bench_function("concurrent_queue/u64", |b| {
        let q = ConcurrentQueue::<u64>::new().unwrap();
        b.iter(|| {
            q.enqueue(black_box(42));
            black_box(q.try_dequeue().unwrap())
        });
    });

    group.bench_function("concurrent_stack/u64", |b| {
        let s = ConcurrentStack::<u64>::new().unwrap();
        b.iter(|| {
            s.push(black_box(42));
            black_box(s.try_pop().unwrap())
        });
    });

    group.bench_function("mutex_vecdeque/u64", |b| {
        let q = Mutex::new(VecDeque::<u64>::with_capacity(1024));
        b.iter(|| {
            q.lock().unwrap().push_back(black_box(42));
            black_box(q.lock().unwrap().pop_front().unwrap())
        });
    });

    group.finish();
}

// ============================================================================
// Burst: fill then drain, crossing segment boundaries
// ============================================================================

fn bench_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("burst");

    for burst in [32usize, 1_000, 100_000] {
        group.throughput(Throughput::Elements(burst as u64));

        group.bench_with_input(BenchmarkId::new("concurrent_queue", burst), &burst, |b, &n| {
            let q = ConcurrentQueue::<u64>::new().unwrap();
            b.iter(|| {
                for i in 0..n as u64 {
                    q.enqueue(i);
                }
                while let Some(v) = q.try_dequeue() {
                    black_box(v);
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("mutex_vecdeque", burst), &burst, |b, &n| {
            let q = Mutex::new(VecDeque::<u64>::new());
            b.iter(|| {
                for i in 0..n as u64 {
                    q.lock().unwrap().push_back(i);
                }
                while let Some(v) = q.lock().unwrap().pop_front() {
                    black_box(v);
                }
            });
        });
    }

    group.finish();
}

// ============================================================================
// Contended throughput
// ============================================================================

const MESSAGES: u64 = 100_000;

fn run_queue(producers: u64, consumers: u64) {
    let q = Arc::new(ConcurrentQueue::<u64>::new().unwrap());
    let per_producer = MESSAGES / producers;
    let per_consumer = per_producer * producers / consumers;

    let prod: Vec<_> = (0..producers)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    q.enqueue(i);
                }
            })
        })
        .collect();

    let cons: Vec<_> = (0..consumers)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || {
                let mut got = 0;
                while got < per_consumer {
                    if q.try_dequeue().is_some() {
                        got += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    for h in prod.into_iter().chain(cons) {
        h.join().unwrap();
    }
}

fn run_mutex(producers: u64, consumers: u64) {
    let q = Arc::new(Mutex::new(VecDeque::<u64>::new()));
    let per_producer = MESSAGES / producers;
    let per_consumer = per_producer * producers / consumers;

    let prod: Vec<_> = (0..producers)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    q.lock().unwrap().push_back(i);
                }
            })
        })
        .collect();

    let cons: Vec<_> = (0..consumers)
        .map(|_| {
            let q = q.clone();
            thread::spawn(move || {
                let mut got = 0;
                while got < per_consumer {
                    if q.lock().unwrap().pop_front().is_some() {
                        got += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    for h in prod.into_iter().chain(cons) {
        h.join().unwrap();
    }
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");
    group.throughput(Throughput::Elements(MESSAGES));
    group.sample_size(20);

    for (p, c_) in [(1u64, 1u64), (2, 2), (4, 4)] {
        let label = format!("{p}p{c_}c");
        group.bench_function(BenchmarkId::new("concurrent_queue", &label), |b| {
            b.iter(|| run_queue(p, c_));
        });
        group.bench_function(BenchmarkId::new("mutex_vecdeque", &label), |b| {
            b.iter(|| run_mutex(p, c_));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_burst, bench_contended);
criterion_main!(benches);
