//! Benchmarks for the single-threaded containers against their std
//! counterparts, plus a contended concurrent dictionary run.
//!
//! Run with: cargo bench -p native-collections

use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::sync::{Arc, Mutex};
use std::thread;

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use native_collections::{ConcurrentDictionary, Dictionary, PriorityQueue, SortedSet};
use rustc_hash::FxBuildHasher;

const COUNT: u64 = 10_000;

// ============================================================================
// Hash tables
// ============================================================================

fn bench_dictionary(c: &mut Criterion) {
    let mut group = c.benchmark_group("dictionary_insert_lookup_remove");
    group.throughput(Throughput::Elements(COUNT));

    group.bench_function("dictionary", |b| {
        let mut map = Dictionary::with_capacity(COUNT as usize);
        b.iter(|| {
            for i in 0..COUNT {
                map.insert(i, i);
            }
            for i in 0..COUNT {
                black_box(map.get(&i));
            }
            for i in 0..COUNT {
                black_box(map.remove(&i));
            }
        });
    });

    group.bench_function("std_hashmap_fx", |b| {
        let mut map: HashMap<u64, u64, FxBuildHasher> =
            HashMap::with_capacity_and_hasher(COUNT as usize, FxBuildHasher);
        b.iter(|| {
            for i in 0..COUNT {
                map.insert(i, i);
            }
            for i in 0..COUNT {
                black_box(map.get(&i));
            }
            for i in 0..COUNT {
                black_box(map.remove(&i));
            }
        });
    });

    group.finish();
}

// ============================================================================
// Ordered containers
// ============================================================================

fn bench_ordered(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_fill_drain");
    group.throughput(Throughput::Elements(COUNT));

    group.bench_function("sorted_set", |b| {
        let mut set = SortedSet::new().unwrap();
        b.iter(|| {
            for i in 0..COUNT {
                set.add(i.wrapping_mul(0x9E37_79B9) % COUNT);
            }
            for i in 0..COUNT {
                black_box(set.remove(&i));
            }
        });
    });

    group.bench_function("std_btreeset", |b| {
        let mut set = BTreeSet::new();
        b.iter(|| {
            for i in 0..COUNT {
                set.insert(i.wrapping_mul(0x9E37_79B9) % COUNT);
            }
            for i in 0..COUNT {
                black_box(set.remove(&i));
            }
        });
    });

    group.bench_function("priority_queue", |b| {
        let mut queue = PriorityQueue::with_capacity(COUNT as usize);
        b.iter(|| {
            for i in 0..COUNT {
                queue.enqueue(i, i.wrapping_mul(0x9E37_79B9) % COUNT);
            }
            while let Some(item) = queue.try_dequeue() {
                black_box(item);
            }
        });
    });

    group.bench_function("std_binary_heap", |b| {
        let mut heap = BinaryHeap::with_capacity(COUNT as usize);
        b.iter(|| {
            for i in 0..COUNT {
                heap.push(Reverse((i.wrapping_mul(0x9E37_79B9) % COUNT, i)));
            }
            while let Some(item) = heap.pop() {
                black_box(item);
            }
        });
    });

    group.finish();
}

// ============================================================================
// Contended writers
// ============================================================================

fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_upsert");

    for threads in [1u64, 2, 4] {
        group.throughput(Throughput::Elements(COUNT * threads));

        group.bench_with_input(
            BenchmarkId::new("concurrent_dictionary", threads),
            &threads,
            |b, &n| {
                b.iter(|| {
                    let map = Arc::new(ConcurrentDictionary::<u64, u64>::new().unwrap());
                    let handles: Vec<_> = (0..n)
                        .map(|t| {
                            let map = map.clone();
                            thread::spawn(move || {
                                for i in 0..COUNT {
                                    map.insert(t * COUNT + i, i);
                                }
                            })
                        })
                        .collect();
                    for h in handles {
                        h.join().unwrap();
                    }
                    black_box(map.len())
                });
            },
        );

        group.bench_with_input(BenchmarkId::new("mutex_hashmap", threads), &threads, |b, &n| {
            b.iter(|| {
                let map = Arc::new(Mutex::new(HashMap::<u64, u64, FxBuildHasher>::default()));
                let handles: Vec<_> = (0..n)
                    .map(|t| {
                        let map = map.clone();
                        thread::spawn(move || {
                            for i in 0..COUNT {
                                map.lock().unwrap().insert(t * COUNT + i, i);
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    h.join().unwrap();
                }
                black_box(map.lock().unwrap().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_dictionary, bench_ordered, bench_concurrent);
criterion_main!(benches);
