//! Multi-threaded tests for the concurrent dictionary.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use native_collections::ConcurrentDictionary;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn small_map() -> Arc<ConcurrentDictionary<u64, u64>> {
    // Small start so the writers race through several resizes.
    let map = ConcurrentDictionary::builder()
        .concurrency_level(4)
        .capacity(3)
        .build()
        .unwrap();
    Arc::new(map)
}

// ============================================================================
// Writers
// ============================================================================

#[test]
fn disjoint_writers_keep_every_key() {
    init_logging();
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 5_000;

    let map = small_map();
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let map = map.clone();
            thread::spawn(move || {
                for i in 0..PER_THREAD {
                    assert!(map.try_add(t * PER_THREAD + i, i));
                }
                // remove every fourth key again
                for i in (0..PER_THREAD).step_by(4) {
                    assert_eq!(map.try_remove(&(t * PER_THREAD + i)), Some(i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let expected = THREADS * (PER_THREAD - PER_THREAD / 4);
    assert_eq!(map.len() as u64, expected);
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            let key = t * PER_THREAD + i;
            let want = (i % 4 != 0).then_some(i);
            assert_eq!(map.try_get_value(&key), want, "key {key}");
        }
    }
    let keys: HashSet<u64> = map.keys().collect();
    assert_eq!(keys.len() as u64, expected);
}

#[test]
fn compare_and_swap_counter() {
    init_logging();
    const THREADS: usize = 4;
    const INCREMENTS: u64 = 2_000;

    let map = small_map();
    map.try_add(0, 0);
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let map = map.clone();
            thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    loop {
                        let current = map.get(&0).unwrap();
                        if map.try_update(&0, current + 1, &current) {
                            break;
                        }
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(map.get(&0), Ok(THREADS as u64 * INCREMENTS));
}

#[test]
fn get_or_add_races_agree_on_one_value() {
    init_logging();
    const THREADS: u64 = 6;
    const KEYS: u64 = 500;

    let map = small_map();
    let barrier = Arc::new(Barrier::new(THREADS as usize));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let map = map.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                (0..KEYS).map(|k| map.get_or_add(k, t)).collect::<Vec<_>>()
            })
        })
        .collect();

    let results: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for k in 0..KEYS as usize {
        let winner = map.get(&(k as u64)).unwrap();
        assert!(results.iter().all(|r| r[k] == winner), "key {k} saw two values");
    }
    assert_eq!(map.len() as u64, KEYS);
}

// ============================================================================
// Readers against writers
// ============================================================================

#[test]
fn readers_never_see_torn_entries() {
    init_logging();
    let map = small_map();
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let map = map.clone();
        let done = done.clone();
        thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(11);
            for _ in 0..50_000 {
                let k = rng.random_range(0..2_000u64);
                if rng.random_bool(0.7) {
                    map.insert(k, k * 3);
                } else {
                    map.try_remove(&k);
                }
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let map = map.clone();
            let done = done.clone();
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    for (k, v) in map.iter() {
                        assert_eq!(v, k * 3);
                    }
                    if let Some(v) = map.try_get_value(&7) {
                        assert_eq!(v, 21);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for r in readers {
        r.join().unwrap();
    }
    assert_eq!(map.to_vec().len(), map.len());
}

#[test]
fn configured_map_shared_across_threads() {
    init_logging();
    let map: ConcurrentDictionary<u64, u64> = ConcurrentDictionary::builder()
        .concurrency_level(8)
        .capacity(1000)
        .slab_size(256)
        .build()
        .unwrap();
    let map = Arc::new(map);
    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                for i in 0..250 {
                    assert!(map.try_add(t * 250 + i, i));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(map.len(), 1000);
    assert_eq!(map.try_get_value(&999), Some(249));
}
