use palisade::sync::prelude::*;
use palisade::table::prelude::*;

use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn striped_concurrent() {
    let table = {
        let table: StripedMap<String, u64> = StripedMap::new();
        table.insert("data".into(), 1_u64);
        Arc::new(table)
    };

    let mut threads = vec![];

    for thread_no in 0..100 {
        let table = table.clone();

        let t = std::thread::Builder::new()
            .name(format!("t_{}", thread_no))
            .spawn(move || {
                if thread_no % 2 == 0 {
                    // Reader threads
                    let _data = table.get("data");
                } else {
                    // Writer threads
                    table.compute("data".into(), |v| v.map(|d| d + 1));
                }
            })
            .unwrap();

        threads.push(t);
    }

    for t in threads.into_iter() {
        t.join().unwrap();
    }

    assert_eq!(table.get("data"), Some(51));
}

#[test]
fn striped_distinct_stripes_do_not_block_each_other() {
    let map: Arc<StripedMap<u64, u64>> = Arc::new(StripedMap::with_stripes(16));
    let slow_key = 0_u64;
    let fast_key = (1_u64..)
        .find(|k| map.stripe_of(k) != map.stripe_of(&slow_key))
        .unwrap();

    let entered = Arc::new(CountdownLatch::new(1));
    let slow_done = Arc::new(AtomicBool::new(false));

    let slow = {
        let map = map.clone();
        let entered = entered.clone();
        let slow_done = slow_done.clone();
        std::thread::Builder::new()
            .name("slow_stripe".into())
            .spawn(move || {
                // Holds the write lock of `slow_key`'s stripe for a while.
                map.compute(slow_key, |_| {
                    entered.count_down();
                    std::thread::sleep(Duration::from_millis(300));
                    Some(1)
                });
                slow_done.store(true, Ordering::SeqCst);
            })
            .unwrap()
    };

    entered.wait();
    let started = Instant::now();
    assert_eq!(map.insert(fast_key, 2), None);
    assert_eq!(map.get(&fast_key), Some(2));
    assert!(map.contains_key(&fast_key));
    assert_eq!(map.remove(&fast_key), Some(2));
    assert!(!slow_done.load(Ordering::SeqCst));
    assert!(started.elapsed() < Duration::from_millis(250));

    // Same stripe has to wait for the slow writer.
    assert_eq!(map.get(&slow_key), Some(1));
    slow.join().unwrap();
}

#[test]
fn striped_len_is_plausible_under_concurrent_inserts() {
    const WRITERS: u64 = 4;
    const PER_WRITER: u64 = 2_500;

    let map: Arc<StripedMap<u64, u64>> = Arc::new(StripedMap::new());
    let done = Arc::new(AtomicBool::new(false));

    let observer = {
        let map = map.clone();
        let done = done.clone();
        std::thread::Builder::new()
            .name("observer".into())
            .spawn(move || {
                let mut seen = vec![];
                while !done.load(Ordering::Acquire) {
                    seen.push(map.len());
                }
                seen
            })
            .unwrap()
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let map = map.clone();
            std::thread::Builder::new()
                .name(format!("writer_{}", w))
                .spawn(move || {
                    for i in 0..PER_WRITER {
                        map.insert(w * PER_WRITER + i, i);
                    }
                })
                .unwrap()
        })
        .collect();

    for w in writers.into_iter() {
        w.join().unwrap();
    }
    done.store(true, Ordering::Release);
    let seen = observer.join().unwrap();

    let total = (WRITERS * PER_WRITER) as usize;
    assert!(seen.iter().all(|&n| n <= total));
    // Insert-only: every stripe only grows, so later sums never shrink.
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(map.len(), total);
}

#[test]
fn striped_parallel_insert_and_retain() {
    let map: StripedMap<u64, u64> = StripedMap::with_stripes(32);

    (0..10_000_u64).into_par_iter().for_each(|i| {
        map.insert(i, i * i);
    });
    assert_eq!(map.len(), 10_000);

    (0..10_000_u64)
        .into_par_iter()
        .filter(|i| i % 2 == 1)
        .for_each(|i| {
            assert_eq!(map.remove(&i), Some(i * i));
        });
    assert_eq!(map.len(), 5_000);

    map.retain(|k, _| *k < 100);
    assert_eq!(map.len(), 50);
    assert!(map.keys().all(|k| k % 2 == 0 && k < 100));
}

#[test]
fn striped_iteration_during_writes_never_duplicates() {
    let map: Arc<StripedMap<u64, u64>> = Arc::new(StripedMap::with_stripes(8));
    (0..1_000).for_each(|k| {
        map.insert(k, k);
    });

    let churn = {
        let map = map.clone();
        std::thread::spawn(move || {
            for k in 1_000..3_000 {
                map.insert(k, k);
                map.remove(&(k - 1_000));
            }
        })
    };

    for _ in 0..10 {
        let mut keys: Vec<u64> = map.keys().collect();
        let len = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), len, "a key was yielded twice");
        assert!(keys.iter().all(|&k| k < 3_000));
    }

    churn.join().unwrap();
    let mut keys: Vec<u64> = map.keys().collect();
    keys.sort_unstable();
    assert_eq!(keys, (2_000..3_000).collect::<Vec<u64>>());
}

#[test]
fn striped_for_each_callback_holds_no_lock() {
    let map: StripedMap<u64, u64> = StripedMap::with_stripes(4);
    (0..16).for_each(|k| {
        map.insert(k, k);
    });

    // Writing to the map from the callback would deadlock if a stripe lock were held.
    map.for_each(|k, v| {
        map.insert(*k, v + 100);
    });
    assert!(map.values().all(|v| v >= 100));
}
