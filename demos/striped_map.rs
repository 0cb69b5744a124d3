use palisade::prelude::*;
use std::sync::Arc;

fn main() {
    let map: Arc<StripedMap<String, u64>> = Arc::new(StripedMap::new());

    // RW from 8 threads concurrently, every thread on its own key.
    let thread_count = 8;
    let mut threads = vec![];

    for thread_no in 0..thread_count {
        let map = map.clone();

        let t = std::thread::Builder::new()
            .name(format!("t_{}", thread_no))
            .spawn(move || {
                let key = format!("{}", thread_no);
                map.insert(key.clone(), thread_no);
                map.compute(key.clone(), |v| v.map(|n| n * 10));
                let _ = map.get(&key).unwrap();
            })
            .unwrap();

        threads.push(t);
    }

    for t in threads.into_iter() {
        t.join().unwrap();
    }

    let mut entries: Vec<(String, u64)> = map.iter().collect();
    entries.sort();
    println!("{} entries over {} stripes", map.len(), map.stripe_count());
    for (k, v) in entries {
        println!("{} => {}", k, v);
    }
}
