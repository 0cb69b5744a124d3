use palisade::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn main() {
    let table: Arc<RwLock<HashMap<String, u64>>> = Arc::new(RwLock::new(HashMap::default()));
    let permits = Arc::new(Semaphore::new(2));
    let done = Arc::new(CountdownLatch::new(8));

    let thread_count = 8;
    let mut threads = vec![];

    for thread_no in 0..thread_count {
        let table = table.clone();
        let permits = permits.clone();
        let done = done.clone();

        let t = std::thread::Builder::new()
            .name(format!("t_{}", thread_no))
            .spawn(move || {
                // At most two writers at work at any time.
                let _permit = permits.permit();
                let key = format!("{}", thread_no);
                table.with_write(|t| t.insert(key.clone(), thread_no));
                let _ = table.with_read(|t| t.get(&key).copied()).unwrap();
                done.count_down();
            })
            .unwrap();

        threads.push(t);
    }

    if done.wait_for(Duration::from_secs(5)) {
        println!("{} keys written", table.read().len());
    }

    for t in threads.into_iter() {
        t.join().unwrap();
    }
}
