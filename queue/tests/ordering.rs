//! Cross-thread ordering properties of the lock-free rings

use queue::{MpmcRing, Queue, SpscRing};
use std::sync::Arc;
use std::thread;

#[test]
fn spsc_preserves_fifo_across_threads() {
    const N: u64 = 200_000;
    let ring = Arc::new(SpscRing::new(1024));

    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for i in 1..=N {
                let mut item = i;
                loop {
                    match ring.enqueue(item) {
                        Ok(()) => break,
                        Err(rejected) => {
                            item = rejected;
                            thread::yield_now();
                        }
                    }
                }
            }
        })
    };

    let consumer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            let mut expected = 1u64;
            while expected <= N {
                match ring.dequeue() {
                    Some(value) => {
                        assert_eq!(value, expected, "out-of-order or duplicated item");
                        expected += 1;
                    }
                    None => thread::yield_now(),
                }
            }
        })
    };

    producer.join().expect("producer panicked");
    consumer.join().expect("consumer panicked");
    assert_eq!(ring.dequeue(), None);
}

#[test]
fn mpmc_preserves_per_producer_fifo() {
    const PRODUCERS: u64 = 4;
    const CONSUMERS: usize = 2;
    const PER_PRODUCER: u64 = 50_000;

    let ring: Arc<MpmcRing<(u64, u64)>> = Arc::new(MpmcRing::new(512));

    let mut producers = Vec::new();
    for producer_id in 0..PRODUCERS {
        let ring = Arc::clone(&ring);
        producers.push(thread::spawn(move || {
            for counter in 0..PER_PRODUCER {
                let mut item = (producer_id, counter);
                loop {
                    match ring.enqueue(item) {
                        Ok(()) => break,
                        Err(rejected) => {
                            item = rejected;
                            thread::yield_now();
                        }
                    }
                }
            }
        }));
    }

    let total = PRODUCERS * PER_PRODUCER;
    let counted = Arc::new(std::sync::atomic::AtomicU64::new(0));
    let mut consumers = Vec::new();
    for _ in 0..CONSUMERS {
        let ring = Arc::clone(&ring);
        let counted = Arc::clone(&counted);
        consumers.push(thread::spawn(move || {
            let mut seen: Vec<(u64, u64)> = Vec::new();
            loop {
                match ring.dequeue() {
                    Some(item) => {
                        seen.push(item);
                        counted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    None => {
                        if counted.load(std::sync::atomic::Ordering::Relaxed) >= total {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }
            seen
        }));
    }

    for producer in producers {
        producer.join().expect("producer panicked");
    }
    let streams: Vec<Vec<(u64, u64)>> = consumers
        .into_iter()
        .map(|consumer| consumer.join().expect("consumer panicked"))
        .collect();

    // Within one consumer's stream, each producer's counters appear in
    // the order that producer enqueued them.
    for stream in &streams {
        let mut last: Vec<Option<u64>> = vec![None; PRODUCERS as usize];
        for &(producer_id, counter) in stream {
            if let Some(previous) = last[producer_id as usize] {
                assert!(
                    counter > previous,
                    "producer {producer_id} reordered: {counter} after {previous}"
                );
            }
            last[producer_id as usize] = Some(counter);
        }
    }

    // No item lost or duplicated across all consumers.
    let mut all: Vec<(u64, u64)> = streams.into_iter().flatten().collect();
    assert_eq!(all.len() as u64, total);
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len() as u64, total);
}
