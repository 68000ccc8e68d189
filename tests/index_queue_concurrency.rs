//! Multi-threaded free/submitted handoff scenarios for the index queue
//! (C3), the same shape as `ring_concurrency.rs` but exercising the
//! `u32`-slot queue a [`ada_trace::Lane`] uses internally.

use ada_trace::IndexQueue;
use std::sync::Arc;
use std::thread;

#[test]
fn producer_consumer_preserve_fifo_order_across_threads() {
    const N: u32 = 100_000;
    let queue = Arc::new(IndexQueue::new(256));

    let producer_queue = queue.clone();
    let producer = thread::spawn(move || {
        let mut i = 0u32;
        while i < N {
            if producer_queue.push(i) {
                i += 1;
            } else {
                thread::yield_now();
            }
        }
    });

    let consumer_queue = queue.clone();
    let consumer = thread::spawn(move || {
        let mut expected = 0u32;
        while expected < N {
            match consumer_queue.pop() {
                Some(value) => {
                    assert_eq!(value, expected, "FIFO violation at {expected}");
                    expected += 1;
                }
                None => thread::yield_now(),
            }
        }
        expected
    });

    producer.join().unwrap();
    let consumed = consumer.join().unwrap();
    assert_eq!(consumed, N);
    assert!(queue.is_empty());
}

#[test]
fn full_queue_rejects_push_until_consumer_drains_a_slot() {
    let queue = Arc::new(IndexQueue::new(4));
    for v in 0..4 {
        assert!(queue.push(v));
    }
    assert!(!queue.push(99));

    let drain_queue = queue.clone();
    let drainer = thread::spawn(move || drain_queue.pop());
    let popped = drainer.join().unwrap();
    assert_eq!(popped, Some(0));
    assert!(queue.push(4));
}
