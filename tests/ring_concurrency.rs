//! Multi-threaded round-trip scenarios for the SPSC ring (C2, §8 P1),
//! matching the teacher's `tests/integration_tests.rs` style: real
//! `std::thread` producer/consumer pairs instead of single-threaded
//! simulation.

use ada_trace::{EventKind, IndexEvent, Ring, RingConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn single_producer_single_consumer_preserves_order_across_threads() {
    const N: u64 = 50_000;
    let ring = Arc::new(Ring::<IndexEvent>::new(RingConfig::new(1024)));

    let producer_ring = ring.clone();
    let producer = thread::spawn(move || {
        let mut i = 0u64;
        while i < N {
            let event = IndexEvent::new(i, 0, 0, EventKind::Call, 0).with_thread(7);
            if producer_ring.write(event) {
                i += 1;
            } else {
                thread::yield_now();
            }
        }
    });

    let consumer_ring = ring.clone();
    let consumer = thread::spawn(move || {
        let mut expected = 0u64;
        let mut buf = vec![IndexEvent::zeroed(); 256];
        while expected < N {
            let n = consumer_ring.read_batch(&mut buf, buf.len());
            for event in &buf[..n] {
                assert_eq!(event.timestamp_ns, expected, "FIFO violation at {expected}");
                assert_eq!(event.thread_id, 7);
                expected += 1;
            }
            if n == 0 {
                thread::yield_now();
            }
        }
        expected
    });

    producer.join().unwrap();
    let consumed = consumer.join().unwrap();
    assert_eq!(consumed, N);
    assert_eq!(ring.overflow_count(), 0);
}

#[test]
fn producer_stops_writing_past_capacity_when_consumer_is_slow() {
    let ring = Arc::new(Ring::<IndexEvent>::new(RingConfig::new(4)));
    let stop = Arc::new(AtomicBool::new(false));

    // Fill the ring completely with no consumer running.
    for i in 0..4 {
        assert!(ring.write(IndexEvent::new(i, 0, 0, EventKind::Call, 0)));
    }
    assert!(!ring.write(IndexEvent::new(99, 0, 0, EventKind::Call, 0)));
    assert_eq!(ring.overflow_count(), 1);

    let consumer_ring = ring.clone();
    let consumer_stop = stop.clone();
    let consumer = thread::spawn(move || {
        let mut out = IndexEvent::zeroed();
        let mut drained = 0u64;
        while !consumer_stop.load(Ordering::Acquire) || ring_nonempty(&consumer_ring) {
            if consumer_ring.read(&mut out) {
                drained += 1;
            } else {
                thread::yield_now();
            }
        }
        drained
    });

    stop.store(true, Ordering::Release);
    let drained = consumer.join().unwrap();
    assert_eq!(drained, 4);
    assert!(ring.write(IndexEvent::new(100, 0, 0, EventKind::Call, 0)));
}

fn ring_nonempty(ring: &Ring<IndexEvent>) -> bool {
    ring.available_read() > 0
}
