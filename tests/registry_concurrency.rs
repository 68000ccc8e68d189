//! Concurrent registration scenarios for the thread registry (C5, §8 S2
//! and P3): many OS threads racing to claim slots must never observe the
//! same slot index twice, and the registry must settle at exactly its
//! configured capacity of active slots.

use ada_trace::{RegisterError, RegistryConfig, ThreadRegistry};
use std::collections::HashSet;
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

#[test]
fn concurrent_registration_never_hands_out_the_same_slot_twice() {
    const CAPACITY: usize = 16;
    let registry = Arc::new(ThreadRegistry::create_owned(RegistryConfig::new(CAPACITY, 64, 64, 2)));
    let barrier = Arc::new(Barrier::new(CAPACITY));
    let claimed = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..CAPACITY as u32)
        .map(|thread_id| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            let claimed = claimed.clone();
            thread::spawn(move || {
                barrier.wait();
                let lane_set = registry.register(thread_id).expect("capacity matches thread count");
                let mut seen = claimed.lock().unwrap();
                assert!(
                    seen.insert(lane_set.slot_index()),
                    "slot {} handed out twice",
                    lane_set.slot_index()
                );
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.get_active_count(), CAPACITY);
    assert_eq!(claimed.lock().unwrap().len(), CAPACITY);
}

#[test]
fn registration_past_capacity_fails_until_a_slot_is_freed() {
    const CAPACITY: usize = 4;
    let registry = Arc::new(ThreadRegistry::create_owned(RegistryConfig::new(CAPACITY, 64, 64, 2)));
    let barrier = Arc::new(Barrier::new(CAPACITY));

    let handles: Vec<_> = (0..CAPACITY as u32)
        .map(|thread_id| {
            let registry = registry.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                registry.register(thread_id).is_ok()
            })
        })
        .collect();

    let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.iter().all(|&ok| ok));
    assert_eq!(registry.get_active_count(), CAPACITY);

    assert_eq!(registry.register(999), Err(RegisterError));

    registry.unregister_by_id(0);
    assert!(registry.register(999).is_ok());
    assert_eq!(registry.get_active_count(), CAPACITY);
}

#[test]
fn iter_active_reflects_concurrent_unregistrations() {
    const CAPACITY: usize = 8;
    let registry = Arc::new(ThreadRegistry::create_owned(RegistryConfig::new(CAPACITY, 64, 64, 2)));
    for id in 0..CAPACITY as u32 {
        registry.register(id).unwrap();
    }

    let handles: Vec<_> = (0..CAPACITY as u32)
        .filter(|id| id % 2 == 0)
        .map(|id| {
            let registry = registry.clone();
            thread::spawn(move || registry.unregister_by_id(id))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let remaining: Vec<u32> = registry.iter_active().map(|(info, _)| info.thread_id).collect();
    assert_eq!(remaining.len(), CAPACITY / 2);
    assert!(remaining.iter().all(|id| id % 2 == 1));
}
