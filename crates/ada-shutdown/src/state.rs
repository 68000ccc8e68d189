//! Per-thread shutdown bookkeeping (§4.9): the side of the shutdown
//! protocol that tracks whether each registry slot is still accepting
//! events, whether a flush has been requested of it, and how many events
//! are still in flight for it.
//!
//! This is separate from [`crate::ShutdownManager`]'s own phase/reason
//! state: `ShutdownState` is indexed by registry slot and updated by the
//! owning producer thread (on quiesce) and by the drain (on
//! flush-complete), matching §9's "shared-resource discipline" note.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStateError {
    #[error("shutdown state slot index {index} out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },
}

/// One registry slot's view into the shutdown protocol.
#[derive(Debug, Default)]
pub struct ThreadShutdownRecord {
    accepting_events: AtomicBool,
    flush_requested: AtomicBool,
    flush_complete: AtomicBool,
    pending_events: AtomicU64,
}

impl ThreadShutdownRecord {
    #[must_use]
    pub fn accepting_events(&self) -> bool {
        self.accepting_events.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn flush_requested(&self) -> bool {
        self.flush_requested.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn flush_complete(&self) -> bool {
        self.flush_complete.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn pending_events(&self) -> u64 {
        self.pending_events.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.accepting_events.store(false, Ordering::Release);
        self.flush_requested.store(false, Ordering::Release);
        self.flush_complete.store(false, Ordering::Release);
        self.pending_events.store(0, Ordering::Release);
    }
}

/// Fixed-capacity table of per-slot shutdown records, one per registry
/// slot (§4.4's `C`), plus a cached active-thread counter so the shutdown
/// summary doesn't have to rescan the registry itself.
#[derive(Debug)]
pub struct ShutdownState {
    records: Box<[ThreadShutdownRecord]>,
    active_count: AtomicUsize,
}

impl ShutdownState {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let mut records = Vec::with_capacity(capacity);
        records.resize_with(capacity, ThreadShutdownRecord::default);
        Self {
            records: records.into_boxed_slice(),
            active_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    pub fn record(&self, slot: usize) -> Result<&ThreadShutdownRecord, ShutdownStateError> {
        self.records.get(slot).ok_or(ShutdownStateError::SlotOutOfRange {
            index: slot,
            capacity: self.capacity(),
        })
    }

    /// Marks `slot` as live and accepting events. Called by the owning
    /// producer thread on registration.
    pub fn mark_active(&self, slot: usize) -> Result<(), ShutdownStateError> {
        let rec = self.record(slot)?;
        if !rec.accepting_events.swap(true, Ordering::AcqRel) {
            self.active_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Quiesces `slot`: stops accepting events and zeroes its counters.
    /// Round-trip property (§8): `mark_active` then `mark_inactive` on the
    /// same slot returns `accepting_events` to false with
    /// `pending_events == 0`.
    pub fn mark_inactive(&self, slot: usize) -> Result<(), ShutdownStateError> {
        let rec = self.record(slot)?;
        if rec.accepting_events.swap(false, Ordering::AcqRel) {
            self.active_count.fetch_sub(1, Ordering::Relaxed);
        }
        rec.reset();
        Ok(())
    }

    pub fn request_flush(&self, slot: usize) -> Result<(), ShutdownStateError> {
        self.record(slot)?.flush_requested.store(true, Ordering::Release);
        Ok(())
    }

    pub fn set_pending_events(&self, slot: usize, n: u64) -> Result<(), ShutdownStateError> {
        self.record(slot)?.pending_events.store(n, Ordering::Relaxed);
        Ok(())
    }

    /// Called by the drain once it has fully flushed a slot's rings.
    pub fn complete_flush(&self, slot: usize) -> Result<(), ShutdownStateError> {
        self.record(slot)?.flush_complete.store(true, Ordering::Release);
        Ok(())
    }

    /// Sum of `pending_events` across all slots, capped at
    /// `capacity * per_slot_cap` (§4.9 summary: "events in flight ...
    /// capped at C x per-slot").
    #[must_use]
    pub fn total_pending(&self, per_slot_cap: u64) -> u64 {
        let sum: u64 = self.records.iter().map(ThreadShutdownRecord::pending_events).sum();
        let ceiling = (self.capacity() as u64).saturating_mul(per_slot_cap);
        sum.min(ceiling)
    }

    /// `(flushed, total)` — how many of the currently-active slots have
    /// completed their flush, out of how many were active when shutdown
    /// began draining.
    #[must_use]
    pub fn threads_flushed(&self) -> (usize, usize) {
        let mut flushed = 0;
        let mut total = 0;
        for rec in self.records.iter() {
            if rec.flush_requested() {
                total += 1;
                if rec.flush_complete() {
                    flushed += 1;
                }
            }
        }
        (flushed, total)
    }

    /// Resets every slot to its zero state (test/reuse helper).
    pub fn reset_all(&self) {
        for rec in self.records.iter() {
            rec.reset();
        }
        self.active_count.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_active_then_inactive_round_trips_to_zero() {
        let state = ShutdownState::new(4);
        state.mark_active(1).unwrap();
        state.set_pending_events(1, 42).unwrap();
        assert!(state.record(1).unwrap().accepting_events());
        assert_eq!(state.active_count(), 1);

        state.mark_inactive(1).unwrap();
        let rec = state.record(1).unwrap();
        assert!(!rec.accepting_events());
        assert_eq!(rec.pending_events(), 0);
        assert_eq!(state.active_count(), 0);
    }

    #[test]
    fn slot_out_of_range_is_rejected() {
        let state = ShutdownState::new(2);
        assert!(matches!(
            state.mark_active(5),
            Err(ShutdownStateError::SlotOutOfRange { index: 5, capacity: 2 })
        ));
    }

    #[test]
    fn total_pending_is_capped_at_capacity_times_per_slot() {
        let state = ShutdownState::new(2);
        state.set_pending_events(0, 1000).unwrap();
        state.set_pending_events(1, 1000).unwrap();
        assert_eq!(state.total_pending(256), 512);
    }

    #[test]
    fn threads_flushed_counts_only_requested_slots() {
        let state = ShutdownState::new(3);
        state.request_flush(0).unwrap();
        state.request_flush(1).unwrap();
        state.complete_flush(0).unwrap();
        assert_eq!(state.threads_flushed(), (1, 2));
    }
}
