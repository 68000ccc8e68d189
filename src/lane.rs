//! C4: ring pool + lane (§4.3).
//!
//! A [`Lane<T>`] binds a small pool of rings (2-8, typically) to one
//! logical stream (index or detail) for one thread. Like [`crate::RawRing`]
//! it is a pointer-based view over a caller-provided region: the region is
//! almost always a slice of the thread registry's shared arena, so the
//! same bytes are valid on both sides of the controller/agent process
//! boundary. [`LaneSet`] pairs an index lane with a detail lane plus the
//! small amount of per-thread bookkeeping the drain needs to read back
//! (events generated, whether the slot is live).

use crate::index_queue::{index_queue_total_size, IndexQueueError, RawIndexQueue};
use crate::ring::{ring_total_size, RawRing, RingError, RingHeader};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

/// Returned by [`Lane::swap_active`] when the pool has no free ring to
/// swap in. Non-fatal (§7 `Resource`): the caller keeps writing into the
/// (full) active ring, which fails and bumps its overflow counter until
/// the drain returns a ring to the free queue.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("lane ring pool exhausted: no free ring available")]
pub struct PoolExhausted;

/// Errors creating or attaching to a lane's backing region.
#[derive(Debug, Error)]
pub enum LaneError {
    #[error("lane needs at least 2 rings per pool, got {0}")]
    TooFewRings(usize),
    #[error("region of {available} bytes is too small for a lane (need {needed})")]
    RegionTooSmall { available: usize, needed: usize },
    #[error("lane header magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error(transparent)]
    IndexQueue(#[from] IndexQueueError),
}

const LANE_MAGIC: u32 = 0x0000_ADA2;

#[repr(C)]
struct LaneHeader {
    magic: u32,
    rings_per_lane: u32,
    ring_capacity: u32,
    _reserved: u32,
    active_index: AtomicU32,
    /// Single-writer boolean (0/1); meaningful for detail lanes only (§4.8).
    marked: AtomicU32,
}

/// Computes the byte size of a lane region for `rings_per_lane` rings of
/// `ring_capacity` events of size `event_size`.
#[must_use]
pub fn lane_total_size(event_size: usize, ring_capacity: u32, rings_per_lane: usize) -> usize {
    let header = std::mem::size_of::<LaneHeader>();
    let rings = rings_per_lane * ring_total_size(event_size, ring_capacity);
    // Free queue needs room for every non-active ring; submitted queue is
    // sized the same so a burst of swaps never blocks on queue capacity.
    let queue_capacity = (rings_per_lane as u32).max(2);
    let queues = 2 * index_queue_total_size(queue_capacity);
    header + rings + queues
}

/// A pointer-based view over one lane's ring pool and free/submitted
/// queues, living inside a caller-provided (usually shared-memory) region.
pub struct Lane<T> {
    header: *mut LaneHeader,
    rings: Vec<RawRing<T>>,
    free: RawIndexQueue,
    submitted: RawIndexQueue,
}

unsafe impl<T: Send> Send for Lane<T> {}
unsafe impl<T: Send> Sync for Lane<T> {}

impl<T: Copy> Lane<T> {
    /// # Safety
    /// - `region` must point to at least
    ///   `lane_total_size(size_of::<T>(), ring_capacity, rings_per_lane)`
    ///   writable bytes, aligned to at least `align_of::<LaneHeader>()`.
    /// - No other party may touch the region until this call returns.
    /// - Must be called exactly once per region.
    pub unsafe fn create_in(
        region: *mut u8,
        region_len: usize,
        ring_capacity: u32,
        rings_per_lane: usize,
    ) -> Result<Self, LaneError> {
        if rings_per_lane < 2 {
            return Err(LaneError::TooFewRings(rings_per_lane));
        }
        let needed = lane_total_size(std::mem::size_of::<T>(), ring_capacity, rings_per_lane);
        if region_len < needed {
            return Err(LaneError::RegionTooSmall {
                available: region_len,
                needed,
            });
        }

        let header_ptr = region.cast::<LaneHeader>();
        unsafe {
            header_ptr.write(LaneHeader {
                magic: LANE_MAGIC,
                rings_per_lane: rings_per_lane as u32,
                ring_capacity,
                _reserved: 0,
                active_index: AtomicU32::new(0),
                marked: AtomicU32::new(0),
            });
        }

        let mut offset = std::mem::size_of::<LaneHeader>();
        let ring_size = ring_total_size(std::mem::size_of::<T>(), ring_capacity);
        let mut rings = Vec::with_capacity(rings_per_lane);
        for _ in 0..rings_per_lane {
            let ring = unsafe { RawRing::<T>::create_in(region.add(offset), ring_size, ring_capacity)? };
            rings.push(ring);
            offset += ring_size;
        }

        let queue_capacity = (rings_per_lane as u32).max(2);
        let queue_size = index_queue_total_size(queue_capacity);
        let free = unsafe { RawIndexQueue::create_in(region.add(offset), queue_size, queue_capacity)? };
        offset += queue_size;
        let submitted = unsafe { RawIndexQueue::create_in(region.add(offset), queue_size, queue_capacity)? };

        // Ring 0 starts active; every other ring starts on the free queue.
        for idx in 1..rings_per_lane as u32 {
            free.push(idx);
        }

        Ok(Self {
            header: header_ptr,
            rings,
            free,
            submitted,
        })
    }

    /// # Safety
    /// `region` must point to a region previously initialized by
    /// [`create_in`](Self::create_in), valid for at least `region_len`
    /// bytes, for the same `T`.
    pub unsafe fn attach(region: *mut u8, region_len: usize) -> Result<Self, LaneError> {
        if region_len < std::mem::size_of::<LaneHeader>() {
            return Err(LaneError::RegionTooSmall {
                available: region_len,
                needed: std::mem::size_of::<LaneHeader>(),
            });
        }
        let header_ptr = region.cast::<LaneHeader>();
        let header = unsafe { &*header_ptr };
        if header.magic != LANE_MAGIC {
            return Err(LaneError::BadMagic {
                expected: LANE_MAGIC,
                found: header.magic,
            });
        }
        let rings_per_lane = header.rings_per_lane as usize;
        let ring_capacity = header.ring_capacity;

        let needed = lane_total_size(std::mem::size_of::<T>(), ring_capacity, rings_per_lane);
        if region_len < needed {
            return Err(LaneError::RegionTooSmall {
                available: region_len,
                needed,
            });
        }

        let mut offset = std::mem::size_of::<LaneHeader>();
        let ring_size = ring_total_size(std::mem::size_of::<T>(), ring_capacity);
        let mut rings = Vec::with_capacity(rings_per_lane);
        for _ in 0..rings_per_lane {
            let ring = unsafe { RawRing::<T>::attach(region.add(offset), ring_size)? };
            rings.push(ring);
            offset += ring_size;
        }

        let queue_capacity = (rings_per_lane as u32).max(2);
        let queue_size = index_queue_total_size(queue_capacity);
        let free = unsafe { RawIndexQueue::attach(region.add(offset), queue_size)? };
        offset += queue_size;
        let submitted = unsafe { RawIndexQueue::attach(region.add(offset), queue_size)? };

        Ok(Self {
            header: header_ptr,
            rings,
            free,
            submitted,
        })
    }

    #[inline]
    fn header(&self) -> &LaneHeader {
        unsafe { &*self.header }
    }

    #[inline]
    #[must_use]
    pub fn rings_per_lane(&self) -> usize {
        self.rings.len()
    }

    /// Fast path for the producer: the header of the ring currently being
    /// written into.
    #[inline]
    #[must_use]
    pub fn get_active_header(&self) -> &RingHeader {
        let idx = self.header().active_index.load(Ordering::Relaxed) as usize;
        self.rings[idx].header()
    }

    /// Index of the ring currently being written into. The drain uses this
    /// to batch-read the active ring in place, without waiting for it to
    /// be submitted first.
    #[inline]
    #[must_use]
    pub fn active_index(&self) -> u32 {
        self.header().active_index.load(Ordering::Relaxed)
    }

    /// Writes one event into the active ring without swapping, for callers
    /// that have already decided not to swap on failure.
    #[inline]
    pub fn write_active(&self, event: T) -> bool {
        let idx = self.header().active_index.load(Ordering::Relaxed) as usize;
        self.rings[idx].write(event)
    }

    /// Submits the active ring, pops a free ring, and makes it active.
    /// Pops from `free` before submitting the old active ring so an
    /// exhausted pool leaves the existing active ring untouched (§4.3).
    pub fn swap_active(&self) -> Result<(), PoolExhausted> {
        let Some(new_idx) = self.free.pop() else {
            return Err(PoolExhausted);
        };
        let old_idx = self.header().active_index.swap(new_idx, Ordering::AcqRel);
        let submitted = self.submitted.push(old_idx);
        debug_assert!(submitted, "submitted queue must have room for every non-active ring");
        Ok(())
    }

    /// Baseline exhaustion policy: no-op, rely on the drain returning
    /// rings. Returns `false` (capacity was not recovered). Pluggable
    /// alternatives (drop-oldest, spin-wait) can be layered by the caller
    /// around [`swap_active`](Self::swap_active) without changing this type.
    #[inline]
    #[must_use]
    pub fn handle_exhaustion(&self) -> bool {
        false
    }

    /// Marks the lane's current window as containing an event of
    /// interest. Detail lane only; single-writer.
    #[inline]
    pub fn mark(&self) {
        self.header().marked.store(1, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn is_marked(&self) -> bool {
        self.header().marked.load(Ordering::Relaxed) != 0
    }

    #[inline]
    pub fn clear_mark(&self) {
        self.header().marked.store(0, Ordering::Relaxed);
    }

    // --- drain-side operations ---

    #[inline]
    pub fn submit_ring(&self, idx: u32) -> bool {
        self.submitted.push(idx)
    }

    #[inline]
    #[must_use]
    pub fn take_ring(&self) -> Option<u32> {
        self.submitted.pop()
    }

    #[inline]
    pub fn return_ring(&self, idx: u32) -> bool {
        self.free.push(idx)
    }

    #[inline]
    #[must_use]
    pub fn get_free_ring(&self) -> Option<u32> {
        self.free.pop()
    }

    #[inline]
    #[must_use]
    pub fn ring_header(&self, idx: u32) -> Option<&RingHeader> {
        self.rings.get(idx as usize).map(RawRing::header)
    }

    #[inline]
    pub fn read_ring_batch(&self, idx: u32, dst: &mut [T], max: usize) -> usize {
        match self.rings.get(idx as usize) {
            Some(ring) => ring.read_batch(dst, max),
            None => 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn free_depth(&self) -> u32 {
        self.free.size_estimate()
    }

    #[inline]
    #[must_use]
    pub fn submitted_depth(&self) -> u32 {
        self.submitted.size_estimate()
    }
}

/// Per-thread bookkeeping shared between the producer and the drain:
/// events generated and whether the slot is currently live. Small enough
/// to sit directly in shared memory alongside the two lanes.
#[repr(C)]
struct LaneSetHeader {
    events_generated: AtomicU64,
    active: AtomicU32,
}

/// One thread's index lane + detail lane + shared bookkeeping (§3 "Lane-set").
pub struct LaneSet {
    header: *mut LaneSetHeader,
    pub index: Lane<crate::event::IndexEvent>,
    pub detail: Lane<crate::event::DetailEvent>,
    slot_index: usize,
}

unsafe impl Send for LaneSet {}
unsafe impl Sync for LaneSet {}

impl LaneSet {
    #[must_use]
    pub fn layout_size(
        index_ring_capacity: u32,
        detail_ring_capacity: u32,
        rings_per_lane: usize,
    ) -> usize {
        std::mem::size_of::<LaneSetHeader>()
            + lane_total_size(
                std::mem::size_of::<crate::event::IndexEvent>(),
                index_ring_capacity,
                rings_per_lane,
            )
            + lane_total_size(
                std::mem::size_of::<crate::event::DetailEvent>(),
                detail_ring_capacity,
                rings_per_lane,
            )
    }

    /// # Safety
    /// `region` must point to at least
    /// `layout_size(index_ring_capacity, detail_ring_capacity, rings_per_lane)`
    /// writable bytes and must not be touched by any other party until
    /// this call returns.
    pub unsafe fn create_in(
        region: *mut u8,
        region_len: usize,
        index_ring_capacity: u32,
        detail_ring_capacity: u32,
        rings_per_lane: usize,
        slot_index: usize,
    ) -> Result<Self, LaneError> {
        let needed = Self::layout_size(index_ring_capacity, detail_ring_capacity, rings_per_lane);
        if region_len < needed {
            return Err(LaneError::RegionTooSmall {
                available: region_len,
                needed,
            });
        }
        let header_ptr = region.cast::<LaneSetHeader>();
        unsafe {
            header_ptr.write(LaneSetHeader {
                events_generated: AtomicU64::new(0),
                active: AtomicU32::new(0),
            });
        }
        let mut offset = std::mem::size_of::<LaneSetHeader>();
        let index_size = lane_total_size(
            std::mem::size_of::<crate::event::IndexEvent>(),
            index_ring_capacity,
            rings_per_lane,
        );
        let index = unsafe {
            Lane::create_in(region.add(offset), index_size, index_ring_capacity, rings_per_lane)?
        };
        offset += index_size;
        let detail_size = lane_total_size(
            std::mem::size_of::<crate::event::DetailEvent>(),
            detail_ring_capacity,
            rings_per_lane,
        );
        let detail = unsafe {
            Lane::create_in(region.add(offset), detail_size, detail_ring_capacity, rings_per_lane)?
        };

        Ok(Self {
            header: header_ptr,
            index,
            detail,
            slot_index,
        })
    }

    /// # Safety
    /// `region` must point to a region previously initialized by
    /// [`create_in`](Self::create_in) with the same ring capacities and
    /// `rings_per_lane`.
    pub unsafe fn attach(
        region: *mut u8,
        region_len: usize,
        index_ring_capacity: u32,
        detail_ring_capacity: u32,
        rings_per_lane: usize,
        slot_index: usize,
    ) -> Result<Self, LaneError> {
        let needed = Self::layout_size(index_ring_capacity, detail_ring_capacity, rings_per_lane);
        if region_len < needed {
            return Err(LaneError::RegionTooSmall {
                available: region_len,
                needed,
            });
        }
        let header_ptr = region.cast::<LaneSetHeader>();
        let mut offset = std::mem::size_of::<LaneSetHeader>();
        let index_size = lane_total_size(
            std::mem::size_of::<crate::event::IndexEvent>(),
            index_ring_capacity,
            rings_per_lane,
        );
        let index = unsafe { Lane::attach(region.add(offset), index_size)? };
        offset += index_size;
        let detail_size = lane_total_size(
            std::mem::size_of::<crate::event::DetailEvent>(),
            detail_ring_capacity,
            rings_per_lane,
        );
        let detail = unsafe { Lane::attach(region.add(offset), detail_size)? };

        Ok(Self {
            header: header_ptr,
            index,
            detail,
            slot_index,
        })
    }

    #[inline]
    fn header(&self) -> &LaneSetHeader {
        unsafe { &*self.header }
    }

    #[inline]
    #[must_use]
    pub fn slot_index(&self) -> usize {
        self.slot_index
    }

    #[inline]
    pub fn record_event(&self) {
        self.header().events_generated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    #[must_use]
    pub fn events_generated(&self) -> u64 {
        self.header().events_generated.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_active(&self, active: bool) {
        self.header().active.store(u32::from(active), Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.header().active.load(Ordering::Acquire) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DetailEvent, IndexEvent};

    #[test]
    fn swap_active_cycles_through_the_pool() {
        let size = lane_total_size(std::mem::size_of::<u64>(), 4, 3);
        let mut region = vec![0u8; size];
        let lane: Lane<u64> = unsafe { Lane::create_in(region.as_mut_ptr(), size, 4, 3).unwrap() };

        assert!(lane.write_active(1));
        assert!(lane.write_active(2));
        assert!(lane.write_active(3));
        assert!(lane.write_active(4));
        assert!(!lane.write_active(5)); // active ring (capacity 4) is full

        lane.swap_active().unwrap();
        assert!(lane.write_active(6));

        assert_eq!(lane.take_ring(), Some(0));
        assert!(lane.return_ring(0));
    }

    #[test]
    fn swap_active_fails_when_pool_exhausted() {
        let size = lane_total_size(std::mem::size_of::<u64>(), 2, 2);
        let mut region = vec![0u8; size];
        let lane: Lane<u64> = unsafe { Lane::create_in(region.as_mut_ptr(), size, 2, 2).unwrap() };

        // Only one free ring exists; exhaust it.
        lane.swap_active().unwrap();
        assert_eq!(lane.swap_active(), Err(PoolExhausted));
    }

    #[test]
    fn lane_set_round_trips_index_and_detail_events() {
        let size = LaneSet::layout_size(4, 4, 2);
        let mut region = vec![0u8; size];
        let lane_set = unsafe { LaneSet::create_in(region.as_mut_ptr(), size, 4, 4, 2, 0).unwrap() };

        let idx_ev = IndexEvent::new(1, 0, 1, crate::event::EventKind::Call, 0);
        assert!(lane_set.index.write_active(idx_ev));
        lane_set.record_event();
        assert_eq!(lane_set.events_generated(), 1);

        let detail_ev = DetailEvent::zeroed();
        assert!(lane_set.detail.write_active(detail_ev));

        lane_set.set_active(true);
        assert!(lane_set.is_active());
    }
}
