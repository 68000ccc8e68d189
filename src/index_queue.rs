//! C3: the wait-free SPSC index queue (§4.2).
//!
//! Structurally this is [`crate::ring::Ring`]'s sibling: same single
//! producer / single consumer algorithm, but it carries bare `u32` ring
//! indices (for free⇄submitted handoff inside a [`crate::Lane`]) rather
//! than fixed-size event records, and it has no overflow counter — a full
//! push is reported to the caller directly, there is nothing to meter.
//!
//! Unlike the ring (which *rejects* a non-power-of-two capacity at
//! create/attach time), the index queue accepts any `capacity >= 2` and
//! rounds the backing buffer up to the next power of two internally so the
//! hot path can still mask instead of mod; `capacity()` reports the
//! caller-requested value; the extra rounded-up slots are simply never
//! used, which keeps "full" meaning what the caller asked for.

use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

/// Errors returned when creating or attaching to an index queue.
#[derive(Debug, Error)]
pub enum IndexQueueError {
    #[error("index queue capacity {0} must be at least 2")]
    CapacityTooSmall(u32),
    #[error("region of {available} bytes is too small for an index queue of capacity {capacity}")]
    RegionTooSmall { available: usize, capacity: u32 },
    #[error("index queue header magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },
}

const INDEX_QUEUE_MAGIC: u32 = 0x0000_ADA1;

#[repr(C)]
struct IndexQueueHeader {
    magic: u32,
    /// Caller-requested logical capacity; governs the full/empty check.
    capacity: u32,
    /// `capacity` rounded up to a power of two; governs the slot mask.
    slot_capacity: u32,
    _reserved: u32,
    write_pos: CachePadded<AtomicU32>,
    read_pos: CachePadded<AtomicU32>,
}

impl IndexQueueHeader {
    fn init(capacity: u32) -> Self {
        Self {
            magic: INDEX_QUEUE_MAGIC,
            capacity,
            slot_capacity: capacity.next_power_of_two(),
            _reserved: 0,
            write_pos: CachePadded::new(AtomicU32::new(0)),
            read_pos: CachePadded::new(AtomicU32::new(0)),
        }
    }

    #[inline]
    fn mask(&self) -> u32 {
        self.slot_capacity - 1
    }
}

#[must_use]
pub const fn index_queue_total_size(capacity: u32) -> usize {
    std::mem::size_of::<IndexQueueHeader>() + capacity.next_power_of_two() as usize * 4
}

mod ops {
    use super::IndexQueueHeader;
    use std::sync::atomic::Ordering;

    /// # Safety
    /// `buf` must point to at least `header.slot_capacity` valid `u32` slots,
    /// written to only by a single producer.
    pub(super) unsafe fn push(header: &IndexQueueHeader, buf: *mut u32, value: u32) -> bool {
        let read = header.read_pos.load(Ordering::Acquire);
        let write = header.write_pos.load(Ordering::Relaxed);
        if write.wrapping_sub(read) == header.capacity {
            return false;
        }
        let idx = (write & header.mask()) as usize;
        unsafe { std::ptr::write(buf.add(idx), value) };
        header.write_pos.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// # Safety
    /// `buf` must point to at least `header.slot_capacity` valid `u32` slots,
    /// read from only by a single consumer.
    pub(super) unsafe fn pop(header: &IndexQueueHeader, buf: *const u32) -> Option<u32> {
        let write = header.write_pos.load(Ordering::Acquire);
        let read = header.read_pos.load(Ordering::Relaxed);
        if read == write {
            return None;
        }
        let idx = (read & header.mask()) as usize;
        let value = unsafe { std::ptr::read(buf.add(idx)) };
        header.read_pos.store(read.wrapping_add(1), Ordering::Release);
        Some(value)
    }
}

/// Owning, heap-backed index queue. Used directly in tests and by
/// in-process fallback paths; the registry embeds the pointer-based
/// [`RawIndexQueue`] inline in shared memory for the real cross-process
/// free/submitted handoff.
pub struct IndexQueue {
    header: Box<IndexQueueHeader>,
    buffer: Box<[UnsafeCell<MaybeUninit<u32>>]>,
}

unsafe impl Send for IndexQueue {}
unsafe impl Sync for IndexQueue {}

impl IndexQueue {
    /// # Panics
    /// Panics if `capacity < 2`.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        assert!(capacity >= 2, "index queue capacity must be at least 2");
        let slot_capacity = capacity.next_power_of_two();
        let mut buffer = Vec::with_capacity(slot_capacity as usize);
        buffer.resize_with(slot_capacity as usize, || UnsafeCell::new(MaybeUninit::uninit()));
        Self {
            header: Box::new(IndexQueueHeader::init(capacity)),
            buffer: buffer.into_boxed_slice(),
        }
    }

    #[inline]
    fn buffer_ptr(&self) -> *mut u32 {
        self.buffer[0].get().cast()
    }

    #[inline]
    pub fn push(&self, value: u32) -> bool {
        unsafe { ops::push(&self.header, self.buffer_ptr(), value) }
    }

    #[inline]
    pub fn pop(&self) -> Option<u32> {
        unsafe { ops::pop(&self.header, self.buffer_ptr().cast_const()) }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.header.capacity
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size_estimate() == 0
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size_estimate() == self.header.capacity
    }

    /// Non-atomic snapshot of occupancy. Diagnostics only: racing
    /// producer/consumer activity can make two successive calls disagree
    /// about direction of travel.
    #[inline]
    #[must_use]
    pub fn size_estimate(&self) -> u32 {
        let write = self.header.write_pos.load(Ordering::Relaxed);
        let read = self.header.read_pos.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }
}

/// Header-only view over an index queue living in a caller-provided
/// (typically shared-memory) region.
pub struct RawIndexQueue {
    header: *mut IndexQueueHeader,
    buffer: *mut u32,
    _marker: PhantomData<*mut u32>,
}

unsafe impl Send for RawIndexQueue {}
unsafe impl Sync for RawIndexQueue {}

impl RawIndexQueue {
    /// # Safety
    /// - `region` must point to at least `index_queue_total_size(capacity)` writable bytes.
    /// - `region` must be aligned to at least `align_of::<IndexQueueHeader>()`.
    /// - No other party may touch the region until this call returns.
    pub unsafe fn create_in(
        region: *mut u8,
        region_len: usize,
        capacity: u32,
    ) -> Result<Self, IndexQueueError> {
        if capacity < 2 {
            return Err(IndexQueueError::CapacityTooSmall(capacity));
        }
        let needed = index_queue_total_size(capacity);
        if region_len < needed {
            return Err(IndexQueueError::RegionTooSmall {
                available: region_len,
                capacity,
            });
        }
        let header_ptr = region.cast::<IndexQueueHeader>();
        unsafe { header_ptr.write(IndexQueueHeader::init(capacity)) };
        let buffer = unsafe { region.add(std::mem::size_of::<IndexQueueHeader>()).cast::<u32>() };
        Ok(Self {
            header: header_ptr,
            buffer,
            _marker: PhantomData,
        })
    }

    /// # Safety
    /// `region` must point to a region previously initialized by
    /// [`create_in`](Self::create_in), valid for at least `region_len` bytes.
    pub unsafe fn attach(region: *mut u8, region_len: usize) -> Result<Self, IndexQueueError> {
        if region_len < std::mem::size_of::<IndexQueueHeader>() {
            return Err(IndexQueueError::RegionTooSmall {
                available: region_len,
                capacity: 0,
            });
        }
        let header_ptr = region.cast::<IndexQueueHeader>();
        let header = unsafe { &*header_ptr };
        if header.magic != INDEX_QUEUE_MAGIC {
            return Err(IndexQueueError::BadMagic {
                expected: INDEX_QUEUE_MAGIC,
                found: header.magic,
            });
        }
        let needed = index_queue_total_size(header.capacity);
        if region_len < needed {
            return Err(IndexQueueError::RegionTooSmall {
                available: region_len,
                capacity: header.capacity,
            });
        }
        let buffer = unsafe { region.add(std::mem::size_of::<IndexQueueHeader>()).cast::<u32>() };
        Ok(Self {
            header: header_ptr,
            buffer,
            _marker: PhantomData,
        })
    }

    #[inline]
    fn header(&self) -> &IndexQueueHeader {
        unsafe { &*self.header }
    }

    #[inline]
    pub fn push(&self, value: u32) -> bool {
        unsafe { ops::push(self.header(), self.buffer, value) }
    }

    #[inline]
    pub fn pop(&self) -> Option<u32> {
        unsafe { ops::pop(self.header(), self.buffer.cast_const()) }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.header().capacity
    }

    #[inline]
    #[must_use]
    pub fn size_estimate(&self) -> u32 {
        let header = self.header();
        let write = header.write_pos.load(Ordering::Relaxed);
        let read = header.read_pos.load(Ordering::Relaxed);
        write.wrapping_sub(read)
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size_estimate() == 0
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size_estimate() == self.header().capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_round_trip() {
        let q = IndexQueue::new(4);
        assert!(q.push(10));
        assert!(q.push(20));
        assert_eq!(q.pop(), Some(10));
        assert_eq!(q.pop(), Some(20));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn rejects_push_past_logical_capacity_even_when_rounded_up() {
        // capacity 3 rounds the backing buffer up to 4 slots, but "full"
        // still means 3 in-flight entries, not 4.
        let q = IndexQueue::new(3);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(q.push(3));
        assert!(!q.push(4));
        assert!(q.is_full());
    }

    #[test]
    fn raw_index_queue_round_trips_over_a_region() {
        let size = index_queue_total_size(4);
        let mut region = vec![0u8; size];
        let ptr = region.as_mut_ptr();
        unsafe {
            let producer = RawIndexQueue::create_in(ptr, size, 4).unwrap();
            assert!(producer.push(7));
            let consumer = RawIndexQueue::attach(ptr, size).unwrap();
            assert_eq!(consumer.pop(), Some(7));
        }
    }

    #[test]
    fn capacity_of_two_is_legal_for_the_index_queue() {
        let q = IndexQueue::new(2);
        assert!(q.push(1));
        assert!(q.push(2));
        assert!(!q.push(3));
    }
}
