//! C2: the wait-free SPSC ring buffer (§4.1).
//!
//! [`Ring<T>`] is the owning, heap-backed ring used when a producer and its
//! drain both live in this process (tests, and the in-process fallback
//! path). [`RawRing<T>`] is the "header-only" variant: it interprets a
//! caller-provided byte region (typically inside a shared-memory arena) as
//! a ring without taking ownership of that memory, for consumers that
//! reconstruct a view over shared memory (the drain attaching to a lane's
//! active ring, a diagnostics tool walking the registry). Both share the
//! same wait-free algorithm, implemented once in the private `ops` module.

use crate::invariants::{debug_assert_bounded_count, debug_assert_magic_checked};
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use thiserror::Error;

/// Magic value every ring header carries so cross-process attaches can
/// detect a stale or foreign region before trusting anything else in it
/// (I5).
pub const RING_MAGIC: u32 = 0x0000_ADA0;

/// Current on-disk/on-wire format version for [`RingHeader`].
pub const RING_FORMAT_VERSION: u32 = 1;

/// Errors returned when creating or attaching to a ring.
#[derive(Debug, Error)]
pub enum RingError {
    #[error("ring capacity {0} is not a power of two")]
    NotPowerOfTwo(u32),
    #[error("ring capacity {0} must be at least 2 events")]
    CapacityTooSmall(u32),
    #[error("region of {available} bytes is too small for a ring of capacity {capacity} and event size {event_size}")]
    RegionTooSmall {
        available: usize,
        capacity: u32,
        event_size: usize,
    },
    #[error("event size mismatch: ring header was created with {expected} bytes per event, caller requested {found}")]
    EventSizeMismatch { expected: u32, found: u32 },
    #[error("ring header magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },
    #[error("ring header format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },
}

/// Binary-stable ring header (§3). `write_pos` and `read_pos` are each
/// given their own cache line via [`CachePadded`] so producer and consumer
/// never cause false sharing on each other's counter.
#[repr(C)]
pub struct RingHeader {
    magic: u32,
    format_version: u32,
    event_size: u32,
    capacity: u32,
    write_pos: CachePadded<AtomicU32>,
    read_pos: CachePadded<AtomicU32>,
    overflow_count: AtomicU64,
    reserved: [u64; 4],
}

impl RingHeader {
    fn init(capacity: u32, event_size: u32) -> Self {
        Self {
            magic: RING_MAGIC,
            format_version: RING_FORMAT_VERSION,
            event_size,
            capacity,
            write_pos: CachePadded::new(AtomicU32::new(0)),
            read_pos: CachePadded::new(AtomicU32::new(0)),
            overflow_count: AtomicU64::new(0),
            reserved: [0; 4],
        }
    }

    /// Verifies magic/version/event-size before trusting the rest of the
    /// header (I5). Capacity is trusted once magic checks out, since it is
    /// written exactly once at creation alongside the magic.
    fn verify(&self, expected_event_size: u32) -> Result<(), RingError> {
        if self.magic != RING_MAGIC {
            return Err(RingError::BadMagic {
                expected: RING_MAGIC,
                found: self.magic,
            });
        }
        if self.format_version != RING_FORMAT_VERSION {
            return Err(RingError::UnsupportedVersion {
                expected: RING_FORMAT_VERSION,
                found: self.format_version,
            });
        }
        if self.event_size != expected_event_size {
            return Err(RingError::EventSizeMismatch {
                expected: self.event_size,
                found: expected_event_size,
            });
        }
        debug_assert_magic_checked!(self.magic, RING_MAGIC);
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    fn mask(&self) -> u32 {
        self.capacity - 1
    }

    #[inline]
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    #[inline]
    #[must_use]
    pub fn available_read(&self) -> u32 {
        let write = self.write_pos.load(Ordering::Acquire);
        let read = self.read_pos.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    #[inline]
    #[must_use]
    pub fn available_write(&self) -> u32 {
        self.capacity - self.available_read()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.available_read() == 0
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.available_read() == self.capacity
    }
}

/// Total byte size of a ring (header + payload) for `capacity` events of
/// `event_size` bytes, used when sizing shared-memory regions.
#[must_use]
pub const fn ring_total_size(event_size: usize, capacity: u32) -> usize {
    std::mem::size_of::<RingHeader>() + event_size * capacity as usize
}

// ---------------------------------------------------------------------
// Shared write/read algorithm (§4.1), operating on a header + raw buffer
// pointer. Used by both the owning and the header-only raw ring.
// ---------------------------------------------------------------------
mod ops {
    use super::{debug_assert_bounded_count, RingHeader};
    use std::sync::atomic::Ordering;

    /// # Safety
    /// `buf` must point to at least `header.capacity()` valid, writable
    /// `T` slots, and must be written to only by this function (single
    /// producer).
    pub(super) unsafe fn write<T: Copy>(header: &RingHeader, buf: *mut T, item: T) -> bool {
        let read = header.read_pos.load(Ordering::Acquire);
        let write = header.write_pos.load(Ordering::Relaxed);
        let capacity = header.capacity;

        if write.wrapping_sub(read) == capacity {
            header.overflow_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let idx = (write & header.mask()) as usize;
        unsafe { std::ptr::write(buf.add(idx), item) };
        header.write_pos.store(write.wrapping_add(1), Ordering::Release);
        debug_assert_bounded_count!(write.wrapping_add(1).wrapping_sub(read), capacity);
        true
    }

    /// # Safety
    /// `buf` must point to at least `header.capacity()` valid, readable
    /// `T` slots that were published by a single producer, and must be
    /// read from only by this function (single consumer).
    pub(super) unsafe fn read<T: Copy>(header: &RingHeader, buf: *const T, out: &mut T) -> bool {
        let write = header.write_pos.load(Ordering::Acquire);
        let read = header.read_pos.load(Ordering::Relaxed);

        if read == write {
            return false;
        }

        let idx = (read & header.mask()) as usize;
        *out = unsafe { std::ptr::read(buf.add(idx)) };
        header.read_pos.store(read.wrapping_add(1), Ordering::Release);
        true
    }

    /// # Safety
    /// Same preconditions as [`read`], applied up to `max.min(dst.len())`
    /// times.
    pub(super) unsafe fn read_batch<T: Copy>(
        header: &RingHeader,
        buf: *const T,
        dst: &mut [T],
        max: usize,
    ) -> usize {
        let write = header.write_pos.load(Ordering::Acquire);
        let mut read = header.read_pos.load(Ordering::Relaxed);
        let avail = write.wrapping_sub(read) as usize;
        let to_read = avail.min(max).min(dst.len());

        for slot in dst.iter_mut().take(to_read) {
            let idx = (read & header.mask()) as usize;
            *slot = unsafe { std::ptr::read(buf.add(idx)) };
            read = read.wrapping_add(1);
        }

        if to_read > 0 {
            header.read_pos.store(read, Ordering::Release);
        }
        to_read
    }
}

/// Owning, heap-backed SPSC ring. One producer handle and one consumer may
/// call the respective halves of this API concurrently; calling `write`
/// from two threads (or `read`/`read_batch` from two threads) at once is
/// undefined behavior per the single-producer/single-consumer contract.
pub struct Ring<T> {
    header: Box<RingHeader>,
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T: Copy> Ring<T> {
    #[must_use]
    pub fn new(config: crate::RingConfig) -> Self {
        let capacity = config.capacity();
        let mut buffer = Vec::with_capacity(capacity as usize);
        buffer.resize_with(capacity as usize, || UnsafeCell::new(MaybeUninit::uninit()));
        Self {
            header: Box::new(RingHeader::init(capacity, std::mem::size_of::<T>() as u32)),
            buffer: buffer.into_boxed_slice(),
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.header.capacity()
    }

    #[inline]
    #[must_use]
    pub fn header(&self) -> &RingHeader {
        &self.header
    }

    #[inline]
    fn buffer_ptr(&self) -> *mut T {
        self.buffer[0].get().cast()
    }

    /// Writes a single event. Returns `false` (and bumps the overflow
    /// counter) if the ring is full. Never blocks.
    #[inline]
    pub fn write(&self, event: T) -> bool {
        unsafe { ops::write(&self.header, self.buffer_ptr(), event) }
    }

    /// Reads a single event into `out`. Returns `false` if the ring is
    /// empty. Never blocks.
    #[inline]
    pub fn read(&self, out: &mut T) -> bool {
        unsafe { ops::read(&self.header, self.buffer_ptr().cast_const(), out) }
    }

    /// Reads up to `max` events into `dst`, whichever is smaller, in a
    /// single read-position publish. Returns the number of events read.
    #[inline]
    pub fn read_batch(&self, dst: &mut [T], max: usize) -> usize {
        unsafe { ops::read_batch(&self.header, self.buffer_ptr().cast_const(), dst, max) }
    }

    #[inline]
    #[must_use]
    pub fn available_read(&self) -> u32 {
        self.header.available_read()
    }

    #[inline]
    #[must_use]
    pub fn available_write(&self) -> u32 {
        self.header.available_write()
    }

    #[inline]
    #[must_use]
    pub fn overflow_count(&self) -> u64 {
        self.header.overflow_count()
    }

    /// Resets both positions and the overflow counter to zero.
    ///
    /// Single-threaded test contexts only: this does not attempt to drop
    /// any events currently sitting in the ring, and racing it against a
    /// live producer or consumer is a correctness bug in the caller, not
    /// this type.
    pub fn reset(&self) {
        self.header.write_pos.store(0, Ordering::Relaxed);
        self.header.read_pos.store(0, Ordering::Relaxed);
        self.header.overflow_count.store(0, Ordering::Relaxed);
    }
}

/// Header-only view over a ring living in a caller-provided (often shared
/// memory) region. Does not own or free the region; the caller is
/// responsible for its lifetime.
pub struct RawRing<T> {
    header: *mut RingHeader,
    buffer: *mut T,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send> Send for RawRing<T> {}
unsafe impl<T: Send> Sync for RawRing<T> {}

impl<T: Copy> RawRing<T> {
    /// Initializes a brand-new ring header and returns a view over it.
    ///
    /// # Safety
    /// - `region` must point to at least `ring_total_size(size_of::<T>(), capacity)` writable bytes.
    /// - `region` must be aligned to at least `align_of::<RingHeader>()`.
    /// - No other party may read or write this region until `create_in` returns.
    /// - The caller must call this exactly once per region (I5: magic/version/capacity are written once).
    pub unsafe fn create_in(
        region: *mut u8,
        region_len: usize,
        capacity: u32,
    ) -> Result<Self, RingError> {
        if !capacity.is_power_of_two() {
            return Err(RingError::NotPowerOfTwo(capacity));
        }
        if capacity < 2 {
            return Err(RingError::CapacityTooSmall(capacity));
        }
        let event_size = std::mem::size_of::<T>();
        let needed = ring_total_size(event_size, capacity);
        if region_len < needed {
            return Err(RingError::RegionTooSmall {
                available: region_len,
                capacity,
                event_size,
            });
        }

        let header_ptr = region.cast::<RingHeader>();
        unsafe { header_ptr.write(RingHeader::init(capacity, event_size as u32)) };
        let buffer = unsafe { region.add(std::mem::size_of::<RingHeader>()).cast::<T>() };

        Ok(Self {
            header: header_ptr,
            buffer,
            _marker: PhantomData,
        })
    }

    /// Attaches to an existing ring header, verifying magic/version/event
    /// size before trusting it (I5).
    ///
    /// # Safety
    /// - `region` must point to a region previously initialized by
    ///   [`create_in`](Self::create_in) with the same `T`, valid for at
    ///   least `region_len` bytes.
    /// - `region` must be aligned to at least `align_of::<RingHeader>()`.
    pub unsafe fn attach(region: *mut u8, region_len: usize) -> Result<Self, RingError> {
        if region_len < std::mem::size_of::<RingHeader>() {
            return Err(RingError::RegionTooSmall {
                available: region_len,
                capacity: 0,
                event_size: std::mem::size_of::<T>(),
            });
        }
        let header_ptr = region.cast::<RingHeader>();
        let header = unsafe { &*header_ptr };
        header.verify(std::mem::size_of::<T>() as u32)?;

        let needed = ring_total_size(std::mem::size_of::<T>(), header.capacity());
        if region_len < needed {
            return Err(RingError::RegionTooSmall {
                available: region_len,
                capacity: header.capacity(),
                event_size: std::mem::size_of::<T>(),
            });
        }

        let buffer = unsafe { region.add(std::mem::size_of::<RingHeader>()).cast::<T>() };
        Ok(Self {
            header: header_ptr,
            buffer,
            _marker: PhantomData,
        })
    }

    #[inline]
    #[must_use]
    pub fn header(&self) -> &RingHeader {
        unsafe { &*self.header }
    }

    #[inline]
    pub fn write(&self, event: T) -> bool {
        unsafe { ops::write(self.header(), self.buffer, event) }
    }

    #[inline]
    pub fn read(&self, out: &mut T) -> bool {
        unsafe { ops::read(self.header(), self.buffer.cast_const(), out) }
    }

    #[inline]
    pub fn read_batch(&self, dst: &mut [T], max: usize) -> usize {
        unsafe { ops::read_batch(self.header(), self.buffer.cast_const(), dst, max) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RingConfig;

    #[test]
    fn round_trip_in_order() {
        let ring = Ring::<u64>::new(RingConfig::new(4));
        for v in [1u64, 2, 3, 4] {
            assert!(ring.write(v));
        }
        let mut out = [0u64; 10];
        let n = ring.read_batch(&mut out, 10);
        assert_eq!(n, 4);
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn write_fails_when_full_and_bumps_overflow() {
        let ring = Ring::<u64>::new(RingConfig::new(4));
        for v in [1u64, 2, 3, 4] {
            assert!(ring.write(v));
        }
        assert!(!ring.write(5));
        assert_eq!(ring.overflow_count(), 1);
    }

    #[test]
    fn read_fails_when_empty() {
        let ring = Ring::<u64>::new(RingConfig::new(4));
        let mut out = 0u64;
        assert!(!ring.read(&mut out));
    }

    #[test]
    fn raw_ring_round_trips_over_a_caller_region() {
        let capacity = 8u32;
        let size = ring_total_size(std::mem::size_of::<u64>(), capacity);
        let mut region = vec![0u8; size];
        let ptr = region.as_mut_ptr();

        unsafe {
            let producer = RawRing::<u64>::create_in(ptr, size, capacity).unwrap();
            assert!(producer.write(42));
            assert!(producer.write(43));

            let consumer = RawRing::<u64>::attach(ptr, size).unwrap();
            let mut out = 0u64;
            assert!(consumer.read(&mut out));
            assert_eq!(out, 42);
        }
    }

    #[test]
    fn raw_ring_rejects_event_size_mismatch() {
        let capacity = 8u32;
        let size = ring_total_size(std::mem::size_of::<u64>(), capacity);
        let mut region = vec![0u8; size];
        let ptr = region.as_mut_ptr();

        unsafe {
            let _producer = RawRing::<u64>::create_in(ptr, size, capacity).unwrap();
            let result = RawRing::<u32>::attach(ptr, size);
            assert!(matches!(result, Err(RingError::EventSizeMismatch { .. })));
        }
    }

    #[test]
    fn non_power_of_two_capacity_is_rejected() {
        let mut region = vec![0u8; 4096];
        let result = unsafe { RawRing::<u64>::create_in(region.as_mut_ptr(), 4096, 3) };
        assert!(matches!(result, Err(RingError::NotPowerOfTwo(3))));
    }
}
