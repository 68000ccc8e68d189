//! C5: the fixed-capacity thread registry (§4.4).
//!
//! The registry is a single contiguous region (almost always a slice of
//! the shared `registry` arena from `ada-shm`) holding a header, a slot
//! table, and one [`LaneSet`] per slot. [`ThreadRegistry::create_owned`]
//! allocates that region on the heap for tests and single-process use;
//! [`ThreadRegistry::init`]/[`attach`](ThreadRegistry::attach) operate on
//! any caller-provided region, including one backed by real shared memory.

use crate::config::RegistryConfig;
use crate::lane::{LaneError, LaneSet};
use std::cell::Cell;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

const REGISTRY_MAGIC: u32 = 0x0000_ADA3;
const REGISTRY_FORMAT_VERSION: u32 = 1;

/// Errors creating or attaching to a registry region.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry capacity {0} must be in 1..=64")]
    CapacityOutOfRange(usize),
    #[error("region of {available} bytes is too small for a registry (need {needed})")]
    RegionTooSmall { available: usize, needed: usize },
    #[error("registry header magic mismatch: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u32, found: u32 },
    #[error("registry format version {found} is not supported (expected {expected})")]
    UnsupportedVersion { expected: u32, found: u32 },
    #[error(transparent)]
    Lane(#[from] LaneError),
}

/// Non-fatal: the registry is at capacity. Per §7 `Resource`, the caller
/// either drops events for this thread or spins/retries; policy is
/// agent-configurable and not decided here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("thread registry is full")]
pub struct RegisterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SlotStatus {
    Inactive = 0,
    Active = 1,
}

impl SlotStatus {
    fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::Active,
            _ => Self::Inactive,
        }
    }
}

#[repr(C)]
struct RegistryHeader {
    magic: u32,
    format_version: u32,
    capacity: u32,
    rings_per_lane: u32,
    index_ring_capacity: u32,
    detail_ring_capacity: u32,
}

#[repr(C)]
struct SlotHeader {
    status: AtomicU32,
    thread_id: AtomicU32,
}

/// Read-only snapshot of one registry slot, for diagnostics tooling
/// (`hdds-shm-viewer`-style; SPEC_FULL.md §C.2).
#[derive(Debug, Clone, Copy)]
pub struct ThreadInfo {
    pub slot_index: usize,
    pub thread_id: u32,
    pub status: SlotStatus,
    pub region_offset: usize,
    pub region_size: usize,
}

fn slot_table_offset() -> usize {
    std::mem::size_of::<RegistryHeader>()
}

fn per_slot_region_size(config: &RegistryConfig) -> usize {
    LaneSet::layout_size(
        config.index_ring_capacity(),
        config.detail_ring_capacity(),
        config.rings_per_lane(),
    )
}

/// Total byte size of a registry region sized for `config`.
#[must_use]
pub fn calculate_memory_size_with_capacity(config: &RegistryConfig) -> usize {
    let header = slot_table_offset();
    let slot_headers = config.capacity() * std::mem::size_of::<SlotHeader>();
    let lane_sets = config.capacity() * per_slot_region_size(config);
    header + slot_headers + lane_sets
}

thread_local! {
    static LANE_CACHE: Cell<*const LaneSet> = const { Cell::new(std::ptr::null()) };
}

/// Fixed-capacity table of live thread lane-sets (C5).
pub struct ThreadRegistry {
    header: *mut RegistryHeader,
    slots: Vec<*mut SlotHeader>,
    lane_sets: Vec<LaneSet>,
    /// Keeps the heap allocation alive when created via
    /// [`create_owned`](Self::create_owned); `None` when attached to a
    /// caller-owned (e.g. shared-memory) region.
    _owned: Option<Box<[u8]>>,
}

unsafe impl Send for ThreadRegistry {}
unsafe impl Sync for ThreadRegistry {}

impl ThreadRegistry {
    /// Controller-only: lays out header + slot table + per-slot lane
    /// storage over `mem` and writes the magic/version.
    ///
    /// # Errors
    /// Returns an error if `mem` is too small for `config`, or if
    /// `config`'s capacity is out of range.
    pub fn init(mem: &mut [u8], config: RegistryConfig) -> Result<Self, RegistryError> {
        Self::init_with_capacity(mem, config)
    }

    /// Same as [`init`](Self::init); named to mirror the spec's two entry
    /// points (`init`/`init_with_capacity` are one operation here because
    /// capacity already lives in [`RegistryConfig`]).
    pub fn init_with_capacity(mem: &mut [u8], config: RegistryConfig) -> Result<Self, RegistryError> {
        if config.capacity() == 0 || config.capacity() > 64 {
            return Err(RegistryError::CapacityOutOfRange(config.capacity()));
        }
        let needed = calculate_memory_size_with_capacity(&config);
        if mem.len() < needed {
            return Err(RegistryError::RegionTooSmall {
                available: mem.len(),
                needed,
            });
        }

        let base = mem.as_mut_ptr();
        let header_ptr = base.cast::<RegistryHeader>();
        unsafe {
            header_ptr.write(RegistryHeader {
                magic: REGISTRY_MAGIC,
                format_version: REGISTRY_FORMAT_VERSION,
                capacity: config.capacity() as u32,
                rings_per_lane: config.rings_per_lane() as u32,
                index_ring_capacity: config.index_ring_capacity(),
                detail_ring_capacity: config.detail_ring_capacity(),
            });
        }

        let mut offset = slot_table_offset();
        let mut slots = Vec::with_capacity(config.capacity());
        for _ in 0..config.capacity() {
            let slot_ptr = unsafe { base.add(offset).cast::<SlotHeader>() };
            unsafe {
                slot_ptr.write(SlotHeader {
                    status: AtomicU32::new(SlotStatus::Inactive as u32),
                    thread_id: AtomicU32::new(0),
                });
            }
            slots.push(slot_ptr);
            offset += std::mem::size_of::<SlotHeader>();
        }

        let slot_region_size = per_slot_region_size(&config);
        let mut lane_sets = Vec::with_capacity(config.capacity());
        for slot_index in 0..config.capacity() {
            let lane_set = unsafe {
                LaneSet::create_in(
                    base.add(offset),
                    slot_region_size,
                    config.index_ring_capacity(),
                    config.detail_ring_capacity(),
                    config.rings_per_lane(),
                    slot_index,
                )?
            };
            lane_sets.push(lane_set);
            offset += slot_region_size;
        }

        Ok(Self {
            header: header_ptr,
            slots,
            lane_sets,
            _owned: None,
        })
    }

    /// Agent-only: validates the header and returns a handle over an
    /// already-initialized region.
    ///
    /// # Errors
    /// Returns an error on magic/version mismatch or an undersized region.
    pub fn attach(mem: &mut [u8]) -> Result<Self, RegistryError> {
        if mem.len() < slot_table_offset() {
            return Err(RegistryError::RegionTooSmall {
                available: mem.len(),
                needed: slot_table_offset(),
            });
        }
        let base = mem.as_mut_ptr();
        let header_ptr = base.cast::<RegistryHeader>();
        let header = unsafe { &*header_ptr };
        if header.magic != REGISTRY_MAGIC {
            return Err(RegistryError::BadMagic {
                expected: REGISTRY_MAGIC,
                found: header.magic,
            });
        }
        if header.format_version != REGISTRY_FORMAT_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                expected: REGISTRY_FORMAT_VERSION,
                found: header.format_version,
            });
        }

        let config = RegistryConfig::new(
            header.capacity as usize,
            header.index_ring_capacity,
            header.detail_ring_capacity,
            header.rings_per_lane as usize,
        );
        let needed = calculate_memory_size_with_capacity(&config);
        if mem.len() < needed {
            return Err(RegistryError::RegionTooSmall {
                available: mem.len(),
                needed,
            });
        }

        let mut offset = slot_table_offset();
        let mut slots = Vec::with_capacity(config.capacity());
        for _ in 0..config.capacity() {
            slots.push(unsafe { base.add(offset).cast::<SlotHeader>() });
            offset += std::mem::size_of::<SlotHeader>();
        }

        let slot_region_size = per_slot_region_size(&config);
        let mut lane_sets = Vec::with_capacity(config.capacity());
        for slot_index in 0..config.capacity() {
            let lane_set = unsafe {
                LaneSet::attach(
                    base.add(offset),
                    slot_region_size,
                    config.index_ring_capacity(),
                    config.detail_ring_capacity(),
                    config.rings_per_lane(),
                    slot_index,
                )?
            };
            lane_sets.push(lane_set);
            offset += slot_region_size;
        }

        Ok(Self {
            header: header_ptr,
            slots,
            lane_sets,
            _owned: None,
        })
    }

    /// Convenience constructor for tests and in-process use: allocates a
    /// correctly sized heap buffer and initializes the registry over it.
    #[must_use]
    pub fn create_owned(config: RegistryConfig) -> Self {
        let size = calculate_memory_size_with_capacity(&config);
        let mut mem = vec![0u8; size].into_boxed_slice();
        let mut registry = Self::init(&mut mem, config).expect("owned region is always large enough");
        registry._owned = Some(mem);
        registry
    }

    #[inline]
    fn slot_status(&self, index: usize) -> SlotStatus {
        let status = unsafe { (*self.slots[index]).status.load(Ordering::Acquire) };
        SlotStatus::from_u32(status)
    }

    /// Allocates the first slot whose status CAS succeeds from `Inactive`
    /// to `Active`, writes `thread_id`, and caches the lane-set pointer in
    /// thread-local storage.
    ///
    /// # Errors
    /// Returns [`RegisterError`] when every slot is currently active.
    pub fn register(&self, thread_id: u32) -> Result<&LaneSet, RegisterError> {
        for (i, slot) in self.slots.iter().enumerate() {
            let slot = unsafe { &**slot };
            if slot
                .status
                .compare_exchange(
                    SlotStatus::Inactive as u32,
                    SlotStatus::Active as u32,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                slot.thread_id.store(thread_id, Ordering::Release);
                let lane_set = &self.lane_sets[i];
                lane_set.set_active(true);
                LANE_CACHE.with(|c| c.set(std::ptr::from_ref(lane_set)));
                return Ok(lane_set);
            }
        }
        Err(RegisterError)
    }

    /// Flips a slot back to `Inactive`. Idempotent.
    pub fn unregister(&self, lane_set: &LaneSet) {
        self.unregister_slot(lane_set.slot_index());
    }

    /// Flips the slot owned by `thread_id` back to `Inactive`, if found.
    /// Idempotent.
    pub fn unregister_by_id(&self, thread_id: u32) {
        for (i, slot) in self.slots.iter().enumerate() {
            let slot = unsafe { &**slot };
            if slot.thread_id.load(Ordering::Acquire) == thread_id
                && SlotStatus::from_u32(slot.status.load(Ordering::Acquire)) == SlotStatus::Active
            {
                self.unregister_slot(i);
                return;
            }
        }
    }

    fn unregister_slot(&self, index: usize) {
        let slot = unsafe { &*self.slots[index] };
        self.lane_sets[index].set_active(false);
        slot.status.store(SlotStatus::Inactive as u32, Ordering::Release);
    }

    /// Thread-local fast path: returns the cached lane-set for this OS
    /// thread, or `None` if never registered or lazily invalidated (the
    /// cached slot has since been deregistered).
    #[must_use]
    pub fn get_lanes(&self) -> Option<&LaneSet> {
        LANE_CACHE.with(|c| {
            let ptr = c.get();
            if ptr.is_null() {
                return None;
            }
            let lane_set = unsafe { &*ptr };
            if lane_set.is_active() {
                Some(lane_set)
            } else {
                None
            }
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn get_active_count(&self) -> usize {
        (0..self.slots.len())
            .filter(|&i| self.slot_status(i) == SlotStatus::Active)
            .count()
    }

    #[must_use]
    pub fn get_thread_at(&self, index: usize) -> Option<ThreadInfo> {
        if index >= self.slots.len() {
            return None;
        }
        let slot = unsafe { &*self.slots[index] };
        Some(ThreadInfo {
            slot_index: index,
            thread_id: slot.thread_id.load(Ordering::Acquire),
            status: SlotStatus::from_u32(slot.status.load(Ordering::Acquire)),
            region_offset: 0,
            region_size: 0,
        })
    }

    #[must_use]
    pub fn lane_set_at(&self, index: usize) -> Option<&LaneSet> {
        self.lane_sets.get(index)
    }

    /// Read-only iterator over every slot the drain should consider
    /// (SPEC_FULL.md §C.2 `RegistrySnapshot`).
    pub fn iter_active(&self) -> impl Iterator<Item = (ThreadInfo, &LaneSet)> + '_ {
        (0..self.slots.len()).filter_map(move |i| {
            let info = self.get_thread_at(i)?;
            if info.status == SlotStatus::Active {
                Some((info, &self.lane_sets[i]))
            } else {
                None
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RegistryConfig {
        RegistryConfig::new(2, 4, 4, 2)
    }

    #[test]
    fn registry_fill_and_overflow() {
        let registry = ThreadRegistry::create_owned(small_config());
        assert!(registry.register(100).is_ok());
        assert!(registry.register(200).is_ok());
        assert_eq!(registry.register(300), Err(RegisterError));

        registry.unregister_by_id(100);
        let lane_set = registry.register(300).unwrap();
        assert_eq!(lane_set.slot_index(), 0);
    }

    #[test]
    fn active_count_tracks_registrations() {
        let registry = ThreadRegistry::create_owned(small_config());
        assert_eq!(registry.get_active_count(), 0);
        registry.register(1).unwrap();
        assert_eq!(registry.get_active_count(), 1);
        registry.unregister_by_id(1);
        assert_eq!(registry.get_active_count(), 0);
    }

    #[test]
    fn attach_sees_a_registration_made_before_attach() {
        let config = RegistryConfig::new(4, 4, 4, 2);
        let size = calculate_memory_size_with_capacity(&config);
        let mut mem = vec![0u8; size];

        {
            let registry = ThreadRegistry::init(&mut mem, config).unwrap();
            registry.register(42).unwrap();
        }

        let attached = ThreadRegistry::attach(&mut mem).unwrap();
        let info = attached.get_thread_at(0).unwrap();
        assert_eq!(info.thread_id, 42);
        assert_eq!(info.status, SlotStatus::Active);
    }
}
