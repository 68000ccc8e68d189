//! Configuration types for rings and the thread registry.

/// Configuration for a single SPSC ring.
///
/// Capacity is expressed directly in events (not as a bit-shift like the
/// teacher's `Config::ring_bits`) because rings here come in two very
/// different sizes per lane (index vs. detail) and are sometimes sized from
/// a shared-memory region's leftover bytes rather than a clean power-of-two
/// knob.
#[derive(Debug, Clone, Copy)]
pub struct RingConfig {
    capacity_events: u32,
}

impl RingConfig {
    /// Creates a new ring configuration.
    ///
    /// # Panics
    ///
    /// Panics if `capacity_events` is not a power of two or is less than 2.
    #[must_use]
    pub const fn new(capacity_events: u32) -> Self {
        assert!(capacity_events >= 2, "ring capacity must be at least 2 events");
        assert!(
            capacity_events.is_power_of_two(),
            "ring capacity must be a power of two"
        );
        Self { capacity_events }
    }

    /// Returns the ring capacity in events.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity_events
    }

    /// Returns the index mask for wrapping (`capacity - 1`).
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> u32 {
        self.capacity_events - 1
    }
}

/// Default per-lane index-ring capacity (events). Small: index records are
/// 32 bytes and the drain polls frequently.
pub const DEFAULT_INDEX_RING_CAPACITY: u32 = 4096;

/// Default per-lane detail-ring capacity (events). Smaller than the index
/// ring because detail records are 512 bytes each.
pub const DEFAULT_DETAIL_RING_CAPACITY: u32 = 512;

/// Default number of rings held per lane pool (§4.3: "typically 2-8 per lane").
pub const DEFAULT_RINGS_PER_LANE: usize = 4;

/// Configuration for the thread registry (C5).
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    capacity: usize,
    index_ring_capacity: u32,
    detail_ring_capacity: u32,
    rings_per_lane: usize,
}

impl RegistryConfig {
    /// Creates a new registry configuration.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or exceeds the conventional cap of 64 live
    /// threads, or if `rings_per_lane` is less than 2.
    #[must_use]
    pub const fn new(
        capacity: usize,
        index_ring_capacity: u32,
        detail_ring_capacity: u32,
        rings_per_lane: usize,
    ) -> Self {
        assert!(capacity > 0 && capacity <= 64, "registry capacity must be in 1..=64");
        assert!(rings_per_lane >= 2, "a lane needs at least one active and one free ring");
        Self {
            capacity,
            index_ring_capacity,
            detail_ring_capacity,
            rings_per_lane,
        }
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub const fn index_ring_capacity(&self) -> u32 {
        self.index_ring_capacity
    }

    #[inline]
    #[must_use]
    pub const fn detail_ring_capacity(&self) -> u32 {
        self.detail_ring_capacity
    }

    #[inline]
    #[must_use]
    pub const fn rings_per_lane(&self) -> usize {
        self.rings_per_lane
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self::new(
            64,
            DEFAULT_INDEX_RING_CAPACITY,
            DEFAULT_DETAIL_RING_CAPACITY,
            DEFAULT_RINGS_PER_LANE,
        )
    }
}
