//! Point-in-time stats snapshots (SPEC_FULL.md §C.1).
//!
//! spec.md names `overflow_count` directly off a ring; everything else
//! here is the natural generalization an operator-facing consumer (the
//! drain's periodic stats update, the shutdown summary) needs, in the
//! spirit of the teacher's `Metrics` snapshot type.

use crate::lane::Lane;
use crate::ring::RingHeader;

/// A snapshot of one ring's occupancy and overflow counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    pub capacity: u32,
    pub available_read: u32,
    pub available_write: u32,
    pub overflow_count: u64,
}

impl RingStats {
    #[must_use]
    pub fn from_header(header: &RingHeader) -> Self {
        Self {
            capacity: header.capacity(),
            available_read: header.available_read(),
            available_write: header.available_write(),
            overflow_count: header.overflow_count(),
        }
    }
}

/// A snapshot of one lane's pool depth alongside its active ring's stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    pub active_ring: RingStats,
    pub free_depth: u32,
    pub submitted_depth: u32,
    pub rings_per_lane: usize,
}

impl LaneStats {
    #[must_use]
    pub fn from_lane<T: Copy>(lane: &Lane<T>) -> Self {
        Self {
            active_ring: RingStats::from_header(lane.get_active_header()),
            free_depth: lane.free_depth(),
            submitted_depth: lane.submitted_depth(),
            rings_per_lane: lane.rings_per_lane(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Ring, RingConfig};

    #[test]
    fn ring_stats_reflect_overflow() {
        let ring = Ring::<u64>::new(RingConfig::new(2));
        assert!(ring.write(1));
        assert!(ring.write(2));
        assert!(!ring.write(3));
        let stats = RingStats::from_header(ring.header());
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.available_read, 2);
        assert_eq!(stats.available_write, 0);
        assert_eq!(stats.overflow_count, 1);
    }
}
