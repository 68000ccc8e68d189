//! Debug-only invariant checks for the ring/lane/registry protocol.
//!
//! These mirror spec.md §3's numbered invariants (I1-I6). They compile to
//! nothing in release builds (`#[cfg(debug_assertions)]`), so the hot path
//! pays zero cost for them.

/// I1: `read <= write` (modular) for a ring's positions.
macro_rules! debug_assert_read_not_past_write {
    ($read:expr, $write:expr) => {
        debug_assert!(
            $write.wrapping_sub($read) <= u32::MAX / 2,
            "I1 violated: read {} appears ahead of write {}",
            $read,
            $write
        )
    };
}

/// I1/P1: count never exceeds capacity.
macro_rules! debug_assert_bounded_count {
    ($count:expr, $capacity:expr) => {
        debug_assert!(
            $count <= $capacity,
            "I1 violated: ring count {} exceeds capacity {}",
            $count,
            $capacity
        )
    };
}

/// I2: free + submitted + active == pool size, checked at swap time.
macro_rules! debug_assert_lane_accounting {
    ($free:expr, $submitted:expr, $pool_size:expr) => {
        debug_assert!(
            $free + $submitted + 1 <= $pool_size,
            "I2 violated: free({}) + submitted({}) + active(1) exceeds pool size {}",
            $free,
            $submitted,
            $pool_size
        )
    };
}

/// I3: only `inactive -> active` and `active|inactive -> inactive` transitions are legal.
macro_rules! debug_assert_valid_slot_transition {
    ($from:expr, $to:expr) => {
        debug_assert!(
            matches!(
                ($from, $to),
                (crate::registry::SlotStatus::Inactive, crate::registry::SlotStatus::Active)
                    | (crate::registry::SlotStatus::Active, crate::registry::SlotStatus::Inactive)
                    | (crate::registry::SlotStatus::Inactive, crate::registry::SlotStatus::Inactive)
            ),
            "I3 violated: illegal slot transition {:?} -> {:?}",
            $from,
            $to
        )
    };
}

/// I5: a ring header's magic must already be written before any reader trusts it.
macro_rules! debug_assert_magic_checked {
    ($magic:expr, $expected:expr) => {
        debug_assert!(
            $magic == $expected,
            "I5 violated: ring header magic {:#x} does not match expected {:#x}",
            $magic,
            $expected
        )
    };
}

pub(crate) use debug_assert_bounded_count;
pub(crate) use debug_assert_lane_accounting;
pub(crate) use debug_assert_magic_checked;
pub(crate) use debug_assert_read_not_past_write;
pub(crate) use debug_assert_valid_slot_transition;
