//! Fixed arena sizes (§4.10).

use ada_trace::{calculate_memory_size_with_capacity, RegistryConfig};

/// The control block is a fixed 4 KiB, regardless of session size.
pub const CONTROL_ARENA_SIZE: usize = 4096;

/// Index/detail "compatibility" rings (the legacy process-global path,
/// §4.7 step 2) each get a fixed 32 MiB arena.
pub const INDEX_ARENA_SIZE: usize = 32 * 1024 * 1024;
pub const DETAIL_ARENA_SIZE: usize = 32 * 1024 * 1024;

/// Size of the registry arena for a given configuration, delegating to
/// `ada-trace`'s layout calculator so the two crates can never disagree
/// about how big the region needs to be.
#[must_use]
pub fn registry_arena_size(config: &RegistryConfig) -> usize {
    calculate_memory_size_with_capacity(config)
}
