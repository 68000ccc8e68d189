//! ADA Trace - shared-memory arenas (C1).
//!
//! Named, size-stable `shm_open`/`mmap` regions keyed by
//! `(role, host-pid, session-id)` that the controller creates and the
//! agent (and any diagnostics tooling) attach to read-write. This crate
//! only owns naming, sizing, and the raw mapping; what gets laid out
//! inside an arena (a control block, a registry, a compatibility ring)
//! is the concern of `ada-ipc` and `ada-trace`.

mod arena;
mod env;
mod naming;
mod sizing;

pub use arena::{Arena, ArenaError};
pub use env::{rendezvous_env_vars, rendezvous_from_env, HOST_PID_VAR, SESSION_ID_VAR};
pub use naming::{arena_name, ArenaRole, SessionId, DEFAULT_PREFIX};
pub use sizing::{registry_arena_size, CONTROL_ARENA_SIZE, DETAIL_ARENA_SIZE, INDEX_ARENA_SIZE};
