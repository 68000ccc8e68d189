//! ADA Trace - control block and IPC protocol (C6) plus the agent-mode
//! state machine (C7).
//!
//! The control block is the one piece of shared memory every party reads:
//! the agent polls it to pick a producer mode, the drain/controller write
//! readiness and heartbeat into it, and diagnostics tools read it for
//! observability. This crate keeps the binary layout (`ControlBlock`) and
//! its ordering contract (I4) in one place so no caller has to reimplement
//! "which fields are acquire/release vs relaxed".

mod control;
mod directory;
mod mode;
mod warmup;

pub use control::{
    run_readiness_handshake, ControlBlock, FlightRecorderState, ProcessState,
};
pub use directory::{
    ShmDirectory, ShmDirectoryEntry, ShmDirectoryError, MAX_ARENA_NAME_LEN, MAX_ENTRIES,
    SHM_DIRECTORY_SCHEMA_VERSION,
};
pub use mode::{AgentModeMachine, RegistryMode, N_WARMUP_TICKS};
pub use warmup::WarmupTicker;
