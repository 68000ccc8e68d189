//! ADA Trace - orderly shutdown manager (C10, §4.9).
//!
//! This crate owns the one piece of the data plane that is allowed to
//! touch the outside world beyond shared memory and session files:
//! signal handling, the self-pipe wakeup, and the final fsync/summary
//! sequence that runs after the drain stops.
//!
//! It depends on [`ada_drain`] for the drain's [`ada_drain::SyncHandles`]
//! surface and on [`ada_ipc`] for the control block's process-state
//! bookkeeping, which this manager updates as it moves through its
//! phases.

mod env;
mod manager;
mod pipe;
mod signal;
mod startup;
mod state;

pub use env::{
    startup_deadline_from_env, ShutdownEnvConfig, StartupTimeoutConfig, DISABLE_REGISTRY_VAR, EXCLUDE_VAR,
    STARTUP_PER_SYMBOL_COST_VAR, STARTUP_TIMEOUT_TOLERANCE_VAR, STARTUP_TIMEOUT_VAR, STARTUP_WARM_UP_DURATION_VAR,
    WAIT_FOR_DEBUGGER_VAR,
};
pub use manager::{ShutdownManager, ShutdownOps, ShutdownPhase, ShutdownReason, ShutdownSummary};
pub use pipe::WakeupPipe;
pub use signal::{install_signal_handlers, register_global_manager, unregister_global_manager};
pub use startup::{compute_startup_deadline, StartupDeadlineInputs};
pub use state::{ShutdownState, ShutdownStateError, ThreadShutdownRecord};
