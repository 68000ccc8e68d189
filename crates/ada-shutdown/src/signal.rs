//! Signal installation (§4.9 "Signals", §9 "global state").
//!
//! `SIGINT`/`SIGTERM` handlers must find *the* shutdown manager for this
//! process without any language-level global mutable state scattered
//! across modules, so this models it as a single atomically-swappable
//! slot: a raw pointer behind an `AtomicPtr`, set once by
//! [`register_global_manager`] and read once per signal delivery. The
//! handler's only job is `request_shutdown`; every other side effect
//! (stopping the drain, syncing, printing the summary) happens on an
//! ordinary thread in the caller's event loop, never inside the handler.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::manager::{ShutdownManager, ShutdownReason};

static GLOBAL_MANAGER: AtomicPtr<ShutdownManager> = AtomicPtr::new(ptr::null_mut());

/// Registers `manager` as the process-wide shutdown manager a signal
/// handler can reach. Replaces whatever was registered before (the caller
/// owns the previous `Arc` and is responsible for dropping it once no
/// signal can reference it anymore, e.g. after [`unregister_global_manager`]).
pub fn register_global_manager(manager: Arc<ShutdownManager>) {
    let raw = Arc::into_raw(manager).cast_mut();
    let previous = GLOBAL_MANAGER.swap(raw, Ordering::AcqRel);
    if !previous.is_null() {
        // SAFETY: every registered pointer originated from `Arc::into_raw`
        // in this function, and only one live registration is ever
        // outstanding at a time (this swap just displaced it).
        drop(unsafe { Arc::from_raw(previous) });
    }
}

/// Clears the global slot, dropping the `Arc` reference it held. Call this
/// only after uninstalling the signal handlers (or at process exit), so a
/// concurrent signal can never observe a dangling pointer.
pub fn unregister_global_manager() {
    let previous = GLOBAL_MANAGER.swap(ptr::null_mut(), Ordering::AcqRel);
    if !previous.is_null() {
        // SAFETY: see `register_global_manager`.
        drop(unsafe { Arc::from_raw(previous) });
    }
}

fn with_global_manager(f: impl FnOnce(&ShutdownManager)) {
    let raw = GLOBAL_MANAGER.load(Ordering::Acquire);
    if raw.is_null() {
        return;
    }
    // SAFETY: `raw` was published by `register_global_manager` from a live
    // `Arc` and is only ever cleared (not freed) after this load observes
    // it non-null, because `unregister_global_manager` is documented to
    // run only after signal delivery is disabled.
    let manager = unsafe { &*raw };
    f(manager);
}

extern "C" fn handle_signal(signum: libc::c_int) {
    with_global_manager(|manager| {
        manager.request_shutdown(ShutdownReason::Signal, signum);
    });
}

/// Installs `SIGINT`/`SIGTERM` handlers with `SA_RESTART` set, so
/// interrupted blocking syscalls elsewhere in the process (file I/O, the
/// drain's sleeps) resume rather than failing with `EINTR` (§4.9
/// "Signals").
///
/// # Safety
/// Must be called before any other thread starts relying on default
/// signal disposition for `SIGINT`/`SIGTERM`; like any `sigaction` call,
/// it affects the whole process.
pub unsafe fn install_signal_handlers() -> std::io::Result<()> {
    for signum in [libc::SIGINT, libc::SIGTERM] {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_signal as usize;
        action.sa_flags = libc::SA_RESTART;
        libc::sigemptyset(std::ptr::addr_of_mut!(action.sa_mask));

        if libc::sigaction(signum, std::ptr::addr_of!(action), std::ptr::null_mut()) != 0 {
            let err = std::io::Error::last_os_error();
            warn!(signum, error = %err, "failed to install signal handler");
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The global slot is process-wide; serialize tests that touch it so
    // they don't interleave under the test harness's default threading.
    static GLOBAL_SLOT_TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn global_manager_round_trips_a_request() {
        let _guard = GLOBAL_SLOT_TEST_LOCK.lock().unwrap();
        let manager = Arc::new(ShutdownManager::new(2, 16).unwrap());
        register_global_manager(manager.clone());

        with_global_manager(|m| {
            assert!(m.request_shutdown(ShutdownReason::Manual, 0));
        });
        assert!(manager.is_shutdown_requested());

        unregister_global_manager();
    }

    #[test]
    fn re_registering_replaces_the_previous_manager() {
        let _guard = GLOBAL_SLOT_TEST_LOCK.lock().unwrap();
        let first = Arc::new(ShutdownManager::new(1, 16).unwrap());
        let second = Arc::new(ShutdownManager::new(1, 16).unwrap());

        register_global_manager(first.clone());
        register_global_manager(second.clone());

        with_global_manager(|m| {
            m.request_shutdown(ShutdownReason::Manual, 0);
        });
        assert!(second.is_shutdown_requested());
        assert!(!first.is_shutdown_requested());

        unregister_global_manager();
    }
}
