//! C10: the shutdown manager (§4.9) — the single place in this workspace
//! that orchestrates stopping the drain, syncing session files to disk,
//! and reporting a summary, regardless of whether the trigger was a
//! signal, a `--duration` timer, or an explicit CLI request.

use std::fs::OpenOptions;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ada_drain::{DrainStats, SyncHandles};
use ada_ipc::ControlBlock;
use tracing::{info, warn};

use crate::pipe::WakeupPipe;
use crate::state::ShutdownState;

/// §4.9 phase enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ShutdownPhase {
    Idle = 0,
    SignalReceived = 1,
    DrainStopping = 2,
    Syncing = 3,
    Completed = 4,
}

impl ShutdownPhase {
    const fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::SignalReceived,
            2 => Self::DrainStopping,
            3 => Self::Syncing,
            4 => Self::Completed,
            _ => Self::Idle,
        }
    }
}

/// §4.9 last-reason enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ShutdownReason {
    None = 0,
    Signal = 1,
    Timer = 2,
    Manual = 3,
}

impl ShutdownReason {
    const fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::Signal,
            2 => Self::Timer,
            3 => Self::Manual,
            _ => Self::None,
        }
    }
}

/// Injectable side effects `execute()` drives (§4.9, §9 "global state").
/// Kept as plain closures rather than a trait object per operation so the
/// manager stays decoupled from how the controller actually cancels its
/// timer or stops its drain thread.
///
/// `cancel_timer` is *not* here: §4.9 "Request" calls for it to run as
/// soon as `request_shutdown` wins its CAS, not at the start of
/// `execute()`, so it is registered once up front via
/// [`ShutdownManager::set_cancel_timer`] and invoked from there instead.
#[derive(Default)]
pub struct ShutdownOps<'a> {
    /// Signals the drain thread to stop at its next tick boundary (flips
    /// its `running` flag and wakes it). Invoked once, at the start of
    /// `execute()`.
    pub stop_drain: Option<Box<dyn FnMut() + Send + 'a>>,
    /// Polled after `stop_drain` fires (and even if it wasn't set) until
    /// it returns `true`, to learn the drain has actually stopped. A
    /// manager with no drain at all (unit tests, `GLOBAL_ONLY` sessions)
    /// can leave this `None`, in which case `execute()` treats the drain
    /// as already stopped.
    pub drain_stopped: Option<Box<dyn FnMut() -> bool + Send + 'a>>,
}

/// Everything reported in the stderr summary (§4.9 "Summary", S5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShutdownSummary {
    pub duration_ms: u64,
    pub events_processed: u64,
    pub events_in_flight: u64,
    pub bytes_written: u64,
    pub files_synced: u64,
    pub threads_flushed: usize,
    pub threads_total: usize,
}

impl ShutdownSummary {
    /// Renders exactly the literal substrings S5 asserts on.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "Shutdown summary: duration {dur} ms, \
             Total Events Processed: {events}, \
             Events In Flight at Shutdown: {flight}, \
             Bytes Written: {bytes}, \
             Files Synced: {synced}, \
             threads flushed {flushed}/{total}",
            dur = self.duration_ms,
            events = self.events_processed,
            flight = self.events_in_flight,
            bytes = self.bytes_written,
            synced = self.files_synced,
            flushed = self.threads_flushed,
            total = self.threads_total,
        )
    }
}

/// Owns the process-wide orderly-teardown protocol (C10). One instance per
/// session, registered globally (via [`crate::register_global_manager`])
/// so a signal handler can reach it (§9 "global state").
pub struct ShutdownManager {
    phase: AtomicU32,
    shutdown_requested: AtomicBool,
    shutdown_completed: AtomicBool,
    last_reason: AtomicU32,
    last_signal: AtomicI32,
    request_count: AtomicU64,
    start_ns: AtomicU64,
    end_ns: AtomicU64,
    files_synced: AtomicU64,
    wakeup: WakeupPipe,
    per_slot_pending_cap: u64,
    state: ShutdownState,
    /// The `--duration` timer-cancellation callback, invoked from
    /// [`request_shutdown`](Self::request_shutdown) itself rather than
    /// from `execute()` (§4.9 "Request"). `None` until the caller arms a
    /// timer and registers one via [`set_cancel_timer`](Self::set_cancel_timer).
    cancel_timer: Mutex<Option<Box<dyn FnMut() + Send>>>,
}

impl ShutdownManager {
    /// `registry_capacity` sizes the per-thread [`ShutdownState`] table;
    /// `per_slot_pending_cap` is the ring capacity used to cap the
    /// "events in flight" estimate in the summary (§4.9).
    pub fn new(registry_capacity: usize, per_slot_pending_cap: u64) -> std::io::Result<Self> {
        Ok(Self {
            phase: AtomicU32::new(ShutdownPhase::Idle as u32),
            shutdown_requested: AtomicBool::new(false),
            shutdown_completed: AtomicBool::new(false),
            last_reason: AtomicU32::new(ShutdownReason::None as u32),
            last_signal: AtomicI32::new(0),
            request_count: AtomicU64::new(0),
            start_ns: AtomicU64::new(0),
            end_ns: AtomicU64::new(0),
            files_synced: AtomicU64::new(0),
            wakeup: WakeupPipe::new()?,
            per_slot_pending_cap,
            state: ShutdownState::new(registry_capacity),
            cancel_timer: Mutex::new(None),
        })
    }

    /// Registers the `--duration` timer-cancellation callback that
    /// `request_shutdown` invokes the instant it wins its CAS (§4.9
    /// "Request"). Call this once a timer is armed; leave unset (or pass
    /// one that's a no-op) when no timer exists for this session.
    pub fn set_cancel_timer(&self, cancel: impl FnMut() + Send + 'static) {
        *self.cancel_timer.lock().unwrap() = Some(Box::new(cancel));
    }

    #[must_use]
    pub fn phase(&self) -> ShutdownPhase {
        ShutdownPhase::from_u32(self.phase.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn last_reason(&self) -> ShutdownReason {
        ShutdownReason::from_u32(self.last_reason.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn last_signal(&self) -> i32 {
        self.last_signal.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_shutdown_completed(&self) -> bool {
        self.shutdown_completed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn files_synced(&self) -> u64 {
        self.files_synced.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn state(&self) -> &ShutdownState {
        &self.state
    }

    /// The read end the caller's event loop (or `execute`'s own wait) can
    /// poll to wake up promptly on a signal.
    #[must_use]
    pub fn wakeup_fd(&self) -> RawFd {
        self.wakeup.read_fd()
    }

    /// Requests shutdown for `reason` (and, for `Signal`, the raw signal
    /// number). CAS on `shutdown_requested`; always updates the last
    /// reason/signal and bumps the request count so repeated signals are
    /// still observable even though only the first has effect. Returns
    /// `true` only for the caller that won the race (§4.9 "Request", P7).
    ///
    /// On the winning call this also invokes the registered
    /// [`set_cancel_timer`](Self::set_cancel_timer) callback, matching
    /// §4.9 "Request"'s sequencing ("cancel_timer, write 1 to the wakeup
    /// fd") exactly: cancellation happens here, not in `execute()`.
    ///
    /// Mostly safe to call from a signal handler: the CAS, stores, and
    /// pipe write are all async-signal-safe; the registered
    /// `cancel_timer` callback is expected to be too (a flag flip or an
    /// atomic store), the same constraint §4.9 places on any side effect
    /// a handler triggers.
    pub fn request_shutdown(&self, reason: ShutdownReason, signal: i32) -> bool {
        self.last_reason.store(reason as u32, Ordering::Release);
        self.last_signal.store(signal, Ordering::Release);
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let won = self
            .shutdown_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            self.phase.store(ShutdownPhase::SignalReceived as u32, Ordering::Release);
            if let Ok(mut cancel) = self.cancel_timer.lock() {
                if let Some(cancel) = cancel.as_mut() {
                    cancel();
                }
            }
            self.wakeup.notify();
        }
        won
    }

    /// Blocks up to `timeout` for a shutdown request to land (used by a
    /// caller loop that isn't itself driving signal delivery, e.g. a
    /// `--duration` timer thread waiting to be cancelled).
    #[must_use]
    pub fn wait_for_request(&self, timeout: Duration) -> bool {
        self.wakeup.wait(timeout) || self.is_shutdown_requested()
    }

    /// Runs the teardown sequence (§4.9 "Execute"). Only the first caller
    /// whose `shutdown_completed` CAS succeeds actually runs it; every
    /// other (or later) call returns the already-computed summary,
    /// matching idempotence (P7).
    pub fn execute(
        &self,
        mut ops: ShutdownOps<'_>,
        drain_stats: &DrainStats,
        sync: Option<&dyn SyncHandles>,
        control: Option<&ControlBlock>,
    ) -> ShutdownSummary {
        if self
            .shutdown_completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return self.summary(drain_stats);
        }

        self.start_ns.store(now_ns(), Ordering::Relaxed);

        self.phase.store(ShutdownPhase::DrainStopping as u32, Ordering::Release);
        if let Some(control) = control {
            control.set_process_state(ada_ipc::ProcessState::Stopping);
        }
        if let Some(stop) = ops.stop_drain.as_mut() {
            stop();
        }
        self.wait_for_drain_stopped(&mut ops.drain_stopped);

        self.phase.store(ShutdownPhase::Syncing as u32, Ordering::Release);
        let synced = self.sync_files(sync);
        self.files_synced.store(synced, Ordering::Relaxed);

        self.end_ns.store(now_ns(), Ordering::Relaxed);
        self.phase.store(ShutdownPhase::Completed as u32, Ordering::Release);
        if let Some(control) = control {
            control.set_process_state(ada_ipc::ProcessState::Stopped);
        }

        info!(reason = ?self.last_reason(), "shutdown execute complete");
        self.summary(drain_stats)
    }

    fn wait_for_drain_stopped(&self, predicate: &mut Option<Box<dyn FnMut() -> bool + Send + '_>>) {
        let Some(predicate) = predicate.as_mut() else {
            return;
        };
        loop {
            if predicate() {
                return;
            }
            self.wakeup.wait(Duration::from_millis(50));
        }
    }

    /// fsyncs the event stream and (if present) the manifest, counting
    /// successes into `files_synced` (§4.9, P7's `files_synced <=`
    /// distinct valid descriptors).
    fn sync_files(&self, sync: Option<&dyn SyncHandles>) -> u64 {
        let Some(sync) = sync else {
            return 0;
        };
        let mut synced = 0u64;

        let events_fd = sync.events_fd();
        if events_fd >= 0 && fsync_fd(events_fd) {
            synced += 1;
        }

        if let Some(fd) = sync.manifest_fd() {
            if fd >= 0 && fsync_fd(fd) {
                synced += 1;
            }
        } else if let Some(path) = sync.manifest_path() {
            match OpenOptions::new().write(true).open(path) {
                Ok(file) if fsync_fd(file.as_raw_fd()) => synced += 1,
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to open manifest for shutdown fsync"),
            }
        }

        synced
    }

    /// Builds the stderr summary from live counters. Duration is reported
    /// as 0 when the timestamps are invalid or out of order (§4.9,
    /// "Summary": "0 when timestamps invalid or end < start").
    #[must_use]
    pub fn summary(&self, drain_stats: &DrainStats) -> ShutdownSummary {
        let start = self.start_ns.load(Ordering::Relaxed);
        let end = self.end_ns.load(Ordering::Relaxed);
        let duration_ms = if start == 0 || end < start {
            0
        } else {
            (end - start) / 1_000_000
        };

        let (flushed, total) = self.state.threads_flushed();
        ShutdownSummary {
            duration_ms,
            events_processed: drain_stats.events_captured(),
            events_in_flight: self.state.total_pending(self.per_slot_pending_cap),
            bytes_written: drain_stats.bytes_written(),
            files_synced: self.files_synced(),
            threads_flushed: flushed,
            threads_total: total,
        }
    }
}

fn fsync_fd(fd: RawFd) -> bool {
    unsafe { libc::fsync(fd) == 0 }
}

fn now_ns() -> u64 {
    // Monotonic, not wall-clock: only ever used to measure elapsed time
    // between start/end within this process's lifetime.
    static EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    Instant::now().saturating_duration_since(epoch).as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn request_shutdown_wins_exactly_once() {
        let mgr = ShutdownManager::new(4, 64).unwrap();
        assert!(mgr.request_shutdown(ShutdownReason::Signal, 15));
        assert!(!mgr.request_shutdown(ShutdownReason::Signal, 15));
        assert_eq!(mgr.request_count(), 2);
        assert_eq!(mgr.last_reason(), ShutdownReason::Signal);
        assert_eq!(mgr.last_signal(), 15);
        assert_eq!(mgr.phase(), ShutdownPhase::SignalReceived);
    }

    #[test]
    fn execute_is_idempotent_after_completion() {
        let mgr = ShutdownManager::new(4, 64).unwrap();
        mgr.request_shutdown(ShutdownReason::Manual, 0);
        let stats = DrainStats::new();

        let first = mgr.execute(ShutdownOps::default(), &stats, None, None);
        assert_eq!(mgr.phase(), ShutdownPhase::Completed);
        assert!(mgr.is_shutdown_completed());

        let second = mgr.execute(ShutdownOps::default(), &stats, None, None);
        assert_eq!(first, second);
    }

    #[test]
    fn request_shutdown_invokes_cancel_timer_on_the_winning_cas() {
        let mgr = ShutdownManager::new(4, 64).unwrap();

        let cancel_calls = Arc::new(AtomicUsize::new(0));
        let cancel_calls2 = cancel_calls.clone();
        mgr.set_cancel_timer(move || {
            cancel_calls2.fetch_add(1, Ordering::Relaxed);
        });

        assert!(mgr.request_shutdown(ShutdownReason::Timer, 0));
        assert_eq!(cancel_calls.load(Ordering::Relaxed), 1);

        // Second caller loses the CAS; cancel_timer must not fire again.
        assert!(!mgr.request_shutdown(ShutdownReason::Timer, 0));
        assert_eq!(cancel_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn execute_invokes_stop_drain_exactly_once() {
        let mgr = ShutdownManager::new(4, 64).unwrap();
        mgr.request_shutdown(ShutdownReason::Timer, 0);
        let stats = DrainStats::new();

        let stop_calls = Arc::new(AtomicUsize::new(0));
        let stop_calls2 = stop_calls.clone();

        let ops = ShutdownOps {
            stop_drain: Some(Box::new(move || {
                stop_calls2.fetch_add(1, Ordering::Relaxed);
            })),
            drain_stopped: Some(Box::new(|| true)),
        };

        mgr.execute(ops, &stats, None, None);
        assert_eq!(stop_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn summary_renders_s5_literal_substrings() {
        let mgr = ShutdownManager::new(1, 256).unwrap();
        mgr.state().set_pending_events(0, 5).unwrap();
        let stats = DrainStats::new();
        stats.add_events_captured(1234);
        stats.add_bytes_written(5678);
        mgr.request_shutdown(ShutdownReason::Signal, 15);
        mgr.execute(
            ShutdownOps {
                drain_stopped: Some(Box::new(|| true)),
                ..Default::default()
            },
            &stats,
            None,
            None,
        );

        let text = mgr.summary(&stats).render();
        assert!(text.contains("Total Events Processed: 1234"));
        assert!(text.contains("Events In Flight at Shutdown: 5"));
        assert!(text.contains("Bytes Written: 5678"));
    }

    #[test]
    fn duration_is_zero_when_never_executed() {
        let mgr = ShutdownManager::new(1, 256).unwrap();
        let stats = DrainStats::new();
        assert_eq!(mgr.summary(&stats).duration_ms, 0);
    }
}
