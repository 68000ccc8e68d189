//! C6: the shared-memory control block and its IPC protocol helpers (§4.5).
//!
//! Every IPC field is reached through an explicit accessor that pins down
//! its memory ordering (I4): `registry_ready`, `registry_version`,
//! `registry_epoch`, `registry_mode`, `shm_directory`, and `hooks_ready`
//! are acquire-read/release-written and are the controller's sole
//! responsibility to write; `drain_heartbeat_ns` is release-written by
//! whichever thread owns the drain's liveness and acquire-read by the
//! agent; `mode_transitions`/`fallback_events` are relaxed fetch-add
//! counters either party may bump.

use crate::directory::ShmDirectory;
use crate::mode::RegistryMode;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const CONTROL_MAGIC: u32 = 0x0000_ADA4;
const CONTROL_FORMAT_VERSION: u32 = 1;

/// Coarse lifecycle state of the traced process, as tracked by the
/// controller (not the spec's invariant-bearing model, just bookkeeping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcessState {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ProcessState {
    #[must_use]
    pub const fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Starting,
        }
    }
}

/// Flight-recorder (pre/post-roll trigger capture) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FlightRecorderState {
    Idle = 0,
    Armed = 1,
    Triggered = 2,
    Capturing = 3,
}

impl FlightRecorderState {
    #[must_use]
    pub const fn from_u32(v: u32) -> Self {
        match v {
            1 => Self::Armed,
            2 => Self::Triggered,
            3 => Self::Capturing,
            _ => Self::Idle,
        }
    }
}

/// The shared-memory control block (§3, ~4 KiB arena). One instance lives
/// at the base of the `control` arena; the controller creates it, the
/// agent and diagnostics tools attach read-write.
#[repr(C)]
pub struct ControlBlock {
    magic: u32,
    format_version: u32,

    process_state: AtomicU32,
    flight_recorder_state: AtomicU32,
    pre_roll_ms: AtomicU32,
    post_roll_ms: AtomicU32,
    trigger_timestamp_ns: AtomicU64,
    index_lane_enabled: AtomicU32,
    detail_lane_enabled: AtomicU32,
    capture_stack_snapshot: AtomicU32,

    registry_ready: AtomicU32,
    registry_version: AtomicU32,
    registry_epoch: AtomicU32,
    registry_mode: AtomicU32,
    drain_heartbeat_ns: AtomicU64,
    mode_transitions: AtomicU64,
    fallback_events: AtomicU64,
    hooks_ready: AtomicU32,

    pub shm_directory: ShmDirectory,
}

const _: () = assert!(std::mem::size_of::<ControlBlock>() <= 4096);

impl ControlBlock {
    /// Builds a fresh, zeroed control block for in-process use (tests,
    /// and the owning in-process fallback path). The real cross-process
    /// control block is created in place inside a mapped `control` arena
    /// by [`Self::init_in`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: CONTROL_MAGIC,
            format_version: CONTROL_FORMAT_VERSION,
            process_state: AtomicU32::new(ProcessState::Starting as u32),
            flight_recorder_state: AtomicU32::new(FlightRecorderState::Idle as u32),
            pre_roll_ms: AtomicU32::new(0),
            post_roll_ms: AtomicU32::new(0),
            trigger_timestamp_ns: AtomicU64::new(0),
            index_lane_enabled: AtomicU32::new(1),
            detail_lane_enabled: AtomicU32::new(1),
            capture_stack_snapshot: AtomicU32::new(0),
            registry_ready: AtomicU32::new(0),
            registry_version: AtomicU32::new(0),
            registry_epoch: AtomicU32::new(0),
            registry_mode: AtomicU32::new(RegistryMode::GlobalOnly as u32),
            drain_heartbeat_ns: AtomicU64::new(0),
            mode_transitions: AtomicU64::new(0),
            fallback_events: AtomicU64::new(0),
            hooks_ready: AtomicU32::new(0),
            shm_directory: ShmDirectory::new(),
        }
    }

    /// Initializes a control block in place at the start of `region`,
    /// a mapped `control` arena.
    ///
    /// # Safety
    /// `region` must be at least `size_of::<ControlBlock>()` bytes and
    /// must not be touched by any other party until this call returns.
    pub unsafe fn init_in(region: &mut [u8]) -> &Self {
        assert!(region.len() >= std::mem::size_of::<Self>());
        let ptr = region.as_mut_ptr().cast::<Self>();
        unsafe {
            ptr.write(Self::new());
            &*ptr
        }
    }

    /// Attaches to a control block previously written by
    /// [`Self::init_in`] at the start of `region`.
    ///
    /// # Safety
    /// `region` must point to a previously initialized control block,
    /// valid for at least `size_of::<ControlBlock>()` bytes.
    pub unsafe fn attach(region: &[u8]) -> Option<&Self> {
        if region.len() < std::mem::size_of::<Self>() {
            return None;
        }
        let block = unsafe { &*region.as_ptr().cast::<Self>() };
        if block.magic != CONTROL_MAGIC || block.format_version != CONTROL_FORMAT_VERSION {
            return None;
        }
        Some(block)
    }

    // --- process / flight-recorder bookkeeping ---

    pub fn set_process_state(&self, state: ProcessState) {
        self.process_state.store(state as u32, Ordering::Release);
    }

    #[must_use]
    pub fn process_state(&self) -> ProcessState {
        ProcessState::from_u32(self.process_state.load(Ordering::Acquire))
    }

    pub fn set_flight_recorder_state(&self, state: FlightRecorderState) {
        self.flight_recorder_state.store(state as u32, Ordering::Release);
    }

    #[must_use]
    pub fn flight_recorder_state(&self) -> FlightRecorderState {
        FlightRecorderState::from_u32(self.flight_recorder_state.load(Ordering::Acquire))
    }

    pub fn set_roll_window(&self, pre_roll_ms: u32, post_roll_ms: u32) {
        self.pre_roll_ms.store(pre_roll_ms, Ordering::Relaxed);
        self.post_roll_ms.store(post_roll_ms, Ordering::Relaxed);
    }

    #[must_use]
    pub fn roll_window(&self) -> (u32, u32) {
        (
            self.pre_roll_ms.load(Ordering::Relaxed),
            self.post_roll_ms.load(Ordering::Relaxed),
        )
    }

    pub fn set_trigger_timestamp_ns(&self, ts: u64) {
        self.trigger_timestamp_ns.store(ts, Ordering::Release);
    }

    #[must_use]
    pub fn trigger_timestamp_ns(&self) -> u64 {
        self.trigger_timestamp_ns.load(Ordering::Acquire)
    }

    pub fn set_lanes_enabled(&self, index: bool, detail: bool) {
        self.index_lane_enabled.store(u32::from(index), Ordering::Relaxed);
        self.detail_lane_enabled.store(u32::from(detail), Ordering::Relaxed);
    }

    #[must_use]
    pub fn lanes_enabled(&self) -> (bool, bool) {
        (
            self.index_lane_enabled.load(Ordering::Relaxed) != 0,
            self.detail_lane_enabled.load(Ordering::Relaxed) != 0,
        )
    }

    pub fn set_capture_stack_snapshot(&self, enabled: bool) {
        self.capture_stack_snapshot.store(u32::from(enabled), Ordering::Relaxed);
    }

    #[must_use]
    pub fn capture_stack_snapshot(&self) -> bool {
        self.capture_stack_snapshot.load(Ordering::Relaxed) != 0
    }

    // --- IPC fields (I4) ---

    pub fn set_registry_ready(&self, ready: bool) {
        self.registry_ready.store(u32::from(ready), Ordering::Release);
    }

    #[must_use]
    pub fn is_registry_ready(&self) -> bool {
        self.registry_ready.load(Ordering::Acquire) != 0
    }

    pub fn set_registry_version(&self, version: u32) {
        self.registry_version.store(version, Ordering::Release);
    }

    #[must_use]
    pub fn registry_version(&self) -> u32 {
        self.registry_version.load(Ordering::Acquire)
    }

    pub fn set_registry_epoch(&self, epoch: u32) {
        self.registry_epoch.store(epoch, Ordering::Release);
    }

    #[must_use]
    pub fn registry_epoch(&self) -> u32 {
        self.registry_epoch.load(Ordering::Acquire)
    }

    pub fn set_registry_mode(&self, mode: RegistryMode) {
        self.registry_mode.store(mode.as_u32(), Ordering::Release);
    }

    #[must_use]
    pub fn registry_mode(&self) -> RegistryMode {
        RegistryMode::from_u32(self.registry_mode.load(Ordering::Acquire))
    }

    pub fn set_drain_heartbeat_ns(&self, now_ns: u64) {
        self.drain_heartbeat_ns.store(now_ns, Ordering::Release);
    }

    #[must_use]
    pub fn drain_heartbeat_ns(&self) -> u64 {
        self.drain_heartbeat_ns.load(Ordering::Acquire)
    }

    pub fn set_hooks_ready(&self, ready: bool) {
        self.hooks_ready.store(u32::from(ready), Ordering::Release);
    }

    #[must_use]
    pub fn hooks_ready(&self) -> bool {
        self.hooks_ready.load(Ordering::Acquire) != 0
    }

    pub fn record_mode_transition(&self) {
        self.mode_transitions.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn mode_transitions(&self) -> u64 {
        self.mode_transitions.load(Ordering::Relaxed)
    }

    pub fn record_fallback_event(&self) {
        self.fallback_events.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn fallback_events(&self) -> u64 {
        self.fallback_events.load(Ordering::Relaxed)
    }
}

impl Default for ControlBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the controller's readiness handshake (§4.5) against an
/// already-mapped, already-initialized registry: writes the registry
/// arena's directory entry, bumps version/epoch to 1, stamps the initial
/// heartbeat, enters `DUAL_WRITE`, then publishes `registry_ready = 1`
/// last, with release — matching the six ordered steps exactly.
///
/// `now_ns` is supplied by the caller (a monotonic clock read) rather
/// than read internally, since this crate never touches wall-clock time
/// directly.
pub fn run_readiness_handshake(
    control: &ControlBlock,
    registry_arena_name: &str,
    registry_arena_size: u64,
    now_ns: u64,
) -> Result<(), crate::directory::ShmDirectoryError> {
    control.shm_directory.insert(registry_arena_name, registry_arena_size)?;
    control.set_registry_version(1);
    control.set_registry_epoch(1);
    control.set_drain_heartbeat_ns(now_ns);
    control.set_registry_mode(RegistryMode::DualWrite);
    control.set_registry_ready(true);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_handshake_publishes_in_order_and_ready_last() {
        let control = ControlBlock::new();
        assert!(!control.is_registry_ready());

        run_readiness_handshake(&control, "ada_registry_1_deadbeef", 65536, 42).unwrap();

        assert!(control.is_registry_ready());
        assert_eq!(control.registry_version(), 1);
        assert_eq!(control.registry_epoch(), 1);
        assert_eq!(control.drain_heartbeat_ns(), 42);
        assert_eq!(control.registry_mode(), RegistryMode::DualWrite);
        assert_eq!(control.shm_directory.lookup("ada_registry_1_deadbeef"), Some(65536));
    }

    #[test]
    fn init_in_and_attach_round_trip_over_a_region() {
        let mut region = vec![0u8; std::mem::size_of::<ControlBlock>()];
        {
            let control = unsafe { ControlBlock::init_in(&mut region) };
            control.set_registry_ready(true);
        }

        let attached = unsafe { ControlBlock::attach(&region) }.unwrap();
        assert!(attached.is_registry_ready());
    }
}
