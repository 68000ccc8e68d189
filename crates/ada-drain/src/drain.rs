//! The drain thread itself (C8, §4.7): polls the thread registry, drains
//! legacy compatibility rings, and forwards everything to the session
//! writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ada_ipc::ControlBlock;
use ada_persist::{MarkingPolicy, MetadataWriter, PersistMetrics};
use ada_trace::{DetailEvent, IndexEvent, Lane, RingConfig, ThreadRegistry};

use crate::bytes::events_as_bytes;
use crate::compat::CompatRingSet;
use crate::config::DrainConfig;
use crate::detail_tracker::{default_symbol_text, DetailLaneTracker};
use crate::error::DrainError;
use crate::session::{SessionWriter, SyncHandles};
use crate::stats::DrainStats;

const DEFAULT_COMPAT_SLOTS: usize = 1;
const DEFAULT_COMPAT_RING_CAPACITY: u32 = 256;

/// Owns everything the drain touches for one session: the output writer,
/// per-slot selective-persistence state, and the legacy compat rings.
///
/// Designed to be moved into its own OS thread (it is launched after the
/// controller's arenas are ready, §4.7): [`run_until_stopped`] consumes
/// `self` and hands it back once the loop exits, so the shutdown manager
/// can still reach [`SessionWriter`]'s descriptors for the sync phase
/// after the thread is joined.
pub struct DrainThread {
    config: DrainConfig,
    stats: DrainStats,
    writer: SessionWriter,
    compat: CompatRingSet,
    detail_policy: Arc<MarkingPolicy>,
    detail_metrics: Arc<PersistMetrics>,
    metadata: MetadataWriter,
    detail_trackers: HashMap<usize, DetailLaneTracker>,
}

impl DrainThread {
    pub fn new(config: DrainConfig, detail_policy: Arc<MarkingPolicy>, pid: u32) -> Result<Self, DrainError> {
        let writer = SessionWriter::start_session(&config.output_dir, pid, config.with_manifest)?;
        let metadata = MetadataWriter::open(writer.session_dir()).map_err(|e| DrainError::IoFailure(io_of(e)))?;
        let compat_slots = if config.compat_rings_enabled { DEFAULT_COMPAT_SLOTS } else { 0 };
        let compat = CompatRingSet::new(compat_slots, RingConfig::new(DEFAULT_COMPAT_RING_CAPACITY));
        Ok(Self {
            config,
            stats: DrainStats::new(),
            writer,
            compat,
            detail_policy,
            detail_metrics: Arc::new(PersistMetrics::new()),
            metadata,
            detail_trackers: HashMap::new(),
        })
    }

    #[must_use]
    pub fn stats(&self) -> &DrainStats {
        &self.stats
    }

    #[must_use]
    pub fn detail_metrics(&self) -> &PersistMetrics {
        &self.detail_metrics
    }

    #[must_use]
    pub fn sync_handles(&self) -> &dyn SyncHandles {
        &self.writer
    }

    /// One iteration of the drain loop (§4.7 steps 1-3): registry slots
    /// first, legacy compat rings second, stats update third. Also
    /// refreshes `drain_heartbeat_ns` on the control block (§4.5): the
    /// agent-mode state machine downgrades to `GLOBAL_ONLY` once this
    /// timestamp ages past its timeout, so the drain — the party the
    /// heartbeat actually names — must be the one keeping it fresh.
    pub fn tick(&mut self, registry: &ThreadRegistry, control: Option<&ControlBlock>, now_ns: u64) {
        if let Some(control) = control {
            control.set_drain_heartbeat_ns(now_ns);
        }
        for (info, lane_set) in registry.iter_active() {
            self.drain_index_lane(&lane_set.index);
            self.drain_detail_lane(info.slot_index, &lane_set.detail, now_ns);
        }
        if self.config.compat_rings_enabled {
            if let Err(_e) = self.compat.drain_all(&mut self.writer, &self.stats, self.config.index_batch_size) {
                self.stats.record_writer_io_error();
            }
        }
        self.stats.set_active_threads(registry.get_active_count() as u64);
    }

    /// Runs ticks at `config.tick_interval` cadence until `running` goes
    /// false, waking early whenever `wake` fires (§4.7 step 4, the
    /// shutdown manager's eventfd-like wakeup). Consumes and returns
    /// `self` so a caller spawning this on a background thread can
    /// recover it from the `JoinHandle` afterward.
    #[must_use]
    pub fn run_until_stopped(
        mut self,
        registry: &ThreadRegistry,
        control: Option<&ControlBlock>,
        running: &AtomicBool,
        wake: &Receiver<()>,
    ) -> Self {
        while running.load(Ordering::Acquire) {
            self.tick(registry, control, now_ns());
            match wake.recv_timeout(self.config.tick_interval) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let _ = self.writer.stop_session();
        self
    }

    fn drain_index_lane(&mut self, lane: &Lane<IndexEvent>) {
        let batch = self.config.index_batch_size;
        let mut buf = vec![IndexEvent::zeroed(); batch];

        loop {
            let idx = lane.active_index();
            let n = lane.read_ring_batch(idx, &mut buf, batch);
            if n == 0 {
                break;
            }
            self.forward_index_batch(&buf[..n]);
            if n < batch {
                break;
            }
        }

        while let Some(idx) = lane.take_ring() {
            loop {
                let n = lane.read_ring_batch(idx, &mut buf, batch);
                if n == 0 {
                    break;
                }
                self.forward_index_batch(&buf[..n]);
                if n < batch {
                    break;
                }
            }
            lane.return_ring(idx);
        }
    }

    fn forward_index_batch(&mut self, events: &[IndexEvent]) {
        let bytes = unsafe { events_as_bytes(events) };
        match self.writer.write_events(bytes) {
            Ok(()) => {
                self.stats.add_events_captured(events.len() as u64);
                self.stats.add_bytes_written(bytes.len() as u64);
            }
            Err(_) => self.stats.record_writer_io_error(),
        }
    }

    /// Reads the detail lane's active ring in place (forwarding bytes and
    /// folding events into this slot's window tracker), then — unlike the
    /// index lane — the drain itself owns the dump/discard decision and is
    /// the sole caller of `swap_active` for detail lanes, since only it
    /// (not the producer) runs the marking-policy match. The producer side
    /// never swaps a detail ring on its own; a full, unmarked ring just
    /// rejects writes via the normal SPSC overflow path until the drain
    /// catches up.
    fn drain_detail_lane(&mut self, slot: usize, lane: &Lane<DetailEvent>, now_ns: u64) {
        let batch = self.config.detail_batch_size;
        let mut buf = vec![DetailEvent::zeroed(); batch];

        loop {
            let idx = lane.active_index();
            let n = lane.read_ring_batch(idx, &mut buf, batch);
            if n == 0 {
                break;
            }
            self.forward_detail_batch(&buf[..n]);
            self.present_detail_batch(slot, &buf[..n], now_ns);
            if n < batch {
                break;
            }
        }

        if lane.get_active_header().is_full() {
            self.handle_detail_ring_full(slot, lane, now_ns);
        }

        while let Some(idx) = lane.take_ring() {
            loop {
                let n = lane.read_ring_batch(idx, &mut buf, batch);
                if n == 0 {
                    break;
                }
                self.forward_detail_batch(&buf[..n]);
                if n < batch {
                    break;
                }
            }
            lane.return_ring(idx);
        }
    }

    fn forward_detail_batch(&mut self, events: &[DetailEvent]) {
        let bytes = unsafe { events_as_bytes(events) };
        match self.writer.write_events(bytes) {
            Ok(()) => {
                self.stats.add_events_captured(events.len() as u64);
                self.stats.add_bytes_written(bytes.len() as u64);
            }
            Err(_) => self.stats.record_writer_io_error(),
        }
    }

    fn present_detail_batch(&mut self, slot: usize, events: &[DetailEvent], now_ns: u64) {
        let policy = self.detail_policy.clone();
        let metrics = self.detail_metrics.clone();
        let tracker = self
            .detail_trackers
            .entry(slot)
            .or_insert_with(|| DetailLaneTracker::new(policy, metrics, now_ns));
        tracker.present_batch(events, default_symbol_text);
    }

    /// §4.8: "a selective ring swap is performed only when a dump
    /// condition is met; otherwise the detail-lane producer reuses the
    /// active ring, and the oldest events are overwritten via the normal
    /// SPSC full-rejection path." So the ring is only swapped when
    /// `on_ring_full` actually dumped the window, never on discard.
    fn handle_detail_ring_full(&mut self, slot: usize, lane: &Lane<DetailEvent>, now_ns: u64) {
        let dumped = match self.detail_trackers.get_mut(&slot) {
            Some(tracker) => match tracker.on_ring_full(now_ns, &mut self.metadata) {
                Ok(dumped) => dumped,
                Err(_e) => {
                    self.detail_metrics.mark_rate(); // touch metrics so failures are observable via metrics(), not silently dropped
                    self.stats.record_ring_error();
                    false
                }
            },
            None => false,
        };
        if dumped && lane.swap_active().is_err() {
            self.stats.record_ring_error();
        }
    }
}

fn io_of(e: ada_persist::PersistError) -> std::io::Error {
    std::io::Error::other(e.to_string())
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ada_trace::{calculate_memory_size_with_capacity, EventKind, RegistryConfig};
    use std::sync::mpsc;

    #[test]
    fn tick_forwards_index_events_from_an_active_slot() {
        let config = RegistryConfig::new(4, 8, 8, 2);
        let size = calculate_memory_size_with_capacity(&config);
        let mut mem = vec![0u8; size].into_boxed_slice();
        let registry = ThreadRegistry::init(&mut mem, config).unwrap();

        let lane_set = registry.register(100).expect("slot available");
        lane_set.index.write_active(IndexEvent::new(1, 0, 0, EventKind::Call, 0));
        lane_set.index.write_active(IndexEvent::new(2, 0, 0, EventKind::Call, 0));

        let dir = tempfile::tempdir().unwrap();
        let drain_config = DrainConfig::new().with_output_dir(dir.path()).with_compat_rings_enabled(false);
        let policy = Arc::new(MarkingPolicy::empty());
        let mut drain = DrainThread::new(drain_config, policy, 999).unwrap();

        drain.tick(&registry, None, 1_000);
        assert_eq!(drain.stats().events_captured(), 2);
        assert_eq!(drain.stats().active_threads(), 1);
    }

    #[test]
    fn tick_refreshes_the_control_block_heartbeat() {
        let config = RegistryConfig::new(2, 8, 8, 2);
        let size = calculate_memory_size_with_capacity(&config);
        let mut mem = vec![0u8; size].into_boxed_slice();
        let registry = ThreadRegistry::init(&mut mem, config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let drain_config = DrainConfig::new().with_output_dir(dir.path()).with_compat_rings_enabled(false);
        let policy = Arc::new(MarkingPolicy::empty());
        let mut drain = DrainThread::new(drain_config, policy, 1).unwrap();

        let control = ControlBlock::new();
        assert_eq!(control.drain_heartbeat_ns(), 0);
        drain.tick(&registry, Some(&control), 42_000);
        assert_eq!(control.drain_heartbeat_ns(), 42_000);
    }

    #[test]
    fn run_until_stopped_exits_promptly_when_running_flips_false() {
        let config = RegistryConfig::new(2, 8, 8, 2);
        let size = calculate_memory_size_with_capacity(&config);
        let mut mem = vec![0u8; size].into_boxed_slice();
        let registry = ThreadRegistry::init(&mut mem, config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let drain_config = DrainConfig::new()
            .with_output_dir(dir.path())
            .with_compat_rings_enabled(false)
            .with_tick_interval(std::time::Duration::from_millis(5));
        let policy = Arc::new(MarkingPolicy::empty());
        let drain = DrainThread::new(drain_config, policy, 1).unwrap();

        let running = AtomicBool::new(true);
        let (_tx, rx) = mpsc::channel::<()>();
        running.store(false, Ordering::Release);
        let drain = drain.run_until_stopped(&registry, None, &running, &rx);
        assert_eq!(drain.stats().events_captured(), 0);
    }
}
