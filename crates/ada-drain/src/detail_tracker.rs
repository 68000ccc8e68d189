//! Bridges a detail lane's events to selective persistence (§4.8).
//!
//! The drain is the one component in the data plane that already does
//! file I/O and may block, so it is where window bookkeeping and the
//! `window_metadata.jsonl` writer live: the producer side only ever
//! touches `Lane::mark()`, a relaxed store, to flag a window as
//! potentially interesting — no allocation or syscall on that hot path.
//! Each tick the drain replays newly-read detail events through a
//! [`SelectiveControl`] to decide, once a ring fills, whether to dump or
//! discard its window.

use std::sync::Arc;

use ada_persist::{MarkingPolicy, MetadataWriter, PersistMetrics, Probe, SelectiveControl};
use ada_trace::DetailEvent;

use crate::error::DrainError;

/// Per-slot selective-persistence state, one per active detail lane.
pub struct DetailLaneTracker {
    control: SelectiveControl,
}

impl DetailLaneTracker {
    #[must_use]
    pub fn new(policy: Arc<MarkingPolicy>, metrics: Arc<PersistMetrics>, now_ns: u64) -> Self {
        Self {
            control: SelectiveControl::new(policy, metrics, now_ns),
        }
    }

    /// Folds a freshly-read batch of detail events into the current
    /// window. `symbol_of` resolves an event to the text the marking
    /// policy matches against; callers without a real symbol table can
    /// pass a formatter over `(module_id, symbol_index)`.
    pub fn present_batch(&mut self, events: &[DetailEvent], symbol_of: impl Fn(&DetailEvent) -> String) {
        for event in events {
            let symbol = symbol_of(event);
            self.control.present(&Probe::symbol(&symbol), event.index.timestamp_ns);
        }
    }

    /// Called once the active ring for this lane is observed full. If the
    /// window saw a mark, closes and writes it via `metadata`, bumping the
    /// dump metric; otherwise discards it. Either way a fresh window opens
    /// at `now_ns`.
    pub fn on_ring_full(&mut self, now_ns: u64, metadata: &mut MetadataWriter) -> Result<bool, DrainError> {
        if !self.control.should_dump(true) {
            self.control.discard_and_reopen(now_ns);
            return Ok(false);
        }
        let closed = self
            .control
            .close_window_for_dump(now_ns)
            .map_err(|e| DrainError::State(e.to_string()))?;
        metadata
            .append(&closed)
            .map_err(|e| DrainError::IoFailure(std::io::Error::other(e.to_string())))?;
        self.control.record_dump(&closed, now_ns);
        Ok(true)
    }
}

/// Default, symbol-table-free formatter for a detail event's probe text:
/// `"<module_id>:<symbol_index>"` in hex. Real deployments resolve this
/// through the symbol-table side channel (`session::symbols_side_channel_path`)
/// instead.
#[must_use]
pub fn default_symbol_text(event: &DetailEvent) -> String {
    format!("{:x}:{:x}", event.index.module_id(), event.index.symbol_index())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ada_trace::{EventKind, IndexEvent};

    #[test]
    fn marked_window_dumps_and_writes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = MetadataWriter::open(dir.path()).unwrap();
        let policy = Arc::new(MarkingPolicy::literal_symbol("7:2a", true));
        let metrics = Arc::new(PersistMetrics::new());
        let mut tracker = DetailLaneTracker::new(policy, metrics.clone(), 1000);

        let events = vec![
            DetailEvent::with_snapshot(IndexEvent::new(1010, 0, 0, EventKind::Call, 0), [0; 8], 0, 0, 0, &[]),
            DetailEvent::with_snapshot(IndexEvent::new(1100, 7, 0x2a, EventKind::Call, 0), [0; 8], 0, 0, 0, &[]),
        ];
        tracker.present_batch(&events, default_symbol_text);

        let dumped = tracker.on_ring_full(1300, &mut metadata).unwrap();
        assert!(dumped);
        assert_eq!(metrics.selective_dumps_performed(), 1);
    }

    #[test]
    fn unmarked_window_discards_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let mut metadata = MetadataWriter::open(dir.path()).unwrap();
        let policy = Arc::new(MarkingPolicy::literal_symbol("nope", true));
        let metrics = Arc::new(PersistMetrics::new());
        let mut tracker = DetailLaneTracker::new(policy, metrics.clone(), 0);

        let events = vec![DetailEvent::with_snapshot(
            IndexEvent::new(10, 0, 0, EventKind::Call, 0),
            [0; 8],
            0,
            0,
            0,
            &[],
        )];
        tracker.present_batch(&events, default_symbol_text);

        let dumped = tracker.on_ring_full(20, &mut metadata).unwrap();
        assert!(!dumped);
        assert_eq!(metrics.windows_discarded(), 1);
    }
}
