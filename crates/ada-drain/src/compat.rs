//! Legacy process-global "compatibility" rings (§4.7 step 2, design-notes
//! Open Questions, SPEC_FULL.md §C.5).
//!
//! Before the per-thread lane-set design, every producer in a process
//! pushed index events into a small fixed set of process-global rings.
//! That path still exists for producers that haven't been migrated onto
//! C5's thread registry; the drain keeps polling it every tick, after the
//! per-thread rings, behind [`DrainConfig::compat_rings_enabled`].

use ada_trace::{IndexEvent, Ring, RingConfig};

use crate::bytes::events_as_bytes;
use crate::error::DrainError;
use crate::session::SessionWriter;
use crate::stats::DrainStats;

/// A small fixed set of global index-event rings, one per legacy producer
/// slot. New code should register through C5 instead; this exists purely
/// so in-flight legacy producers aren't silently dropped.
pub struct CompatRingSet {
    rings: Vec<Ring<IndexEvent>>,
}

impl CompatRingSet {
    #[must_use]
    pub fn new(slots: usize, ring_config: RingConfig) -> Self {
        Self {
            rings: (0..slots).map(|_| Ring::new(ring_config.clone())).collect(),
        }
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Ring<IndexEvent>> {
        self.rings.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }

    /// Drains every compat ring into `writer`, batching reads the same way
    /// the per-thread index lane does. Returns the number of events
    /// forwarded. A write failure on one slot is recorded in `stats` and
    /// does not stop the remaining slots (§4.7 "Failure").
    pub fn drain_all(
        &self,
        writer: &mut SessionWriter,
        stats: &DrainStats,
        batch_size: usize,
    ) -> Result<u64, DrainError> {
        let mut total = 0u64;
        let mut buf = vec![IndexEvent::zeroed(); batch_size];
        for ring in &self.rings {
            loop {
                let n = ring.read_batch(&mut buf, batch_size);
                if n == 0 {
                    break;
                }
                let bytes = unsafe { events_as_bytes(&buf[..n]) };
                match writer.write_events(bytes) {
                    Ok(()) => {
                        total += n as u64;
                        stats.add_events_captured(n as u64);
                        stats.add_bytes_written(bytes.len() as u64);
                    }
                    Err(_) => stats.record_writer_io_error(),
                }
                if n < batch_size {
                    break;
                }
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_all_forwards_every_slot_and_reports_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SessionWriter::start_session(dir.path(), 1, false).unwrap();
        let stats = DrainStats::new();
        let compat = CompatRingSet::new(2, RingConfig::new(16));

        compat.slot(0).unwrap().write(IndexEvent::new(1, 0, 0, ada_trace::EventKind::Call, 0));
        compat.slot(1).unwrap().write(IndexEvent::new(2, 0, 0, ada_trace::EventKind::Call, 0));

        let n = compat.drain_all(&mut writer, &stats, 16).unwrap();
        assert_eq!(n, 2);
        assert_eq!(stats.events_captured(), 2);
    }
}
