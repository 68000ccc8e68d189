//! Drain-wide counters (§4.7 step 3, §4.9 summary).

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters updated once per drain tick and read by the
/// shutdown summary. All fields are relaxed: they feed reporting, not
/// control flow.
#[derive(Debug, Default)]
pub struct DrainStats {
    events_captured: AtomicU64,
    bytes_written: AtomicU64,
    active_threads: AtomicU64,
    ring_errors: AtomicU64,
    writer_io_errors: AtomicU64,
}

impl DrainStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_events_captured(&self, n: u64) {
        self.events_captured.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn set_active_threads(&self, n: u64) {
        self.active_threads.store(n, Ordering::Relaxed);
    }

    pub fn record_ring_error(&self) {
        self.ring_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_writer_io_error(&self) {
        self.writer_io_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn events_captured(&self) -> u64 {
        self.events_captured.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn active_threads(&self) -> u64 {
        self.active_threads.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn ring_errors(&self) -> u64 {
        self.ring_errors.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn writer_io_errors(&self) -> u64 {
        self.writer_io_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let stats = DrainStats::new();
        stats.add_events_captured(10);
        stats.add_events_captured(5);
        stats.add_bytes_written(128);
        stats.record_ring_error();
        stats.set_active_threads(3);

        assert_eq!(stats.events_captured(), 15);
        assert_eq!(stats.bytes_written(), 128);
        assert_eq!(stats.ring_errors(), 1);
        assert_eq!(stats.active_threads(), 3);
    }
}
