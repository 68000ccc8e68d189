//! Process-wide selective-persistence counters (§4.8 "Metrics").

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative counters for selective persistence, safe to share across
/// threads. All increments are relaxed: these feed diagnostics, not control
/// flow.
#[derive(Debug, Default)]
pub struct PersistMetrics {
    events_processed: AtomicU64,
    marked_events_detected: AtomicU64,
    selective_dumps_performed: AtomicU64,
    windows_discarded: AtomicU64,
    window_duration_ns_total: AtomicU64,
    windows_closed: AtomicU64,
    metadata_write_failures: AtomicU64,
}

impl PersistMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_event(&self, matched: bool) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
        if matched {
            self.marked_events_detected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_dump(&self, window_duration_ns: u64) {
        self.selective_dumps_performed.fetch_add(1, Ordering::Relaxed);
        self.window_duration_ns_total
            .fetch_add(window_duration_ns, Ordering::Relaxed);
        self.windows_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discard(&self) {
        self.windows_discarded.fetch_add(1, Ordering::Relaxed);
        self.windows_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_metadata_write_failure(&self) {
        self.metadata_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn marked_events_detected(&self) -> u64 {
        self.marked_events_detected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn selective_dumps_performed(&self) -> u64 {
        self.selective_dumps_performed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn windows_discarded(&self) -> u64 {
        self.windows_discarded.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn metadata_write_failures(&self) -> u64 {
        self.metadata_write_failures.load(Ordering::Relaxed)
    }

    /// `marked_events_detected / events_processed`, or 0 with no events yet.
    #[must_use]
    pub fn mark_rate(&self) -> f64 {
        let total = self.events_processed() as f64;
        if total == 0.0 {
            0.0
        } else {
            self.marked_events_detected() as f64 / total
        }
    }

    /// `selective_dumps_performed / (selective_dumps_performed + windows_discarded)`,
    /// or 0 with no closed windows yet.
    #[must_use]
    pub fn dump_success_ratio(&self) -> f64 {
        let closed = self.windows_closed.load(Ordering::Relaxed) as f64;
        if closed == 0.0 {
            0.0
        } else {
            self.selective_dumps_performed() as f64 / closed
        }
    }

    #[must_use]
    pub fn avg_window_duration_ns(&self) -> f64 {
        let dumps = self.selective_dumps_performed() as f64;
        if dumps == 0.0 {
            0.0
        } else {
            self.window_duration_ns_total.load(Ordering::Relaxed) as f64 / dumps
        }
    }

    #[must_use]
    pub fn avg_events_per_window(&self) -> f64 {
        let closed = self.windows_closed.load(Ordering::Relaxed) as f64;
        if closed == 0.0 {
            0.0
        } else {
            self.events_processed() as f64 / closed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_are_zero_with_no_activity() {
        let m = PersistMetrics::new();
        assert_eq!(m.mark_rate(), 0.0);
        assert_eq!(m.dump_success_ratio(), 0.0);
        assert_eq!(m.avg_window_duration_ns(), 0.0);
    }

    #[test]
    fn dump_success_ratio_accounts_for_discards() {
        let m = PersistMetrics::new();
        m.record_dump(100);
        m.record_discard();
        assert!((m.dump_success_ratio() - 0.5).abs() < f64::EPSILON);
    }
}
