//! Per-lane selective-persistence state machine (§4.8 "State machine per
//! detail lane").
//!
//! One [`SelectiveControl`] is owned by the thread that feeds a single
//! detail lane. It decides, event by event, whether the lane's current
//! window is worth persisting once the ring behind it fills, and hands back
//! closed [`Window`]s for the metadata writer.

use std::sync::Arc;

use crate::metrics::PersistMetrics;
use crate::policy::{MarkingPolicy, Probe};
use crate::window::Window;
use crate::PersistError;

/// Drives one detail lane's window lifecycle against a [`MarkingPolicy`].
///
/// Owns its policy and metrics via `Arc` rather than borrowing them, so a
/// caller managing many lanes (the drain, one control per active detail
/// lane) can hold a `Vec<SelectiveControl>` without fighting the borrow
/// checker over a policy shared across all of them.
pub struct SelectiveControl {
    policy: Arc<MarkingPolicy>,
    metrics: Arc<PersistMetrics>,
    window: Window,
    next_window_id: u64,
}

impl SelectiveControl {
    #[must_use]
    pub fn new(policy: Arc<MarkingPolicy>, metrics: Arc<PersistMetrics>, now_ns: u64) -> Self {
        Self {
            policy,
            metrics,
            window: Window::open(0, now_ns),
            next_window_id: 1,
        }
    }

    #[must_use]
    pub fn current_window(&self) -> &Window {
        &self.window
    }

    /// Evaluates `probe` against the policy and folds the result into the
    /// current window. Returns whether the event matched.
    pub fn present(&mut self, probe: &Probe<'_>, now_ns: u64) -> bool {
        let matched = self.policy.is_enabled() && self.policy.matches(probe);
        self.window.record_event(now_ns, matched);
        self.metrics.record_event(matched);
        matched
    }

    /// Whether the lane's ring filling right now should trigger a dump:
    /// true only if the current window has seen at least one mark.
    #[must_use]
    pub fn should_dump(&self, ring_full: bool) -> bool {
        ring_full && self.window.mark_seen
    }

    /// Closes the current window for persistence, stamping `now_ns` as its
    /// end. Errors if the window never saw a mark (I6: a dumped window must
    /// have `mark_seen == true`); callers are expected to have checked
    /// [`should_dump`](Self::should_dump) first.
    pub fn close_window_for_dump(&mut self, now_ns: u64) -> Result<Window, PersistError> {
        if !self.window.mark_seen {
            return Err(PersistError::State(
                "cannot close a window for persistence before it has seen a mark".into(),
            ));
        }
        self.window.end = now_ns;
        Ok(self.window)
    }

    /// Records that `closed` was successfully dumped and opens the next
    /// window at `now_ns`. Equivalent to the spec's
    /// "`mark_dump_complete`"/"`record_dump`" pair — closing and reopening
    /// happen together here since nothing meaningful can occur between
    /// them.
    pub fn record_dump(&mut self, closed: &Window, now_ns: u64) {
        let duration = closed.end.saturating_sub(closed.start);
        self.metrics.record_dump(duration);
        self.open_next_window(now_ns);
    }

    /// A ring filled without any mark in its window: discard rather than
    /// persist, bump `windows_discarded`, and open a fresh window.
    pub fn discard_and_reopen(&mut self, now_ns: u64) {
        self.metrics.record_discard();
        self.open_next_window(now_ns);
    }

    fn open_next_window(&mut self, now_ns: u64) {
        let id = self.next_window_id;
        self.next_window_id += 1;
        self.window.reset(id, now_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s4_window_dump_and_reopen() {
        let policy = Arc::new(MarkingPolicy::literal_symbol("crash", true));
        let metrics = Arc::new(PersistMetrics::new());
        let mut ctl = SelectiveControl::new(policy, metrics.clone(), 1000);

        ctl.present(&Probe::symbol("info"), 1010);
        ctl.present(&Probe::symbol("crash"), 1100);
        ctl.present(&Probe::symbol("info"), 1200);

        assert!(ctl.should_dump(true));
        assert!(!ctl.should_dump(false));

        let closed = ctl.close_window_for_dump(1300).expect("window has a mark");
        assert_eq!(closed.total_events, 3);
        assert_eq!(closed.marked_events, 1);
        assert_eq!(closed.first_mark, 1100);
        assert_eq!(closed.end, 1300);
        assert!(closed.mark_seen);

        ctl.record_dump(&closed, 1301);
        assert_eq!(ctl.current_window().window_id, 1);
        assert_eq!(ctl.current_window().start, 1301);
        assert_eq!(ctl.current_window().total_events, 0);
        assert!(!ctl.current_window().mark_seen);
    }

    #[test]
    fn closing_without_a_mark_is_a_state_error() {
        let policy = Arc::new(MarkingPolicy::literal_symbol("crash", true));
        let metrics = Arc::new(PersistMetrics::new());
        let mut ctl = SelectiveControl::new(policy, metrics, 0);
        ctl.present(&Probe::symbol("info"), 10);
        assert!(!ctl.should_dump(true));
        assert!(matches!(
            ctl.close_window_for_dump(20),
            Err(PersistError::State(_))
        ));
    }

    #[test]
    fn discard_path_bumps_windows_discarded_and_reopens() {
        let policy = Arc::new(MarkingPolicy::literal_symbol("crash", true));
        let metrics = Arc::new(PersistMetrics::new());
        let mut ctl = SelectiveControl::new(policy, metrics.clone(), 0);
        ctl.present(&Probe::symbol("info"), 10);
        ctl.discard_and_reopen(20);
        assert_eq!(metrics.windows_discarded(), 1);
        assert_eq!(ctl.current_window().start, 20);
        assert_eq!(ctl.current_window().window_id, 1);
    }
}
