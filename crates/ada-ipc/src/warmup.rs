//! The controller's warm-up transition (§4.5): while `registry_ready == 1`
//! and the published mode is `DUAL_WRITE`, a maintenance loop ticks every
//! ~100ms, refreshing the heartbeat; after [`N_WARMUP_TICKS`] consecutive
//! ticks it promotes the mode to `PER_THREAD_ONLY`.
//!
//! This is driven externally (by `ada-drain`'s own ~100ms poll loop, since
//! that loop already represents "the drain is alive" for heartbeat
//! purposes) — this type only holds the tick counter and the transition
//! rule.

use crate::control::ControlBlock;
use crate::mode::{RegistryMode, N_WARMUP_TICKS};

/// Consecutive-tick counter driving the `DUAL_WRITE -> PER_THREAD_ONLY`
/// promotion.
#[derive(Debug, Default)]
pub struct WarmupTicker {
    consecutive_dual_write_ticks: u32,
}

impl WarmupTicker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes the heartbeat unconditionally, then advances (or resets)
    /// the warm-up counter and promotes the mode once it reaches
    /// [`N_WARMUP_TICKS`].
    pub fn tick(&mut self, control: &ControlBlock, now_ns: u64) {
        control.set_drain_heartbeat_ns(now_ns);

        if !control.is_registry_ready() || control.registry_mode() != RegistryMode::DualWrite {
            self.consecutive_dual_write_ticks = 0;
            return;
        }

        self.consecutive_dual_write_ticks += 1;
        if self.consecutive_dual_write_ticks >= N_WARMUP_TICKS {
            control.set_registry_mode(RegistryMode::PerThreadOnly);
            control.record_mode_transition();
            self.consecutive_dual_write_ticks = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_to_per_thread_only_after_warmup_ticks() {
        let control = ControlBlock::new();
        control.set_registry_ready(true);
        control.set_registry_mode(RegistryMode::DualWrite);

        let mut ticker = WarmupTicker::new();
        for t in 0..N_WARMUP_TICKS - 1 {
            ticker.tick(&control, u64::from(t) * 100);
            assert_eq!(control.registry_mode(), RegistryMode::DualWrite);
        }
        ticker.tick(&control, 10_000);
        assert_eq!(control.registry_mode(), RegistryMode::PerThreadOnly);
        assert_eq!(control.mode_transitions(), 1);
    }

    #[test]
    fn does_nothing_before_registry_is_ready() {
        let control = ControlBlock::new();
        let mut ticker = WarmupTicker::new();
        ticker.tick(&control, 1);
        assert_eq!(control.registry_mode(), RegistryMode::GlobalOnly);
        assert_eq!(control.drain_heartbeat_ns(), 1);
    }
}
