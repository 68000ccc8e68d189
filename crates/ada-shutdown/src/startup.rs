//! Startup-deadline calculator (§6, SPEC_FULL.md §C.4, scenario S6).
//!
//! The hook-installer sequence itself is out of scope (§1), but the
//! deadline it runs against is specified precisely enough to build as a
//! standalone pure function: `(base + per_symbol * N) * (1 + tolerance)`,
//! overridden absolutely by `ADA_STARTUP_TIMEOUT` when set, and made
//! unbounded under `ADA_WAIT_FOR_DEBUGGER`.

use std::time::Duration;

/// Inputs to the startup-deadline formula, already parsed out of the
/// environment variables named in §6 (or supplied directly by a caller
/// that isn't reading the environment, e.g. a test).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartupDeadlineInputs {
    pub base_ms: u64,
    pub per_symbol_cost_ms: u64,
    pub tolerance: f64,
    pub symbol_count: u64,
    /// Absolute override from `ADA_STARTUP_TIMEOUT`; wins over the formula
    /// entirely when set.
    pub fixed_override_ms: Option<u64>,
    /// `ADA_WAIT_FOR_DEBUGGER`: the controller self-stops after spawn, so
    /// no startup timeout should fire at all.
    pub wait_for_debugger: bool,
}

impl Default for StartupDeadlineInputs {
    fn default() -> Self {
        Self {
            base_ms: 3000,
            per_symbol_cost_ms: 20,
            tolerance: 0.15,
            symbol_count: 0,
            fixed_override_ms: None,
            wait_for_debugger: false,
        }
    }
}

/// `None` means "unbounded" (`ADA_WAIT_FOR_DEBUGGER` set): the caller
/// should not apply any startup timeout at all.
#[must_use]
pub fn compute_startup_deadline(inputs: &StartupDeadlineInputs) -> Option<Duration> {
    if inputs.wait_for_debugger {
        return None;
    }
    if let Some(fixed) = inputs.fixed_override_ms {
        return Some(Duration::from_millis(fixed));
    }

    let warm_up = inputs.base_ms as f64 + inputs.per_symbol_cost_ms as f64 * inputs.symbol_count as f64;
    let with_tolerance = warm_up * (1.0 + inputs.tolerance);
    Some(Duration::from_millis(with_tolerance.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s6_base_formula() {
        let inputs = StartupDeadlineInputs {
            base_ms: 3000,
            per_symbol_cost_ms: 20,
            tolerance: 0.15,
            symbol_count: 100,
            fixed_override_ms: None,
            wait_for_debugger: false,
        };
        assert_eq!(compute_startup_deadline(&inputs), Some(Duration::from_millis(5750)));
    }

    #[test]
    fn s6_fixed_override_wins() {
        let inputs = StartupDeadlineInputs {
            fixed_override_ms: Some(10_000),
            ..StartupDeadlineInputs::default()
        };
        assert_eq!(compute_startup_deadline(&inputs), Some(Duration::from_millis(10_000)));
    }

    #[test]
    fn s6_wait_for_debugger_is_unbounded() {
        let inputs = StartupDeadlineInputs {
            wait_for_debugger: true,
            fixed_override_ms: Some(10_000),
            ..StartupDeadlineInputs::default()
        };
        assert_eq!(compute_startup_deadline(&inputs), None);
    }

    #[test]
    fn zero_symbols_is_just_the_base_with_tolerance() {
        let inputs = StartupDeadlineInputs {
            base_ms: 1000,
            per_symbol_cost_ms: 50,
            tolerance: 0.0,
            symbol_count: 0,
            fixed_override_ms: None,
            wait_for_debugger: false,
        };
        assert_eq!(compute_startup_deadline(&inputs), Some(Duration::from_millis(1000)));
    }
}
