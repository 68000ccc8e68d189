//! Environment-variable parsing for the variables named in §6 that feed
//! the startup-deadline calculator and the registry-disable / exclude-list
//! flags. This is the one place in the workspace that reaches into
//! `std::env` for these — every other crate takes typed config structs.

use std::env;
use std::time::Duration;

use crate::startup::StartupDeadlineInputs;

pub const DISABLE_REGISTRY_VAR: &str = "ADA_DISABLE_REGISTRY";
pub const EXCLUDE_VAR: &str = "ADA_EXCLUDE";
pub const WAIT_FOR_DEBUGGER_VAR: &str = "ADA_WAIT_FOR_DEBUGGER";
pub const STARTUP_WARM_UP_DURATION_VAR: &str = "ADA_STARTUP_WARM_UP_DURATION";
pub const STARTUP_PER_SYMBOL_COST_VAR: &str = "ADA_STARTUP_PER_SYMBOL_COST";
pub const STARTUP_TIMEOUT_TOLERANCE_VAR: &str = "ADA_STARTUP_TIMEOUT_TOLERANCE";
pub const STARTUP_TIMEOUT_VAR: &str = "ADA_STARTUP_TIMEOUT";

/// `ADA_DISABLE_REGISTRY`, `ADA_EXCLUDE`, `ADA_WAIT_FOR_DEBUGGER` (§6):
/// the flags that decide whether the controller even brings up the
/// registry and whether the agent should stay in `GLOBAL_ONLY`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownEnvConfig {
    pub registry_disabled: bool,
    pub wait_for_debugger: bool,
    pub excluded_symbols: Vec<String>,
}

impl ShutdownEnvConfig {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            registry_disabled: env_flag(DISABLE_REGISTRY_VAR),
            wait_for_debugger: env_flag(WAIT_FOR_DEBUGGER_VAR),
            excluded_symbols: env::var(EXCLUDE_VAR)
                .ok()
                .map(|raw| split_exclude_list(&raw))
                .unwrap_or_default(),
        }
    }
}

/// `ADA_STARTUP_WARM_UP_DURATION`, `ADA_STARTUP_PER_SYMBOL_COST`,
/// `ADA_STARTUP_TIMEOUT_TOLERANCE`, `ADA_STARTUP_TIMEOUT` (§6): the
/// deadline-model knobs, with the same defaults scenario S6 uses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StartupTimeoutConfig {
    pub base_ms: u64,
    pub per_symbol_cost_ms: u64,
    pub tolerance: f64,
    pub fixed_override_ms: Option<u64>,
}

impl Default for StartupTimeoutConfig {
    fn default() -> Self {
        Self {
            base_ms: 3000,
            per_symbol_cost_ms: 20,
            tolerance: 0.15,
            fixed_override_ms: None,
        }
    }
}

impl StartupTimeoutConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_ms: env_u64(STARTUP_WARM_UP_DURATION_VAR).unwrap_or(defaults.base_ms),
            per_symbol_cost_ms: env_u64(STARTUP_PER_SYMBOL_COST_VAR).unwrap_or(defaults.per_symbol_cost_ms),
            tolerance: env_f64(STARTUP_TIMEOUT_TOLERANCE_VAR).unwrap_or(defaults.tolerance),
            fixed_override_ms: env_u64(STARTUP_TIMEOUT_VAR),
        }
    }

    /// Combines this env-sourced config with a caller-known symbol count
    /// and debugger flag to produce the formula's full input set.
    #[must_use]
    pub fn into_inputs(self, symbol_count: u64, wait_for_debugger: bool) -> StartupDeadlineInputs {
        StartupDeadlineInputs {
            base_ms: self.base_ms,
            per_symbol_cost_ms: self.per_symbol_cost_ms,
            tolerance: self.tolerance,
            symbol_count,
            fixed_override_ms: self.fixed_override_ms,
            wait_for_debugger,
        }
    }
}

/// Also exposes the computed deadline directly, for callers that already
/// have everything `compute_startup_deadline` needs.
#[must_use]
pub fn startup_deadline_from_env(symbol_count: u64) -> Option<Duration> {
    let env = ShutdownEnvConfig::from_env();
    let config = StartupTimeoutConfig::from_env();
    crate::startup::compute_startup_deadline(&config.into_inputs(symbol_count, env.wait_for_debugger))
}

fn env_flag(name: &str) -> bool {
    env::var(name).is_ok_and(|v| !v.is_empty() && v != "0")
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_f64(name: &str) -> Option<f64> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

fn split_exclude_list(raw: &str) -> Vec<String> {
    raw.split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_exclude_list_handles_both_separators() {
        let list = split_exclude_list("foo::bar, baz;qux,, ");
        assert_eq!(list, vec!["foo::bar", "baz", "qux"]);
    }

    #[test]
    fn startup_timeout_config_defaults_match_s6() {
        let config = StartupTimeoutConfig::default();
        let inputs = config.into_inputs(100, false);
        assert_eq!(
            crate::startup::compute_startup_deadline(&inputs),
            Some(Duration::from_millis(5750))
        );
    }
}
