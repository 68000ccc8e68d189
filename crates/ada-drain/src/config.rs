use std::path::PathBuf;
use std::time::Duration;

/// Drain thread tuning (§4.7). Defaults match the cadence and batch sizes
/// named in the spec.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    pub tick_interval: Duration,
    pub index_batch_size: usize,
    pub detail_batch_size: usize,
    pub compat_rings_enabled: bool,
    pub output_dir: PathBuf,
    pub with_manifest: bool,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            index_batch_size: 1000,
            detail_batch_size: 100,
            compat_rings_enabled: true,
            output_dir: PathBuf::from("."),
            with_manifest: true,
        }
    }
}

impl DrainConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    #[must_use]
    pub fn with_index_batch_size(mut self, size: usize) -> Self {
        self.index_batch_size = size;
        self
    }

    #[must_use]
    pub fn with_detail_batch_size(mut self, size: usize) -> Self {
        self.detail_batch_size = size;
        self
    }

    /// Disables compatibility-ring draining (§C.5 of the design notes);
    /// the legacy path is kept on by default rather than removed.
    #[must_use]
    pub fn with_compat_rings_enabled(mut self, enabled: bool) -> Self {
        self.compat_rings_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_manifest(mut self, enabled: bool) -> Self {
        self.with_manifest = enabled;
        self
    }
}
