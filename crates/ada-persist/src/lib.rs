//! ADA Trace - selective persistence (C9).
//!
//! Decides, per detail lane, whether a window of events is worth writing
//! out once its backing ring fills, based on a [`MarkingPolicy`] evaluated
//! against each event as it is produced.

mod control;
mod error;
mod metadata;
mod metrics;
mod policy;
mod window;

pub use control::SelectiveControl;
pub use error::PersistError;
pub use metadata::MetadataWriter;
pub use metrics::PersistMetrics;
pub use policy::{MarkingPolicy, MatchKind, MatchTarget, Probe, RuleSpec};
pub use window::Window;
