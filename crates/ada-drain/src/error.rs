use std::io;
use thiserror::Error;

/// Error kinds surfaced by the drain (§7). Per-ring and per-session faults
/// are non-fatal by policy — the drain records them and keeps going — so
/// most call sites log these rather than propagate them.
#[derive(Debug, Error)]
pub enum DrainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("i/o failure: {0}")]
    IoFailure(#[source] io::Error),
}

impl From<io::Error> for DrainError {
    fn from(e: io::Error) -> Self {
        Self::IoFailure(e)
    }
}
