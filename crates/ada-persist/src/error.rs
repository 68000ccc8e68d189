use std::io;
use thiserror::Error;

/// Error kinds relevant to selective persistence (§7).
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("invalid state: {0}")]
    State(String),
    #[error("i/o failure writing window metadata: {0}")]
    IoFailure(#[source] io::Error),
}
