//! Runtime-level errors that wrap [`mywant_core::Error`] with the handful
//! of failure modes that only make sense once execution is involved.

use mywant_core::WantId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] mywant_core::Error),

    #[error("want {0} has no registered factory of type {1:?}")]
    NoFactory(WantId, String),

    #[error("want {0} was not found in the actual set")]
    NotFound(WantId),

    #[error("want {0} control channel is closed")]
    ControlChannelClosed(WantId),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
