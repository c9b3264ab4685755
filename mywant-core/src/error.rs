//! Error taxonomy shared across the core and runtime crates.
//!
//! Variants are grouped by the error *kind* from §7 of the specification
//! (configuration, resolution, execution, protocol) rather than by which
//! component raised them, so a caller can match on "is this retryable" /
//! "does this need operator attention" without knowing internals.

use crate::id::WantId;
use thiserror::Error;

/// Errors produced while validating or applying configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("want id {0} is already present in the config store")]
    DuplicateId(WantId),

    #[error("want name {0:?} is already used by another want")]
    DuplicateName(String),

    #[error("no factory registered for want type {0:?}")]
    UnknownType(String),

    #[error("recipe {0:?} referenced by want {1} is not registered")]
    UnknownRecipe(String, WantId),

    #[error("want {0} declares owner reference to unknown owner {1}")]
    UnknownOwner(WantId, WantId),

    #[error("malformed config: {0}")]
    Malformed(String),
}

/// Errors produced while resolving topology (§4.C).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("want {0} requires at least one provider for selector {1:?} but none matched")]
    UnsatisfiedProvider(WantId, String),

    #[error("want {0} requires at least one consumer but none selects it")]
    UnsatisfiedConsumer(WantId),

    #[error("cycle detected among non-loop-safe wants: {0:?}")]
    Cycle(Vec<WantId>),
}

/// Errors surfaced from a want's own execution (§7, "Execution errors").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("want {want} failed: {diagnostic}")]
pub struct ExecutionError {
    pub want: WantId,
    pub diagnostic: String,
}

/// Protocol-level errors: event bus overflow, unexpectedly closed channels.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("event bus overflowed for subscriber of want {0}, diagnostics were dropped")]
    EventBusOverflow(WantId),

    #[error("channel for want {0} closed unexpectedly")]
    ChannelClosed(WantId),
}

/// The union of every error kind the core can produce.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Convenience alias used throughout the core and runtime crates.
pub type Result<T, E = Error> = std::result::Result<T, E>;
