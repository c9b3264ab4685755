//! Core data model for MyWant.
//!
//! This crate carries the types that are shared between configuration,
//! resolution, execution, and persistence, but none of the behavior that
//! drives them — that lives in `mywant-runtime`. See `mywant-runtime` for
//! the Config Store, Topology Resolver, Recipe Expander, Execution
//! Runtime, Reconciler, and Owner/Completion Subsystem.

pub mod error;
pub mod id;
pub mod labels;
pub mod metadata;
pub mod recipe;
pub mod state;
pub mod want;

pub use error::{ConfigError, Error, ExecutionError, ProtocolError, ResolutionError, Result};
pub use id::WantId;
pub use labels::{Labels, Selector};
pub use metadata::{Metadata, OwnerReference};
pub use recipe::{RecipeDefinition, RecipeWantTemplate, ResultSpec};
pub use state::{AgentLogEntry, History, HistoryEntry, State};
pub use want::{Diagnostic, Params, RecipeRef, Requires, Spec, Status, Want};
