//! Reconciliation and execution engine for MyWant.
//!
//! Ties together the Config Store (§4.A), Topology Resolver (§4.C), Recipe
//! Expander (§4.B), Execution Runtime (§4.E), Owner/Completion Subsystem
//! (§4.G), Want Registry (§4.D), and Reconciler (§4.F) behind the facade in
//! [`interfaces`] (§6 "External Interfaces").

pub mod config;
pub mod config_store;
pub mod error;
pub mod events;
pub mod interfaces;
pub mod owner;
pub mod recipe_expander;
pub mod reconciler;
pub mod registry;
pub mod runtime;
pub mod topology;

pub use config::{Context, Defaults};
pub use config_store::{ConfigStore, DesiredEntry, Mutation, SpecPatch, WantSubmission};
pub use error::{Error, Result};
pub use events::{CompletionEvent, EventBus};
pub use interfaces::{Engine, WantView};
pub use reconciler::Reconciler;
pub use registry::Registry;
pub use runtime::{Control, ExitReason, LiveRegistry, Message, Paths, WantExec};
pub use topology::{Edge, Topology, Wiring};
