//! A declarative engine for composing long-lived processing topologies out
//! of small, independently-reconciled units called "wants".
//!
//! A want declares what it needs (via label selectors and a `requires`
//! policy) and what type of work it does; the engine resolves the wiring
//! between wants, drives each one's execution cycle, and reconciles the
//! running system toward its declared configuration on a fixed tick,
//! the way a Kubernetes controller reconciles cluster state toward a
//! desired spec.
//!
//! This crate re-exports the data model from [`mywant_core`] and the
//! engine from [`mywant_runtime`] behind a single top-level [`Engine`].
//!
//! # Example
//!
//! ```rust,no_run
//! use mywant::{Engine, Registry, Context};
//!
//! # async fn run() {
//! let engine = Engine::new(Registry::new(), Context::default());
//! let (_tx, rx) = tokio::sync::watch::channel(false);
//! engine.run(rx).await;
//! # }
//! ```

pub use mywant_core::*;
pub use mywant_runtime::{
    CompletionEvent, Context, Defaults, Engine, EventBus, Reconciler, Registry, WantView,
};
pub use mywant_runtime::config_store::{ConfigStore, DesiredEntry, Mutation, SpecPatch, WantSubmission};
pub use mywant_runtime::runtime::{Control, ExecContext, ExecOutcome, ExitReason, LiveRegistry, Message, Paths, WantExec};
pub use mywant_runtime::topology::{Edge, Topology, Wiring};
