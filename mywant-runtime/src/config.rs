//! Runtime-wide defaults, threaded explicitly rather than kept as global
//! state (§9 "Global mutable state").
//!
//! Mirrors the teacher's `Context<T>` (`controller/mod.rs`): a read-only
//! value handed to every component that needs it, instead of a
//! process-global singleton.

use std::time::Duration;

/// Tunables for the Reconciler and Execution Runtime.
#[derive(Debug, Clone)]
pub struct Defaults {
    /// The Reconciler's tick cadence `T` (§4.F). ~100ms by default.
    pub tick_period: Duration,
    /// Bounded channel capacity used for a want-type edge when the want
    /// type doesn't declare its own (§4.C "bounded channel capacity
    /// derived from want-type defaults").
    pub channel_capacity: usize,
    /// Per-subscriber bound on the event bus (§5 "lock-free bounded
    /// queue per subscriber").
    pub event_bus_capacity: usize,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            channel_capacity: 16,
            event_bus_capacity: 256,
        }
    }
}

/// A shared, read-only view of [`Defaults`] plus anything else components
/// need without reaching for global state. Cheap to clone (wraps an
/// `Arc`-free value type today; grows a `Arc<T>` payload the moment a
/// consumer needs something heavier, the way the teacher's `Context<T>`
/// does).
#[derive(Debug, Clone)]
pub struct Context {
    pub defaults: Defaults,
}

impl Context {
    #[must_use]
    pub fn new(defaults: Defaults) -> Self {
        Self { defaults }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Defaults::default())
    }
}
