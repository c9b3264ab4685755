//! Want Registry & Factory (§4.D): maps a want-type tag to a constructor,
//! and wraps any want whose metadata carries owner references in an
//! owner-aware adapter that publishes completion events on terminal
//! transition.

use crate::events::{CompletionEvent, EventBus};
use crate::runtime::{ExecContext, ExecOutcome, Paths, WantExec};
use mywant_core::{Metadata, Params, WantId};
use std::collections::HashMap;
use std::sync::Arc;

/// A type tag's constructor: given the want's params, build its `Exec`
/// implementation. Boxed rather than generic so the registry can hold a
/// heterogeneous map of every registered type.
pub type Factory = Arc<dyn Fn(&Params) -> Box<dyn WantExec> + Send + Sync>;

struct TypeRegistration {
    factory: Factory,
    loop_safe: bool,
    default_capacity: usize,
}

/// `RegisterType` (§6): the registry a want type's author populates before
/// the runtime starts, and that the Topology Resolver and Reconciler
/// consult for `loop_safe` flags and default channel capacities.
#[derive(Default)]
pub struct Registry {
    types: HashMap<String, TypeRegistration>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a want type. `loop_safe` exempts the type from cycle
    /// detection (§4.C); `default_capacity` seeds the bounded channel size
    /// used for edges this type produces, unless overridden per-edge.
    pub fn register_type(
        &mut self,
        type_tag: impl Into<String>,
        factory: impl Fn(&Params) -> Box<dyn WantExec> + Send + Sync + 'static,
        loop_safe: bool,
        default_capacity: usize,
    ) {
        self.types.insert(
            type_tag.into(),
            TypeRegistration {
                factory: Arc::new(factory),
                loop_safe,
                default_capacity,
            },
        );
    }

    #[must_use]
    pub fn is_loop_safe(&self, type_tag: &str) -> bool {
        self.types.get(type_tag).is_some_and(|r| r.loop_safe)
    }

    #[must_use]
    pub fn default_capacity(&self, type_tag: &str) -> usize {
        self.types.get(type_tag).map_or(16, |r| r.default_capacity)
    }

    /// Build the unwrapped `Exec` for a concrete (non-target) want.
    pub fn instantiate(&self, id: WantId, type_tag: &str, params: &Params) -> crate::error::Result<Box<dyn WantExec>> {
        let registration = self
            .types
            .get(type_tag)
            .ok_or_else(|| crate::error::Error::NoFactory(id, type_tag.to_string()))?;
        Ok((registration.factory)(params))
    }

    /// Wrap `inner` in the owner-aware adapter if `metadata` declares any
    /// owner references (§4.D). Every terminal transition `inner` produces
    /// is additionally published to `bus` once per listed controller
    /// owner, before being passed through unchanged.
    #[must_use]
    pub fn wrap_owner_aware(inner: Box<dyn WantExec>, metadata: &Metadata, bus: EventBus) -> Box<dyn WantExec> {
        let owners: Vec<WantId> = metadata.controller_owners().collect();
        if owners.is_empty() {
            inner
        } else {
            Box::new(OwnerAwareExec {
                inner,
                child_id: metadata.id,
                owners,
                bus,
            })
        }
    }
}

struct OwnerAwareExec {
    inner: Box<dyn WantExec>,
    child_id: WantId,
    owners: Vec<WantId>,
    bus: EventBus,
}

#[async_trait::async_trait]
impl WantExec for OwnerAwareExec {
    async fn exec(&mut self, ctx: &mut ExecContext<'_>, paths: &mut Paths) -> ExecOutcome {
        let outcome = self.inner.exec(ctx, paths).await;
        let terminal_status = match &outcome {
            ExecOutcome::Done => Some(mywant_core::want::Status::Completed),
            ExecOutcome::Fail(_) => Some(mywant_core::want::Status::Failed),
            ExecOutcome::Continue | ExecOutcome::Yield => None,
        };
        if let Some(terminal_status) = terminal_status {
            for &owner_id in &self.owners {
                self.bus.publish(CompletionEvent {
                    child_id: self.child_id,
                    controller_owner_id: owner_id,
                    terminal_status,
                });
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mywant_core::{Labels, OwnerReference};

    fn metadata_with_owner(id: u64, owner_id: u64) -> Metadata {
        Metadata {
            id: WantId::from_raw(id),
            name: format!("w{id}"),
            type_tag: "leaf".into(),
            labels: Labels::default(),
            owner_references: vec![OwnerReference::controller(WantId::from_raw(owner_id), "owner".into())],
        }
    }

    struct AlwaysDone;

    #[async_trait::async_trait]
    impl WantExec for AlwaysDone {
        async fn exec(&mut self, _ctx: &mut ExecContext<'_>, _paths: &mut Paths) -> ExecOutcome {
            ExecOutcome::Done
        }
    }

    #[test]
    fn instantiate_uses_registered_factory() {
        let mut registry = Registry::new();
        registry.register_type("counter", |_params| Box::new(AlwaysDone), false, 16);
        assert!(registry.instantiate(WantId::from_raw(1), "counter", &Params::default()).is_ok());
        assert!(registry.instantiate(WantId::from_raw(1), "missing", &Params::default()).is_err());
    }

    #[test]
    fn loop_safe_and_capacity_defaults_round_trip() {
        let mut registry = Registry::new();
        registry.register_type("fib", |_params| Box::new(AlwaysDone), true, 4);
        assert!(registry.is_loop_safe("fib"));
        assert_eq!(registry.default_capacity("fib"), 4);
        assert!(!registry.is_loop_safe("unregistered"));
        assert_eq!(registry.default_capacity("unregistered"), 16);
    }

    #[tokio::test]
    async fn owner_aware_wrapper_publishes_on_terminal_transition() {
        let (bus, mut receiver) = EventBus::new(4);
        let metadata = metadata_with_owner(1, 2);
        let mut exec = Registry::wrap_owner_aware(Box::new(AlwaysDone), &metadata, bus);
        let snapshot = Arc::new(parking_lot::RwLock::new(mywant_core::Want::new(metadata, mywant_core::Spec::default())));
        let mut ctx = ExecContext::new(&snapshot);
        let outcome = exec.exec(&mut ctx, &mut Paths::default()).await;
        assert!(matches!(outcome, ExecOutcome::Done));
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.child_id, WantId::from_raw(1));
        assert_eq!(event.controller_owner_id, WantId::from_raw(2));
    }
}
