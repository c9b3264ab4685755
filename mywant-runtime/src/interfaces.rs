//! External Interfaces (§6): a transport-agnostic facade over the Config
//! Store, Registry, and Reconciler. A REST/CLI/etc. layer is expected to
//! sit on top of [`Engine`] and translate its own wire format into these
//! calls; none of that translation is this crate's concern.

use crate::config::Context;
use crate::config_store::{ConfigStore, Mutation, SpecPatch, WantSubmission};
use crate::error::Result;
use crate::reconciler::Reconciler;
use crate::registry::Registry;
use crate::runtime::Control;
use mywant_core::want::{Diagnostic, Spec, Status};
use mywant_core::{ConfigError, History, Metadata, RecipeDefinition, Selector, WantId};
use std::collections::BTreeMap;
use std::sync::Arc;

/// `QueryWant`'s response shape (§6): everything about a want an external
/// caller would want to see, assembled from whichever of the declared or
/// actual sets currently holds it.
#[derive(Debug, Clone)]
pub struct WantView {
    pub metadata: Metadata,
    pub spec: Spec,
    /// `None` for a want that has been declared but not yet reconciled onto
    /// the actual set (it has no status until the Reconciler instantiates
    /// it).
    pub status: Option<Status>,
    pub state: BTreeMap<String, serde_json::Value>,
    pub history: History,
    /// The most recent resolution/execution diagnostic, if any (§9
    /// supplemented "Diagnostics on `QueryWant`").
    pub diagnostic: Option<Diagnostic>,
}

/// The process-wide facade: owns the Config Store and Reconciler, and is
/// the one thing an inbound transport (REST handler, CLI command, etc.)
/// needs a reference to.
pub struct Engine {
    config: Arc<ConfigStore>,
    registry: Arc<Registry>,
    reconciler: Arc<Reconciler>,
}

impl Engine {
    #[must_use]
    pub fn new(registry: Registry, context: Context) -> Self {
        let config = Arc::new(ConfigStore::new());
        let registry = Arc::new(registry);
        let reconciler = Arc::new(Reconciler::new(config.clone(), registry.clone(), context));
        Self { config, registry, reconciler }
    }

    /// Run the Reconciler's ticker loop until `shutdown` fires (§3 "Exit
    /// semantics"). Intended to be spawned as the process's long-lived
    /// background task.
    pub async fn run(&self, shutdown: tokio::sync::watch::Receiver<bool>) {
        self.reconciler.clone().run(shutdown).await;
    }

    /// `SubmitConfig(yaml_or_json_bytes)`: parse as YAML (a strict superset
    /// of JSON, so this path also accepts JSON bytes) into a submission and
    /// enqueue it as an add.
    pub fn submit_config(&self, bytes: &[u8]) -> std::result::Result<(), ConfigError> {
        let submission: WantSubmission =
            serde_yaml::from_slice(bytes).map_err(|err| ConfigError::Malformed(err.to_string()))?;
        self.config.enqueue_add(submission);
        Ok(())
    }

    /// `SubmitConfig`'s in-process equivalent for callers that already hold
    /// a [`WantSubmission`] rather than serialized bytes.
    pub fn submit(&self, submission: WantSubmission) {
        self.config.enqueue_add(submission);
    }

    /// `DeleteWant(id)`.
    pub fn delete_want(&self, id: WantId) {
        self.config.enqueue_delete(id);
    }

    /// `UpdateWant(id, spec_patch)`.
    pub fn update_want(&self, id: WantId, patch: SpecPatch) {
        self.config.enqueue_update(id, patch);
    }

    /// `Suspend/Resume/Stop/Restart(id)`: forwarded directly to the want's
    /// control channel rather than queued, since these act on a live task
    /// and carry no declared-state change for the Reconciler to apply.
    pub async fn control(&self, id: WantId, control: Control) -> Result<()> {
        self.reconciler.send_control(id, control).await
    }

    /// `QueryWant(id)`.
    pub async fn query_want(&self, id: WantId) -> Option<WantView> {
        if let Some(snapshot) = self.reconciler.snapshot(id).await {
            let want = snapshot.read();
            return Some(WantView {
                metadata: want.metadata.clone(),
                spec: want.spec.clone(),
                status: Some(want.status),
                state: want.state.snapshot(),
                history: want.history.clone(),
                diagnostic: want.diagnostic.clone(),
            });
        }
        let entry = self.config.get(id)?;
        Some(WantView {
            metadata: entry.metadata,
            spec: entry.spec,
            status: None,
            state: BTreeMap::new(),
            history: History::default(),
            diagnostic: None,
        })
    }

    /// `ListWants(filter_labels?)`.
    #[must_use]
    pub fn list_wants(&self, filter: Option<&Selector>) -> Vec<WantId> {
        self.config.list_ids(filter)
    }

    /// `RegisterRecipe(name, definition)`.
    pub fn register_recipe(&self, definition: RecipeDefinition) {
        self.config.register_recipe(definition);
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    #[must_use]
    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Drive a single reconciliation tick directly, bypassing the ticker
    /// loop. Meant for tests that need deterministic control over when a
    /// tick happens rather than waiting on real or paused time.
    pub async fn tick(&self) {
        self.reconciler.tick().await;
    }
}

/// Applied directly rather than queued, for callers (tests, a synchronous
/// CLI) that want `apply`'s immediate rejection reporting instead of
/// waiting for the next tick to find out a mutation was invalid.
pub fn apply_now(config: &ConfigStore, mutations: Vec<Mutation>) -> Vec<std::result::Result<WantId, ConfigError>> {
    config.apply(mutations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Defaults;
    use mywant_core::Labels;

    fn context() -> Context {
        Context::new(Defaults {
            tick_period: std::time::Duration::from_millis(5),
            channel_capacity: 4,
            event_bus_capacity: 16,
        })
    }

    fn submission(name: &str) -> WantSubmission {
        WantSubmission {
            name: Some(name.into()),
            type_tag: "noop".into(),
            labels: Labels::default(),
            owner_references: vec![],
            spec: Spec::default(),
        }
    }

    #[tokio::test]
    async fn query_before_reconciliation_returns_declared_shape_with_no_status() {
        let engine = Engine::new(Registry::new(), context());
        engine.submit(submission("w1"));
        apply_now(engine.config_store(), engine.config_store().drain_mutations());
        let id = engine.config_store().id_by_name("w1").unwrap();

        let view = engine.query_want(id).await.unwrap();
        assert!(view.status.is_none());
        assert_eq!(view.metadata.name, "w1");
    }

    #[test]
    fn list_wants_filters_by_label() {
        let engine = Engine::new(Registry::new(), context());
        let mut tagged = submission("w1");
        tagged.labels.insert("role".into(), "src".into());
        engine.submit(tagged);
        engine.submit(submission("w2"));
        apply_now(engine.config_store(), engine.config_store().drain_mutations());

        let sel = Selector::new([("role", "src")]);
        assert_eq!(engine.list_wants(Some(&sel)).len(), 1);
        assert_eq!(engine.list_wants(None).len(), 2);
    }

    #[tokio::test]
    async fn control_on_unknown_want_is_not_found() {
        let engine = Engine::new(Registry::new(), context());
        let result = engine.control(WantId::from_raw(999), Control::Stop).await;
        assert!(matches!(result, Err(crate::error::Error::NotFound(_))));
    }
}
