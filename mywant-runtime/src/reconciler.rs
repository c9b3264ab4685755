//! Reconciler (§4.F): the single control loop that reads the Config
//! Store's declared set, expands recipes, resolves topology, diffs
//! against the actual set, and applies adds/updates/deletes/retriggers.

use crate::config::Context;
use crate::config_store::{ConfigStore, DesiredEntry};
use crate::events::EventBus;
use crate::owner::TargetExec;
use crate::recipe_expander;
use crate::registry::Registry;
use crate::runtime::{self, Control, ExecContext, ExecOutcome, LiveRegistry, Paths, WantExec};
use crate::topology::{self, ResolverInput, Wiring};
use mywant_core::want::{Spec, Status};
use mywant_core::{ResolutionError, Want, WantId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

/// One entry of the actual set: a live or terminally-stuck want plus the
/// bookkeeping the Reconciler needs to detect the next change.
struct ActualWant {
    snapshot: Arc<RwLock<Want>>,
    /// `None` once the want's task has exited, or if it was never spawned
    /// (resolution failure). Holding the control sender here, rather than
    /// the whole `runtime::Handle`, keeps `teardown` simple: consuming the
    /// handle's exit receiver is the one place we actually await a task's
    /// exit.
    handle: Option<runtime::Handle>,
    wiring: Wiring,
    last_spec: Spec,
}

/// Fan-out the want's own leaf-factory instantiation from the special
/// recipe-target case, so `spawn_or_respawn` doesn't need to know about
/// recipes at all.
enum Instantiation {
    Leaf,
    Target {
        expected_children: HashSet<WantId>,
        result_spec: Option<mywant_core::ResultSpec>,
    },
}

/// The Reconciler. Owns the actual set; the Config Store, Registry, and
/// event bus are shared with the rest of the process.
pub struct Reconciler {
    config: Arc<ConfigStore>,
    registry: Arc<Registry>,
    context: Context,
    bus: EventBus,
    live: LiveRegistry,
    actual: tokio::sync::Mutex<HashMap<WantId, ActualWant>>,
    /// Observability only (§9 supplemented "bulk reconcile counter"): not
    /// part of the external interface, just a tick sequence number and the
    /// change count it applied, for a `debug!` to report per tick.
    tick_seq: AtomicU64,
}

impl Reconciler {
    #[must_use]
    pub fn new(config: Arc<ConfigStore>, registry: Arc<Registry>, context: Context) -> Self {
        let (bus, _keep_alive) = EventBus::new(context.defaults.event_bus_capacity);
        Self {
            config,
            registry,
            context,
            bus,
            live: LiveRegistry::new(),
            actual: tokio::sync::Mutex::new(HashMap::new()),
            tick_seq: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn live_registry(&self) -> LiveRegistry {
        self.live.clone()
    }

    /// Look up the actual set's snapshot for `id`, covering both spawned
    /// wants and resolution-failed entries that were marked `failed`
    /// without ever being spawned (§4.F step 4). Unlike `live_registry()`,
    /// which only tracks spawned tasks, this is the right source for
    /// `QueryWant` (§6): a resolution failure is still something a caller
    /// should be able to see the status and diagnostic of.
    pub async fn snapshot(&self, id: WantId) -> Option<Arc<RwLock<Want>>> {
        self.actual.lock().await.get(&id).map(|w| w.snapshot.clone())
    }

    /// Deliver a control-channel message (`suspend`/`resume`/`stop`/
    /// `restart`, §6) to a currently-running want. A want with no live task
    /// (not yet spawned, already terminal, or unknown) is reported as
    /// `NotFound` rather than silently ignored, so an external caller can
    /// tell a typo'd id from a no-op.
    pub async fn send_control(&self, id: WantId, control: Control) -> crate::error::Result<()> {
        let actual = self.actual.lock().await;
        let Some(existing) = actual.get(&id) else {
            return Err(crate::error::Error::NotFound(id));
        };
        let Some(handle) = &existing.handle else {
            return Err(crate::error::Error::NotFound(id));
        };
        handle
            .control
            .send(control)
            .await
            .map_err(|_| crate::error::Error::ControlChannelClosed(id))
    }

    /// Run the ticker loop until `shutdown` fires (§4.F "Why ticker-based
    /// and not event-queued"; §3 "Exit semantics" case (b)).
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.context.defaults.tick_period);
        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.shutdown().await;
                        break;
                    }
                }
            }
        }
    }

    async fn shutdown(&self) {
        let ids: Vec<WantId> = self.actual.lock().await.keys().copied().collect();
        for id in ids {
            let mut actual = self.actual.lock().await;
            self.teardown_locked(&mut actual, id).await;
        }
    }

    /// One reconciliation tick (§4.F steps 1-7), wrapped in its own tracing
    /// span carrying the tick sequence number.
    pub async fn tick(&self) {
        let seq = self.tick_seq.fetch_add(1, Ordering::Relaxed);
        self.tick_inner().instrument(info_span!("reconcile", tick = seq)).await;
    }

    async fn tick_inner(&self) {
        self.drain_and_apply();

        let (desired, topology, error_by_id) = self.expand_and_resolve();

        let mut actual = self.actual.lock().await;

        let desired_ids: HashSet<WantId> = desired.keys().copied().collect();
        let actual_ids: HashSet<WantId> = actual.keys().copied().collect();

        for id in actual_ids.difference(&desired_ids).copied().collect::<Vec<_>>() {
            self.teardown_locked(&mut actual, id).await;
        }

        let mut initial_respawn: HashSet<WantId> = HashSet::new();
        for id in &desired_ids {
            if error_by_id.contains_key(id) {
                continue;
            }
            match actual.get(id) {
                None => {
                    initial_respawn.insert(*id);
                }
                Some(existing) => {
                    let new_spec = &desired[id].spec;
                    if existing.last_spec.differs_structurally(new_spec) {
                        initial_respawn.insert(*id);
                    } else if existing.last_spec.params != new_spec.params {
                        // §4.F step 6 "parameter-only update": reset to idle
                        // and let the respawn below pick the new params up
                        // from `desired`, reusing the same snapshot so state
                        // and history survive.
                        initial_respawn.insert(*id);
                    } else if topology.wiring_for(*id) != existing.wiring {
                        initial_respawn.insert(*id);
                    }
                }
            }
        }

        for id in completed_wants_eligible_for_retrigger(&actual, &topology) {
            initial_respawn.insert(id);
        }

        let respawn_set = close_over_shared_edges(initial_respawn, &topology, &error_by_id);

        for id in &respawn_set {
            if let Some(existing) = actual.get_mut(id) {
                if let Some(handle) = existing.handle.take() {
                    let _ = handle.control.send(Control::Stop).await;
                    handle.wait_exit().await;
                    self.live.remove(*id);
                }
            }
        }

        let mut paths_by_id: HashMap<WantId, Paths> = respawn_set.iter().map(|id| (*id, Paths::default())).collect();
        for (producer, wiring) in &topology.wiring {
            if error_by_id.contains_key(producer) {
                continue;
            }
            for edge in &wiring.outputs {
                if error_by_id.contains_key(&edge.consumer) {
                    continue;
                }
                if !respawn_set.contains(producer) && !respawn_set.contains(&edge.consumer) {
                    continue;
                }
                let (sender, receiver) = tokio::sync::mpsc::channel(edge.capacity.max(1));
                if let Some(paths) = paths_by_id.get_mut(producer) {
                    paths.outputs.push(runtime::OutputPath { consumer: edge.consumer, sender });
                }
                if let Some(paths) = paths_by_id.get_mut(&edge.consumer) {
                    paths.inputs.push(runtime::InputPath { producer: *producer, receiver });
                }
            }
        }

        for id in &respawn_set {
            let entry = &desired[id];
            let paths = paths_by_id.remove(id).unwrap_or_default();
            self.spawn_one(&mut actual, entry, &topology.wiring_for(*id), paths);
        }

        for (id, err) in &error_by_id {
            if !actual.contains_key(id) {
                if let Some(entry) = desired.get(id) {
                    let mut want = Want::new(entry.metadata.clone(), entry.spec.clone());
                    want.record_diagnostic(err.to_string());
                    // Marked failed directly: this want never entered `running`
                    // (§4.F step 4), so invariant 2's edges don't apply to it.
                    want.status = Status::Failed;
                    actual.insert(*id, ActualWant {
                        snapshot: Arc::new(RwLock::new(want)),
                        handle: None,
                        wiring: Wiring::default(),
                        last_spec: entry.spec.clone(),
                    });
                }
            }
        }

        debug!(
            adds_or_respawns = respawn_set.len(),
            resolution_errors = error_by_id.len(),
            actual_total = actual.len(),
            "reconciler tick complete"
        );
    }

    fn drain_and_apply(&self) {
        let batch = self.config.drain_mutations();
        if batch.is_empty() {
            return;
        }
        for result in self.config.apply(batch) {
            if let Err(err) = result {
                warn!(error = %err, "rejected configuration mutation");
            }
        }
    }

    /// §4.F steps 2 and 4: expand every recipe reference into concrete
    /// children and resolve topology to find resolution errors, without
    /// yet touching the actual set. Resolved once here; `tick` reuses the
    /// resulting topology rather than resolving a second time.
    fn expand_and_resolve(&self) -> (HashMap<WantId, DesiredEntry>, topology::Topology, HashMap<WantId, ResolutionError>) {
        let declared = self.config.snapshot();
        let mut desired = HashMap::new();

        for entry in declared {
            let Some(recipe_ref) = entry.spec.recipe.clone() else {
                desired.insert(entry.metadata.id, entry);
                continue;
            };
            match self.config.recipe(&recipe_ref.name) {
                Some(recipe) => match recipe_expander::expand(&entry, &recipe) {
                    Ok(children) => {
                        for child in children {
                            desired.insert(child.metadata.id, child);
                        }
                        desired.insert(entry.metadata.id, entry);
                    }
                    Err(err) => {
                        warn!(want = %entry.metadata.id, error = %err, "recipe expansion failed");
                    }
                },
                None => {
                    warn!(want = %entry.metadata.id, recipe = %recipe_ref.name, "referenced recipe no longer registered");
                }
            }
        }

        let (topology, errors) = topology::resolve(&resolver_inputs(&desired, &self.registry), |tag| {
            self.registry.default_capacity(tag)
        });
        (desired, topology, errors.into_iter().collect())
    }

    fn spawn_one(&self, actual: &mut HashMap<WantId, ActualWant>, entry: &DesiredEntry, wiring: &Wiring, paths: Paths) {
        let id = entry.metadata.id;
        let instantiation = if let Some(recipe_ref) = &entry.spec.recipe {
            let recipe = self.config.recipe(&recipe_ref.name);
            let (expected_children, result_spec) = match &recipe {
                Some(recipe) => match recipe_expander::expand(entry, recipe) {
                    Ok(children) => (children.iter().map(|c| c.metadata.id).collect(), recipe.result.clone()),
                    Err(_) => (HashSet::new(), None),
                },
                None => (HashSet::new(), None),
            };
            Instantiation::Target { expected_children, result_spec }
        } else {
            Instantiation::Leaf
        };

        let exec: Box<dyn WantExec> = match instantiation {
            Instantiation::Leaf => match self.registry.instantiate(id, &entry.metadata.type_tag, &entry.spec.params) {
                Ok(exec) => exec,
                Err(err) => {
                    warn!(want = %id, error = %err, "no factory registered for want type");
                    return;
                }
            },
            Instantiation::Target { expected_children, result_spec } => {
                Box::new(TargetExec::new(id, expected_children, result_spec, self.live.clone(), self.bus.subscribe()))
            }
        };
        let exec = Registry::wrap_owner_aware(exec, &entry.metadata, self.bus.clone());

        let snapshot = match actual.get(&id) {
            Some(existing) => {
                existing.snapshot.write().try_transition(Status::Idle);
                existing.snapshot.clone()
            }
            None => Arc::new(RwLock::new(Want::new(entry.metadata.clone(), entry.spec.clone()))),
        };

        let handle = runtime::spawn(snapshot.clone(), exec, paths, self.context.defaults.channel_capacity);
        self.live.insert(id, snapshot.clone());
        actual.insert(id, ActualWant {
            snapshot,
            handle: Some(handle),
            wiring: wiring.clone(),
            last_spec: entry.spec.clone(),
        });
    }

    async fn teardown_locked(&self, actual: &mut HashMap<WantId, ActualWant>, id: WantId) {
        if let Some(existing) = actual.remove(&id) {
            if let Some(handle) = existing.handle {
                let _ = handle.control.send(Control::Stop).await;
                handle.wait_exit().await;
            }
            self.live.remove(id);
            info!(want = %id, "want torn down");
        }
    }
}

fn resolver_inputs(desired: &HashMap<WantId, DesiredEntry>, registry: &Registry) -> Vec<ResolverInput> {
    desired
        .values()
        .map(|entry| ResolverInput {
            metadata: entry.metadata.clone(),
            using: entry.spec.using.clone(),
            requires: entry.spec.requires,
            loop_safe: registry.is_loop_safe(&entry.metadata.type_tag),
        })
        .collect()
}

/// §4.F step 7: a completed want whose producer has started running again
/// (restarted, or freshly re-emitting) is flagged so its next tick
/// respawns it from `idle`.
fn completed_wants_eligible_for_retrigger(
    actual: &HashMap<WantId, ActualWant>,
    topology: &topology::Topology,
) -> Vec<WantId> {
    let mut eligible = Vec::new();
    for (id, want) in actual {
        if want.snapshot.read().status != Status::Completed {
            continue;
        }
        let producer_running = topology.wiring_for(*id).inputs.iter().any(|edge| {
            actual
                .get(&edge.producer)
                .is_some_and(|p| p.snapshot.read().status == Status::Running)
        });
        if producer_running {
            eligible.push(*id);
        }
    }
    eligible
}

/// Extend `seed` to every want reachable through an edge with exactly one
/// endpoint already in the set, so a respawn never leaves one side of an
/// edge holding a channel half to a task that no longer exists (channels
/// are only ever (re)built in one pass per tick; see `tick`'s Phase A/B
/// comment). Resolution-failed ids are never spawned and are excluded.
fn close_over_shared_edges(
    mut seed: HashSet<WantId>,
    topology: &topology::Topology,
    error_by_id: &HashMap<WantId, ResolutionError>,
) -> HashSet<WantId> {
    loop {
        let mut grown = false;
        for (producer, wiring) in &topology.wiring {
            for edge in &wiring.outputs {
                if error_by_id.contains_key(producer) || error_by_id.contains_key(&edge.consumer) {
                    continue;
                }
                let producer_in = seed.contains(producer);
                let consumer_in = seed.contains(&edge.consumer);
                if producer_in != consumer_in {
                    grown |= seed.insert(*producer);
                    grown |= seed.insert(edge.consumer);
                }
            }
        }
        if !grown {
            break;
        }
    }
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Defaults;
    use crate::config_store::WantSubmission;
    use mywant_core::Labels;

    struct Counter(u32);

    #[async_trait::async_trait]
    impl WantExec for Counter {
        async fn exec(&mut self, ctx: &mut ExecContext<'_>, _paths: &mut Paths) -> ExecOutcome {
            self.0 += 1;
            ctx.store_state("count", serde_json::json!(self.0));
            if self.0 >= 2 {
                ExecOutcome::Done
            } else {
                ExecOutcome::Continue
            }
        }
    }

    fn context() -> Context {
        Context::new(Defaults {
            tick_period: std::time::Duration::from_millis(5),
            channel_capacity: 4,
            event_bus_capacity: 16,
        })
    }

    #[tokio::test]
    async fn a_plain_want_is_spawned_and_runs_to_completion() {
        let config = Arc::new(ConfigStore::new());
        let mut registry = Registry::new();
        registry.register_type("counter", |_params| Box::new(Counter(0)), false, 4);
        let reconciler = Reconciler::new(config.clone(), Arc::new(registry), context());

        config.enqueue_add(WantSubmission {
            name: Some("c1".into()),
            type_tag: "counter".into(),
            labels: Labels::default(),
            owner_references: vec![],
            spec: Spec::default(),
        });

        reconciler.tick().await;
        let id = config.id_by_name("c1").unwrap();

        for _ in 0..10 {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            reconciler.tick().await;
            let status = reconciler.actual.lock().await.get(&id).map(|w| w.snapshot.read().status);
            if status == Some(Status::Completed) {
                return;
            }
        }
        panic!("counter want never reached completed");
    }

    #[tokio::test]
    async fn deleting_a_want_tears_it_down() {
        let config = Arc::new(ConfigStore::new());
        let mut registry = Registry::new();
        registry.register_type("counter", |_params| Box::new(Counter(0)), false, 4);
        let reconciler = Reconciler::new(config.clone(), Arc::new(registry), context());

        config.enqueue_add(WantSubmission {
            name: Some("c1".into()),
            type_tag: "counter".into(),
            labels: Labels::default(),
            owner_references: vec![],
            spec: Spec::default(),
        });
        reconciler.tick().await;
        let id = config.id_by_name("c1").unwrap();
        assert!(reconciler.actual.lock().await.contains_key(&id));

        config.enqueue_delete(id);
        reconciler.tick().await;
        assert!(!reconciler.actual.lock().await.contains_key(&id));
    }
}
