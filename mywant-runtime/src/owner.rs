//! Owner/Completion Subsystem (§4.G): a recipe target want retains no
//! direct execution duty beyond waiting for its expanded children to
//! complete and aggregating their results (§4.B point 3, §4.G).

use crate::events::CompletionEvent;
use crate::runtime::{ExecContext, ExecOutcome, LiveRegistry, Paths, WantExec};
use mywant_core::want::Status;
use mywant_core::{ResultSpec, WantId};
use std::collections::HashSet;

/// `Exec` implementation installed by the Registry (§4.D) for any want
/// whose spec still carries a `recipe` reference after expansion. It never
/// touches `paths`: a target has no wiring of its own, only children.
pub struct TargetExec {
    self_id: WantId,
    expected: HashSet<WantId>,
    completed: HashSet<WantId>,
    failed: HashSet<WantId>,
    result_spec: Option<ResultSpec>,
    live: LiveRegistry,
    events: async_broadcast::Receiver<CompletionEvent>,
}

impl TargetExec {
    #[must_use]
    pub fn new(
        self_id: WantId,
        expected_children: HashSet<WantId>,
        result_spec: Option<ResultSpec>,
        live: LiveRegistry,
        events: async_broadcast::Receiver<CompletionEvent>,
    ) -> Self {
        Self {
            self_id,
            expected: expected_children,
            completed: HashSet::new(),
            failed: HashSet::new(),
            result_spec,
            live,
            events,
        }
    }

    fn all_accounted_for(&self) -> bool {
        self.completed.len() + self.failed.len() >= self.expected.len()
    }

    /// Build the aggregated result object from each completed child's
    /// state, keyed by child name, restricted to `ResultSpec::state_keys`
    /// (§4.B "Result").
    fn aggregate(&self) -> serde_json::Value {
        let mut result = serde_json::Map::new();
        let Some(spec) = &self.result_spec else {
            return serde_json::Value::Object(result);
        };
        for child_id in &self.completed {
            let Some(snapshot) = self.live.get(*child_id) else {
                continue;
            };
            let want = snapshot.read();
            let mut entry = serde_json::Map::new();
            for key in &spec.state_keys {
                if let Some(value) = want.state.get(key) {
                    entry.insert(key.clone(), value.clone());
                }
            }
            result.insert(want.metadata.name.clone(), serde_json::Value::Object(entry));
        }
        serde_json::Value::Object(result)
    }
}

#[async_trait::async_trait]
impl WantExec for TargetExec {
    async fn exec(&mut self, ctx: &mut ExecContext<'_>, _paths: &mut Paths) -> ExecOutcome {
        if self.expected.is_empty() {
            return ExecOutcome::Done;
        }

        if !self.all_accounted_for() {
            match self.events.recv().await {
                Ok(event) if event.controller_owner_id == self.self_id && self.expected.contains(&event.child_id) => {
                    match event.terminal_status {
                        Status::Completed => {
                            self.completed.insert(event.child_id);
                        }
                        Status::Failed => {
                            self.failed.insert(event.child_id);
                        }
                        _ => {}
                    }
                }
                Ok(_) => return ExecOutcome::Continue,
                Err(_) => return ExecOutcome::Fail("completion event bus closed".into()),
            }
        }

        if !self.all_accounted_for() {
            return ExecOutcome::Continue;
        }

        if !self.failed.is_empty() {
            return ExecOutcome::Fail(format!("{} of {} children failed", self.failed.len(), self.expected.len()));
        }

        ctx.store_state("result", self.aggregate());
        ExecOutcome::Done
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::runtime::spawn;
    use mywant_core::{Metadata, Spec, Want};
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn want_with_state(id: u64, key: &str, value: serde_json::Value) -> Want {
        let mut want = Want::new(
            Metadata {
                id: WantId::from_raw(id),
                name: format!("child{id}"),
                type_tag: "leaf".into(),
                labels: Default::default(),
                owner_references: vec![],
            },
            Spec::default(),
        );
        want.begin_cycle();
        want.state.store(key, value);
        want.end_cycle();
        want
    }

    #[tokio::test]
    async fn completes_once_every_expected_child_reports_done_and_aggregates_result() {
        let live = LiveRegistry::new();
        let child1 = Arc::new(RwLock::new(want_with_state(1, "total", serde_json::json!(7))));
        let child2 = Arc::new(RwLock::new(want_with_state(2, "total", serde_json::json!(9))));
        live.insert(WantId::from_raw(1), child1);
        live.insert(WantId::from_raw(2), child2);

        let (bus, _keep_alive) = EventBus::new(8);
        let target_id = WantId::from_raw(100);
        let expected: HashSet<WantId> = [WantId::from_raw(1), WantId::from_raw(2)].into_iter().collect();
        let result_spec = ResultSpec { state_keys: vec!["total".into()] };

        let exec = TargetExec::new(target_id, expected, Some(result_spec), live, bus.subscribe());
        let target_want = Want::new(
            Metadata {
                id: target_id,
                name: "owner".into(),
                type_tag: "owner".into(),
                labels: Default::default(),
                owner_references: vec![],
            },
            Spec::default(),
        );
        let snapshot = Arc::new(RwLock::new(target_want));
        let handle = spawn(snapshot.clone(), Box::new(exec), Paths::default(), 4);

        bus.publish(CompletionEvent { child_id: WantId::from_raw(1), controller_owner_id: target_id, terminal_status: Status::Completed });
        bus.publish(CompletionEvent { child_id: WantId::from_raw(2), controller_owner_id: target_id, terminal_status: Status::Completed });

        let reason = handle.wait_exit().await;
        assert_eq!(reason, Some(crate::runtime::ExitReason::Completed));
        let result = snapshot.read().state.get("result").cloned().unwrap();
        assert_eq!(result["child1"]["total"], serde_json::json!(7));
        assert_eq!(result["child2"]["total"], serde_json::json!(9));
    }

    #[tokio::test]
    async fn any_failed_child_fails_the_target() {
        let live = LiveRegistry::new();
        let (bus, _keep_alive) = EventBus::new(8);
        let target_id = WantId::from_raw(101);
        let expected: HashSet<WantId> = [WantId::from_raw(1)].into_iter().collect();

        let exec = TargetExec::new(target_id, expected, None, live, bus.subscribe());
        let target_want = Want::new(
            Metadata {
                id: target_id,
                name: "owner".into(),
                type_tag: "owner".into(),
                labels: Default::default(),
                owner_references: vec![],
            },
            Spec::default(),
        );
        let snapshot = Arc::new(RwLock::new(target_want));
        let handle = spawn(snapshot.clone(), Box::new(exec), Paths::default(), 4);

        bus.publish(CompletionEvent { child_id: WantId::from_raw(1), controller_owner_id: target_id, terminal_status: Status::Failed });

        let reason = handle.wait_exit().await;
        assert_eq!(reason, Some(crate::runtime::ExitReason::Failed));
    }
}
