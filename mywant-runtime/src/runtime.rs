//! Execution Runtime (§4.E): drives one spawned task per want through
//! `BeginCycle -> Exec -> EndCycle`, and applies control-channel requests
//! (`suspend`/`resume`/`stop`/`restart`) between cycles.

use mywant_core::want::Status;
use mywant_core::{Want, WantId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A want's dynamic channel payload. Carried as JSON rather than a fixed
/// Rust enum because the core has no compile-time knowledge of what any
/// given want type produces or consumes, mirroring `Params` (see
/// `mywant_core::want::Params`).
pub type Message = serde_json::Value;

/// One resolved input: the channel a want reads `Message`s from, tagged
/// with the id of the want that produces them (so a fan-in `Exec` can tell
/// its inputs apart).
pub struct InputPath {
    pub producer: WantId,
    pub receiver: mpsc::Receiver<Message>,
}

/// One resolved output: the channel a want writes `Message`s to, tagged
/// with the id of the consuming want, so fan-out can address a single
/// edge (invariant 4: "each edge is a single-producer, single-consumer
/// channel; fan-out re-sends to every matching edge individually").
#[derive(Clone)]
pub struct OutputPath {
    pub consumer: WantId,
    pub sender: mpsc::Sender<Message>,
}

/// The channel ends wired for a single want by the Topology Resolver,
/// handed to `Exec` on every invocation.
#[derive(Default)]
pub struct Paths {
    pub inputs: Vec<InputPath>,
    pub outputs: Vec<OutputPath>,
}

impl Paths {
    /// Send `message` to every wired consumer (fan-out). A full channel is
    /// a suspension point: this awaits each send in turn rather than
    /// dropping messages on backpressure.
    pub async fn send_all(&mut self, message: Message) {
        for output in &mut self.outputs {
            if output.sender.send(message.clone()).await.is_err() {
                debug!(consumer = %output.consumer, "output path closed, consumer likely torn down");
            }
        }
    }
}

/// What `Exec` returns after doing one bounded unit of work. The runtime,
/// not `Exec`, is responsible for the surrounding `BeginCycle`/`EndCycle`
/// bracket and for the cancellation race (§4.E "Cancellation").
pub enum ExecOutcome {
    /// More work remains; call `Exec` again next cycle.
    Continue,
    /// Nothing changed this cycle but the want is still alive (e.g. it is
    /// waiting on an empty input channel). Distinguished from `Continue`
    /// only for logging; the runtime treats both the same way.
    Yield,
    /// The want has finished its work and should transition to `completed`.
    Done,
    /// The want hit an unrecoverable condition and should transition to
    /// `failed`, carrying `message` as its diagnostic.
    Fail(String),
}

/// Mutable access to a want's state handed to `Exec`, decoupled from the
/// shared `Arc<RwLock<Want>>` so that an `Exec` awaiting on a channel read
/// never holds that lock (see the module-level note on `ExecContext`
/// below for why).
pub struct ExecContext<'a> {
    snapshot: &'a Arc<RwLock<Want>>,
    pending: std::collections::BTreeMap<String, serde_json::Value>,
}

impl<'a> ExecContext<'a> {
    pub(crate) fn new(snapshot: &'a Arc<RwLock<Want>>) -> Self {
        Self {
            snapshot,
            pending: std::collections::BTreeMap::new(),
        }
    }

    /// Read a committed state value (never this cycle's in-flight writes).
    #[must_use]
    pub fn get_state(&self, key: &str) -> Option<serde_json::Value> {
        self.snapshot.read().state.get(key).cloned()
    }

    /// Params the want was configured with.
    #[must_use]
    pub fn params(&self) -> mywant_core::want::Params {
        self.snapshot.read().spec.params.clone()
    }

    /// `StoreState(key, value)`: buffered locally on this `ExecContext`,
    /// not on the shared want, until the runtime commits the cycle. This is
    /// the same pending-buffer contract as `mywant_core::state::State`, just
    /// held outside the `Arc<RwLock<Want>>` so that `Exec`'s awaits never
    /// hold that lock across a suspension point (holding a `parking_lot`
    /// guard across `.await` is exactly the kind of bug §5's single-writer
    /// design is meant to avoid).
    pub fn store_state(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.pending.insert(key.into(), value);
    }

    pub fn log_agent(&self, message: impl Into<String>) {
        self.snapshot.write().history.push_agent_log(message);
    }
}

/// The `Exec` contract every want type implements (§3 "Execution context").
///
/// Native async-fn-in-trait isn't object-safe yet, and the Registry (§4.D)
/// needs `Box<dyn WantExec>` for its factory map, so this follows the
/// corpus's own pattern of reaching for `async-trait` at exactly that seam.
#[async_trait::async_trait]
pub trait WantExec: Send {
    async fn exec(&mut self, ctx: &mut ExecContext<'_>, paths: &mut Paths) -> ExecOutcome;
}

/// Control-channel messages a want's task listens for between cycles
/// (§4.E "Suspend/Resume").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Suspend,
    Resume,
    Stop,
    Restart,
}

/// Why a want's task exited, handed back to the Reconciler so it can
/// decide whether to re-add the want on its next tick (`restart`) or leave
/// it torn down (`stop`/delete).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Completed,
    Failed,
    Stopped,
    Restarted,
}

/// The Reconciler's handle onto a running want's task.
pub struct Handle {
    pub control: mpsc::Sender<Control>,
    pub snapshot: Arc<RwLock<Want>>,
    pub cancel: CancellationToken,
    exit: oneshot::Receiver<ExitReason>,
}

impl Handle {
    /// Wait for the want's task to actually exit (used by the Reconciler
    /// when tearing down a deleted want, to know the channels are free to
    /// drop).
    pub async fn wait_exit(self) -> Option<ExitReason> {
        self.exit.await.ok()
    }
}

/// Read-only registry of every live want's snapshot, keyed by id. The
/// Owner/Completion subsystem (§4.G) uses it to read a completed child's
/// state for result aggregation without the Reconciler routing every
/// value through the event bus. Grounded on the reflector `Store`'s
/// read-handle role (`kube_runtime::reflector::store`), with `DashMap`
/// swapped for a `parking_lot::RwLock<HashMap<_>>` since the rest of the
/// runtime already standardizes on `parking_lot` for its other
/// short-held locks (§5).
#[derive(Clone, Default)]
pub struct LiveRegistry(Arc<RwLock<HashMap<WantId, Arc<RwLock<Want>>>>>);

impl LiveRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: WantId, snapshot: Arc<RwLock<Want>>) {
        self.0.write().insert(id, snapshot);
    }

    pub fn remove(&self, id: WantId) {
        self.0.write().remove(&id);
    }

    #[must_use]
    pub fn get(&self, id: WantId) -> Option<Arc<RwLock<Want>>> {
        self.0.read().get(&id).cloned()
    }

    #[must_use]
    pub fn snapshot_all(&self) -> Vec<Arc<RwLock<Want>>> {
        self.0.read().values().cloned().collect()
    }
}

/// Spawn a want's task and return the Reconciler's handle onto it. The
/// want is expected to already be in `idle` status; this function drives
/// it to `running` once `paths` are wired (invariant 5: "a want may not
/// enter `running` until its `requires` policy is satisfied", enforced by
/// the Reconciler before it calls `spawn`, not here).
pub fn spawn(
    snapshot: Arc<RwLock<Want>>,
    mut exec: Box<dyn WantExec>,
    mut paths: Paths,
    control_capacity: usize,
) -> Handle {
    let (control_tx, mut control_rx) = mpsc::channel(control_capacity);
    let (exit_tx, exit_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();
    let task_snapshot = snapshot.clone();

    tokio::spawn(async move {
        let id = task_snapshot.read().id();
        {
            let mut w = task_snapshot.write();
            if !w.try_transition(Status::Running) {
                warn!(want = %id, "spawned want was not idle, forcing running status");
                w.status = Status::Running;
            }
        }

        let mut suspended = false;
        let mut restart_requested = false;
        let exit_reason = loop {
            while let Ok(control) = control_rx.try_recv() {
                match control {
                    Control::Suspend => {
                        suspended = true;
                        let mut w = task_snapshot.write();
                        w.try_transition(Status::Suspended);
                    }
                    Control::Resume => {
                        suspended = false;
                        let mut w = task_snapshot.write();
                        w.try_transition(Status::Running);
                    }
                    Control::Stop => {
                        task_cancel.cancel();
                    }
                    Control::Restart => {
                        restart_requested = true;
                        task_cancel.cancel();
                    }
                }
            }

            if task_cancel.is_cancelled() {
                break if restart_requested { ExitReason::Restarted } else { ExitReason::Stopped };
            }

            if suspended {
                tokio::select! {
                    received = control_rx.recv() => match received {
                        Some(Control::Resume) => {
                            suspended = false;
                            task_snapshot.write().try_transition(Status::Running);
                        }
                        Some(Control::Stop) => break ExitReason::Stopped,
                        Some(Control::Restart) => break ExitReason::Restarted,
                        Some(Control::Suspend) | None => {}
                    },
                    () = task_cancel.cancelled() => break if restart_requested { ExitReason::Restarted } else { ExitReason::Stopped },
                }
                continue;
            }

            let mut ctx = ExecContext::new(&task_snapshot);
            let outcome = tokio::select! {
                outcome = exec.exec(&mut ctx, &mut paths) => outcome,
                () = task_cancel.cancelled() => ExecOutcome::Continue,
            };

            if task_cancel.is_cancelled() {
                commit_cycle(&task_snapshot, ctx);
                break if restart_requested { ExitReason::Restarted } else { ExitReason::Stopped };
            }

            match outcome {
                ExecOutcome::Continue | ExecOutcome::Yield => {
                    commit_cycle(&task_snapshot, ctx);
                }
                ExecOutcome::Done => {
                    commit_cycle(&task_snapshot, ctx);
                    task_snapshot.write().try_transition(Status::Completed);
                    break ExitReason::Completed;
                }
                ExecOutcome::Fail(message) => {
                    commit_cycle(&task_snapshot, ctx);
                    let mut w = task_snapshot.write();
                    w.record_diagnostic(message);
                    w.try_transition(Status::Failed);
                    break ExitReason::Failed;
                }
            }
        };

        debug!(want = %id, reason = ?exit_reason, "want task exiting");
        let _ = exit_tx.send(exit_reason);
    });

    Handle {
        control: control_tx,
        snapshot,
        cancel,
        exit: exit_rx,
    }
}

fn commit_cycle(snapshot: &Arc<RwLock<Want>>, ctx: ExecContext<'_>) {
    let mut w = snapshot.write();
    w.begin_cycle();
    for (key, value) in ctx.pending {
        w.state.store(key, value);
    }
    w.end_cycle();
}

#[cfg(test)]
mod tests {
    use super::*;
    use mywant_core::{Metadata, Spec};

    fn idle_want(id: u64) -> Want {
        Want::new(
            Metadata {
                id: WantId::from_raw(id),
                name: format!("w{id}"),
                type_tag: "test".into(),
                labels: Default::default(),
                owner_references: vec![],
            },
            Spec::default(),
        )
    }

    struct CountToThree(u32);

    #[async_trait::async_trait]
    impl WantExec for CountToThree {
        async fn exec(&mut self, ctx: &mut ExecContext<'_>, _paths: &mut Paths) -> ExecOutcome {
            self.0 += 1;
            ctx.store_state("count", serde_json::json!(self.0));
            if self.0 >= 3 {
                ExecOutcome::Done
            } else {
                ExecOutcome::Continue
            }
        }
    }

    #[tokio::test]
    async fn runs_to_completion_and_commits_state_each_cycle() {
        let snapshot = Arc::new(RwLock::new(idle_want(1)));
        let handle = spawn(snapshot.clone(), Box::new(CountToThree(0)), Paths::default(), 4);
        let reason = handle.wait_exit().await;
        assert_eq!(reason, Some(ExitReason::Completed));
        let w = snapshot.read();
        assert_eq!(w.status, Status::Completed);
        assert_eq!(w.state.get("count"), Some(&serde_json::json!(3)));
        assert_eq!(w.history.entries().len(), 3);
    }

    struct NeverDone;

    #[async_trait::async_trait]
    impl WantExec for NeverDone {
        async fn exec(&mut self, _ctx: &mut ExecContext<'_>, _paths: &mut Paths) -> ExecOutcome {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            ExecOutcome::Continue
        }
    }

    #[tokio::test]
    async fn stop_control_message_cancels_the_task() {
        let snapshot = Arc::new(RwLock::new(idle_want(2)));
        let handle = spawn(snapshot.clone(), Box::new(NeverDone), Paths::default(), 4);
        handle.control.send(Control::Stop).await.unwrap();
        let reason = handle.wait_exit().await;
        assert_eq!(reason, Some(ExitReason::Stopped));
    }

    struct FailsImmediately;

    #[async_trait::async_trait]
    impl WantExec for FailsImmediately {
        async fn exec(&mut self, _ctx: &mut ExecContext<'_>, _paths: &mut Paths) -> ExecOutcome {
            ExecOutcome::Fail("boom".into())
        }
    }

    #[tokio::test]
    async fn failure_records_diagnostic_and_transitions_to_failed() {
        let snapshot = Arc::new(RwLock::new(idle_want(3)));
        let handle = spawn(snapshot.clone(), Box::new(FailsImmediately), Paths::default(), 4);
        let reason = handle.wait_exit().await;
        assert_eq!(reason, Some(ExitReason::Failed));
        let w = snapshot.read();
        assert_eq!(w.status, Status::Failed);
        assert_eq!(w.diagnostic.as_ref().unwrap().message, "boom");
    }

    #[test]
    fn live_registry_tracks_insert_and_remove() {
        let registry = LiveRegistry::new();
        let snapshot = Arc::new(RwLock::new(idle_want(4)));
        registry.insert(WantId::from_raw(4), snapshot.clone());
        assert!(registry.get(WantId::from_raw(4)).is_some());
        registry.remove(WantId::from_raw(4));
        assert!(registry.get(WantId::from_raw(4)).is_none());
    }
}
