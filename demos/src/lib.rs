//! Small want-type implementations used by the binaries under `src/bin/`
//! and exercised by `mywant-runtime`'s scenario tests. None of these are
//! meant to be production want types: they exist to give the engine
//! something concrete to reconcile and drive.

use async_trait::async_trait;
use mywant_core::Params;
use mywant_runtime::runtime::{ExecContext, ExecOutcome, Paths, WantExec};
use mywant_runtime::Registry;

/// Emits the integers `1..=count` (default 10), one per cycle, to every
/// wired consumer, then completes.
pub struct NumbersGenerator {
    next: u64,
    count: u64,
}

impl NumbersGenerator {
    #[must_use]
    pub fn from_params(params: &Params) -> Self {
        let count = params.get("count").and_then(serde_json::Value::as_u64).unwrap_or(10);
        Self { next: 1, count }
    }
}

#[async_trait]
impl WantExec for NumbersGenerator {
    async fn exec(&mut self, ctx: &mut ExecContext<'_>, paths: &mut Paths) -> ExecOutcome {
        if self.next > self.count {
            return ExecOutcome::Done;
        }
        paths.send_all(serde_json::json!(self.next)).await;
        ctx.store_state("last_emitted", serde_json::json!(self.next));
        self.next += 1;
        ExecOutcome::Continue
    }
}

/// Reads one number per cycle from its wired producers and re-emits it
/// after an artificial per-message delay, demonstrating backpressure
/// through a bounded channel without doing any real work.
pub struct DelayingQueue {
    delay: std::time::Duration,
}

impl DelayingQueue {
    #[must_use]
    pub fn from_params(params: &Params) -> Self {
        let millis = params.get("delay_ms").and_then(serde_json::Value::as_u64).unwrap_or(1);
        Self { delay: std::time::Duration::from_millis(millis) }
    }
}

#[async_trait]
impl WantExec for DelayingQueue {
    async fn exec(&mut self, _ctx: &mut ExecContext<'_>, paths: &mut Paths) -> ExecOutcome {
        let Some(input) = paths.inputs.first_mut() else {
            return ExecOutcome::Fail("delaying queue has no wired input".into());
        };
        match input.receiver.recv().await {
            Some(message) => {
                tokio::time::sleep(self.delay).await;
                paths.send_all(message).await;
                ExecOutcome::Continue
            }
            None => ExecOutcome::Done,
        }
    }
}

/// Sums every number it receives across every wired producer and
/// completes once all of them have closed their channel.
pub struct CountingSink {
    total: i64,
}

impl CountingSink {
    #[must_use]
    pub fn new() -> Self {
        Self { total: 0 }
    }
}

impl Default for CountingSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WantExec for CountingSink {
    async fn exec(&mut self, ctx: &mut ExecContext<'_>, paths: &mut Paths) -> ExecOutcome {
        if paths.inputs.is_empty() {
            return ExecOutcome::Done;
        }
        let mut any_open = false;
        for input in &mut paths.inputs {
            match input.receiver.recv().await {
                Some(message) => {
                    any_open = true;
                    if let Some(n) = message.as_i64() {
                        self.total += n;
                    }
                }
                None => continue,
            }
        }
        ctx.store_state("total", serde_json::json!(self.total));
        if any_open {
            ExecOutcome::Continue
        } else {
            ExecOutcome::Done
        }
    }
}

/// A leaf want that does one piece of imaginary travel-booking work and
/// completes immediately, recording its own name-derived confirmation
/// code. Used for every node of the `travel` recipe.
pub struct BookingStep {
    label: String,
}

impl BookingStep {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into() }
    }
}

#[async_trait]
impl WantExec for BookingStep {
    async fn exec(&mut self, ctx: &mut ExecContext<'_>, _paths: &mut Paths) -> ExecOutcome {
        ctx.store_state("confirmation", serde_json::json!(format!("{}-confirmed", self.label)));
        ExecOutcome::Done
    }
}

/// Registers every demo want type on `registry`.
pub fn register_all(registry: &mut Registry) {
    registry.register_type("numbers", |params| Box::new(NumbersGenerator::from_params(params)), false, 16);
    registry.register_type("delaying_queue", |params| Box::new(DelayingQueue::from_params(params)), false, 8);
    registry.register_type("counting_sink", |_params| Box::new(CountingSink::new()), false, 16);
    registry.register_type("restaurant", |_params| Box::new(BookingStep::new("restaurant")), false, 4);
    registry.register_type("hotel", |_params| Box::new(BookingStep::new("hotel")), false, 4);
    registry.register_type("buffet", |_params| Box::new(BookingStep::new("buffet")), false, 4);
    registry.register_type("coordinator", |_params| Box::new(BookingStep::new("coordinator")), false, 4);
}
